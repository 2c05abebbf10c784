use std::fs;
use std::path::Path;

use roadtrip_engine::InputAction;
use serde::Deserialize;
use tracing::debug;

use super::error::AppError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub(crate) enum ScriptCommand {
    Key { action: InputAction, down: bool },
    Throttle { left: f32, right: f32 },
    ReleaseAll,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ScriptStep {
    pub(crate) at_seconds: f64,
    #[serde(flatten)]
    pub(crate) command: ScriptCommand,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    steps: Vec<ScriptStep>,
}

/// Timed input commands replayed against wall-clock run time.
#[derive(Debug, Clone, Default)]
pub(crate) struct InputScript {
    steps: Vec<ScriptStep>,
    cursor: usize,
}

impl InputScript {
    pub(crate) fn new(mut steps: Vec<ScriptStep>) -> Result<Self, AppError> {
        for (index, step) in steps.iter().enumerate() {
            if !step.at_seconds.is_finite() || step.at_seconds < 0.0 {
                return Err(AppError::ScriptInvalid {
                    index,
                    message: format!("expected non-negative at_seconds, got {}", step.at_seconds),
                });
            }
            if let ScriptCommand::Throttle { left, right } = step.command {
                if !(0.0..=1.0).contains(&left) || !(0.0..=1.0).contains(&right) {
                    return Err(AppError::ScriptInvalid {
                        index,
                        message: format!("expected throttle in [0, 1], got ({left}, {right})"),
                    });
                }
            }
        }
        steps.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
        Ok(Self { steps, cursor: 0 })
    }

    pub(crate) fn from_json_str(raw: &str, origin: &str) -> Result<Self, AppError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let file: ScriptFile =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
                AppError::ScriptParse {
                    path: origin.to_string(),
                    at: err.path().to_string(),
                    source: err.into_inner(),
                }
            })?;
        Self::new(file.steps)
    }

    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|source| AppError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, &path.display().to_string())
    }

    /// Drives right to the first demo branch, walks the timeline back out,
    /// keeps driving, then restarts so the next lap has a ghost.
    pub(crate) fn autopilot() -> Self {
        use InputAction::{Interact, Right, Up};
        let key = |at_seconds, action, down| ScriptStep {
            at_seconds,
            command: ScriptCommand::Key { action, down },
        };
        let steps = vec![
            key(0.2, Right, true),
            key(1.6, Right, false),
            key(2.6, Interact, true),
            key(2.8, Interact, false),
            key(4.2, Up, true),
            key(5.4, Up, false),
            ScriptStep {
                at_seconds: 6.5,
                command: ScriptCommand::Throttle {
                    left: 0.0,
                    right: 0.8,
                },
            },
            ScriptStep {
                at_seconds: 8.5,
                command: ScriptCommand::ReleaseAll,
            },
            ScriptStep {
                at_seconds: 9.0,
                command: ScriptCommand::Restart,
            },
            key(9.5, Right, true),
            key(11.0, Right, false),
        ];
        Self { steps, cursor: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Returns every not-yet-issued command scheduled at or before `elapsed`.
    pub(crate) fn due(&mut self, elapsed: f64) -> Vec<ScriptCommand> {
        let mut due = Vec::new();
        while let Some(step) = self.steps.get(self.cursor) {
            if step.at_seconds > elapsed {
                break;
            }
            debug!(at = step.at_seconds, command = ?step.command, "script_step");
            due.push(step.command.clone());
            self.cursor += 1;
        }
        due
    }
}
