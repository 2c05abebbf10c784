use std::collections::VecDeque;
use std::time::Duration;

use super::events::PhaseTimings;

pub(crate) const ROLLING_WINDOW_LEN: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingMsStats {
    pub last_ms: f32,
    pub avg_ms: f32,
    pub max_ms: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub frame_time: RollingMsStats,
    pub update: RollingMsStats,
    pub render: RollingMsStats,
}

/// Rolling per-frame measurements: simulated frame time (for FPS) and the
/// wall-clock cost of the update and render phases.
#[derive(Debug, Default)]
pub(crate) struct FrameMetrics {
    frame_time: RollingWindowMs,
    update: RollingWindowMs,
    render: RollingWindowMs,
}

impl FrameMetrics {
    pub(crate) fn record_frame(&mut self, dt: Duration, timings: PhaseTimings) {
        self.frame_time.push_ms(duration_to_ms(dt));
        self.update.push_ms(timings.update_ms);
        self.render.push_ms(timings.render_ms);
    }

    pub(crate) fn fps(&self) -> f32 {
        let avg_ms = self.frame_time.snapshot().avg_ms;
        if avg_ms <= f32::EPSILON {
            0.0
        } else {
            1000.0 / avg_ms
        }
    }

    pub(crate) fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            fps: self.fps(),
            frame_time: self.frame_time.snapshot(),
            update: self.update.snapshot(),
            render: self.render.snapshot(),
        }
    }
}

/// Counts frames over a fixed interval of simulated time for the periodic
/// `loop_metrics` log line.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval: Duration,
    elapsed: Duration,
    frames: u32,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            frames: 0,
        }
    }

    /// Returns the frame rate over the interval once it has elapsed.
    pub(crate) fn record_frame(&mut self, dt: Duration) -> Option<f32> {
        self.frames = self.frames.saturating_add(1);
        self.elapsed = self.elapsed.saturating_add(dt);
        if self.interval.is_zero() || self.elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = self.elapsed.as_secs_f32().max(f32::EPSILON);
        let fps = self.frames as f32 / elapsed_seconds;
        self.elapsed = Duration::ZERO;
        self.frames = 0;
        Some(fps)
    }
}

/// Last `ROLLING_WINDOW_LEN` samples in milliseconds with a running sum.
#[derive(Debug)]
struct RollingWindowMs {
    samples: VecDeque<f32>,
    sum_ms: f32,
}

impl Default for RollingWindowMs {
    fn default() -> Self {
        Self {
            samples: VecDeque::with_capacity(ROLLING_WINDOW_LEN),
            sum_ms: 0.0,
        }
    }
}

impl RollingWindowMs {
    fn push_ms(&mut self, value_ms: f32) {
        if self.samples.len() == ROLLING_WINDOW_LEN {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum_ms -= evicted;
            }
        }
        self.samples.push_back(value_ms);
        self.sum_ms += value_ms;
    }

    fn snapshot(&self) -> RollingMsStats {
        let Some(&last_ms) = self.samples.back() else {
            return RollingMsStats::default();
        };
        let max_ms = self.samples.iter().copied().fold(f32::MIN, f32::max);
        RollingMsStats {
            last_ms,
            avg_ms: (self.sum_ms / self.samples.len() as f32).max(0.0),
            max_ms,
        }
    }
}

pub(crate) fn duration_to_ms(duration: Duration) -> f32 {
    duration.as_secs_f32() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_report_zero_fps() {
        let metrics = FrameMetrics::default();
        assert_eq!(metrics.fps(), 0.0);
        assert_eq!(metrics.snapshot().frame_time, RollingMsStats::default());
    }

    #[test]
    fn fps_follows_average_frame_time() {
        let mut metrics = FrameMetrics::default();
        for _ in 0..10 {
            metrics.record_frame(Duration::from_millis(20), PhaseTimings::default());
        }
        assert!((metrics.fps() - 50.0).abs() < 0.01);
    }

    #[test]
    fn short_window_averages_what_it_holds() {
        let mut window = RollingWindowMs::default();
        for value in [4.0, 8.0, 6.0] {
            window.push_ms(value);
        }
        let stats = window.snapshot();
        assert_eq!(stats.last_ms, 6.0);
        assert_eq!(stats.max_ms, 8.0);
        assert!((stats.avg_ms - 6.0).abs() < 1.0e-4);
    }

    #[test]
    fn evicted_spike_no_longer_counts() {
        let mut window = RollingWindowMs::default();
        window.push_ms(250.0);
        for _ in 0..ROLLING_WINDOW_LEN {
            window.push_ms(5.0);
        }
        let stats = window.snapshot();
        assert_eq!(stats.max_ms, 5.0);
        assert!((stats.avg_ms - 5.0).abs() < 1.0e-3);
    }

    #[test]
    fn accumulator_emits_once_per_interval() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let mut emitted = Vec::new();
        for _ in 0..100 {
            if let Some(fps) = accumulator.record_frame(Duration::from_millis(20)) {
                emitted.push(fps);
            }
        }
        assert_eq!(emitted.len(), 2);
        assert!((emitted[0] - 50.0).abs() < 0.05);
    }

    #[test]
    fn phase_timings_feed_update_and_render_windows() {
        let mut metrics = FrameMetrics::default();
        let timings = PhaseTimings {
            update_ms: 3.0,
            render_ms: 1.0,
            ..PhaseTimings::default()
        };
        metrics.record_frame(Duration::from_micros(16_500), timings);
        let snapshot = metrics.snapshot();
        assert!((snapshot.frame_time.last_ms - 16.5).abs() < 1.0e-3);
        assert_eq!(snapshot.update.last_ms, 3.0);
        assert_eq!(snapshot.render.last_ms, 1.0);
    }
}
