use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sim::{Aabb, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Branch,
    Billboard,
    Sign,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Billboard => "billboard",
            Self::Sign => "sign",
        }
    }
}

/// Stable reference to one content record, used in events and in
/// `WorldState.interaction.near_object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: String,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn is_branch(&self) -> bool {
        self.kind == ContentKind::Branch
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// A static road-side object. Positions are the centre of the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub position: Vec2,
    #[serde(default = "default_half_extents")]
    pub half_extents: Vec2,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, position: Vec2, half_extents: Vec2) -> Self {
        Self {
            id: id.into(),
            position,
            half_extents,
            title: String::new(),
            text: None,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center(self.position, self.half_extents)
    }
}

fn default_half_extents() -> Vec2 {
    Vec2::new(32.0, 48.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_ref_display_is_kind_and_id() {
        let reference = ContentRef::new(ContentKind::Billboard, "diner");
        assert_eq!(reference.to_string(), "billboard:diner");
        assert!(!reference.is_branch());
    }

    #[test]
    fn item_bounds_are_centred_on_position() {
        let item = ContentItem::new("b1", Vec2::new(100.0, 50.0), Vec2::new(10.0, 20.0));
        let bounds = item.bounds();
        assert_eq!(bounds.x, 90.0);
        assert_eq!(bounds.y, 30.0);
        assert_eq!(bounds.w, 20.0);
        assert_eq!(bounds.h, 40.0);
    }
}
