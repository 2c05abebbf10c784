use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::types::{ContentItem, ContentKind, ContentRef};
use crate::sim::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    EmptyId,
    DuplicateId,
    InvalidValue,
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse content json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{code:?}: {message} ({kind} '{id}')")]
    Invalid {
        code: ContentErrorCode,
        kind: &'static str,
        id: String,
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ContentFile {
    branches: Vec<ContentItem>,
    billboards: Vec<ContentItem>,
    signs: Vec<ContentItem>,
}

/// Read-only road-side content. Records are indexed by id per kind; ids must
/// be unique within a kind.
#[derive(Debug, Default, Clone)]
pub struct WorldContent {
    branches: Vec<ContentItem>,
    billboards: Vec<ContentItem>,
    signs: Vec<ContentItem>,
    index_by_ref: HashMap<ContentRef, usize>,
}

impl WorldContent {
    pub fn new(
        branches: Vec<ContentItem>,
        billboards: Vec<ContentItem>,
        signs: Vec<ContentItem>,
    ) -> Result<Self, ContentError> {
        let mut index_by_ref = HashMap::with_capacity(branches.len() + billboards.len() + signs.len());
        for (kind, items) in [
            (ContentKind::Branch, &branches),
            (ContentKind::Billboard, &billboards),
            (ContentKind::Sign, &signs),
        ] {
            for (idx, item) in items.iter().enumerate() {
                validate_item(kind, item)?;
                if index_by_ref
                    .insert(ContentRef::new(kind, item.id.clone()), idx)
                    .is_some()
                {
                    return Err(ContentError::Invalid {
                        code: ContentErrorCode::DuplicateId,
                        kind: kind.as_str(),
                        id: item.id.clone(),
                        message: "each id may appear only once per kind".to_string(),
                    });
                }
            }
        }
        Ok(Self {
            branches,
            billboards,
            signs,
            index_by_ref,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ContentError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let file: ContentFile = serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            ContentError::Parse {
                path,
                source: error.into_inner(),
            }
        })?;
        Self::new(file.branches, file.billboards, file.signs)
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let raw = fs::read_to_string(path).map_err(|source| ContentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// A short stretch of road with two branches, a billboard and a sign,
    /// used when no content file is supplied. A non-finite `road_y` yields
    /// empty content and a warning.
    pub fn demo(road_y: f32) -> Self {
        let half = Vec2::new(32.0, 48.0);
        let at = |x: f32| Vec2::new(x, road_y);
        let titled = |id: &str, x: f32, title: &str| ContentItem {
            title: title.to_string(),
            ..ContentItem::new(id, at(x), half)
        };
        let branches = vec![
            titled("early-years", 900.0, "Early Years"),
            titled("first-job", 2_400.0, "First Job"),
        ];
        let billboards = vec![titled("diner", 1_600.0, "Joe's Diner")];
        let signs = vec![titled("mile-1", 3_200.0, "Mile 1")];
        Self::new(branches, billboards, signs).unwrap_or_else(|error| {
            warn!(road_y, error = %error, "demo_content_rejected");
            Self::default()
        })
    }

    pub fn branches(&self) -> &[ContentItem] {
        &self.branches
    }

    pub fn billboards(&self) -> &[ContentItem] {
        &self.billboards
    }

    pub fn signs(&self) -> &[ContentItem] {
        &self.signs
    }

    pub fn get(&self, reference: &ContentRef) -> Option<&ContentItem> {
        let idx = *self.index_by_ref.get(reference)?;
        self.items(reference.kind).get(idx)
    }

    pub fn branch(&self, id: &str) -> Option<&ContentItem> {
        self.get(&ContentRef::new(ContentKind::Branch, id))
    }

    pub fn items(&self, kind: ContentKind) -> &[ContentItem] {
        match kind {
            ContentKind::Branch => &self.branches,
            ContentKind::Billboard => &self.billboards,
            ContentKind::Sign => &self.signs,
        }
    }

    /// Every record with its reference, in kind order then file order.
    pub fn iter(&self) -> impl Iterator<Item = (ContentRef, &ContentItem)> + '_ {
        [ContentKind::Branch, ContentKind::Billboard, ContentKind::Sign]
            .into_iter()
            .flat_map(move |kind| {
                self.items(kind)
                    .iter()
                    .map(move |item| (ContentRef::new(kind, item.id.clone()), item))
            })
    }

    pub fn len(&self) -> usize {
        self.index_by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_by_ref.is_empty()
    }
}

fn validate_item(kind: ContentKind, item: &ContentItem) -> Result<(), ContentError> {
    if item.id.trim().is_empty() {
        return Err(ContentError::Invalid {
            code: ContentErrorCode::EmptyId,
            kind: kind.as_str(),
            id: item.id.clone(),
            message: "id must not be empty".to_string(),
        });
    }
    let numbers = [
        item.position.x,
        item.position.y,
        item.half_extents.x,
        item.half_extents.y,
    ];
    if numbers.iter().any(|value| !value.is_finite())
        || item.half_extents.x < 0.0
        || item.half_extents.y < 0.0
    {
        return Err(ContentError::Invalid {
            code: ContentErrorCode::InvalidValue,
            kind: kind.as_str(),
            id: item.id.clone(),
            message: "position and half_extents must be finite; half_extents >= 0".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_content_file_and_indexes_by_ref() {
        let content = WorldContent::from_json_str(
            r#"{
                "branches": [{ "id": "school", "position": { "x": 500, "y": 520 }, "title": "School" }],
                "billboards": [{ "id": "ad", "position": { "x": 800, "y": 520 },
                                 "half_extents": { "x": 10, "y": 10 } }]
            }"#,
        )
        .expect("content");

        assert_eq!(content.len(), 2);
        let branch = content.branch("school").expect("branch");
        assert_eq!(branch.title, "School");
        assert_eq!(branch.half_extents, Vec2::new(32.0, 48.0));
        let ad = content
            .get(&ContentRef::new(ContentKind::Billboard, "ad"))
            .expect("billboard");
        assert_eq!(ad.half_extents.x, 10.0);
        assert!(content.signs().is_empty());
    }

    #[test]
    fn duplicate_id_within_kind_is_rejected() {
        let error = WorldContent::from_json_str(
            r#"{ "signs": [
                { "id": "a", "position": { "x": 1, "y": 1 } },
                { "id": "a", "position": { "x": 2, "y": 2 } }
            ] }"#,
        )
        .expect_err("duplicate");
        assert!(matches!(
            error,
            ContentError::Invalid {
                code: ContentErrorCode::DuplicateId,
                ..
            }
        ));
    }

    #[test]
    fn same_id_across_kinds_is_allowed() {
        let content = WorldContent::from_json_str(
            r#"{
                "branches": [{ "id": "x", "position": { "x": 1, "y": 1 } }],
                "signs": [{ "id": "x", "position": { "x": 2, "y": 2 } }]
            }"#,
        )
        .expect("content");
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn parse_error_names_the_field() {
        let error = WorldContent::from_json_str(
            r#"{ "branches": [{ "id": "a", "position": { "x": "left", "y": 1 } }] }"#,
        )
        .expect_err("bad value");
        match error {
            ContentError::Parse { path, .. } => assert_eq!(path, "branches[0].position.x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_id_is_rejected() {
        let error = WorldContent::new(
            vec![ContentItem::new(" ", Vec2::ZERO, Vec2::ZERO)],
            Vec::new(),
            Vec::new(),
        )
        .expect_err("empty id");
        assert!(error.to_string().contains("EmptyId"));
    }

    #[test]
    fn demo_content_is_valid() {
        let content = WorldContent::demo(520.0);
        assert_eq!(content.branches().len(), 2);
        assert_eq!(content.iter().count(), 4);
        assert!(!content.is_empty());
        assert!(content
            .iter()
            .all(|(_, item)| item.position.y == 520.0));
    }

    #[test]
    fn demo_with_unusable_road_line_falls_back_to_empty() {
        let content = WorldContent::demo(f32::NAN);
        assert!(content.is_empty());
        assert_eq!(content.iter().count(), 0);
    }

    #[test]
    fn load_reads_content_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "branches": [{{ "id": "farm", "position": {{ "x": 10, "y": 20 }} }}] }}"#
        )
        .expect("write");
        let content = WorldContent::load(file.path()).expect("load");
        assert!(content.branch("farm").is_some());
    }
}
