mod database;
mod types;

pub use database::{ContentError, ContentErrorCode, WorldContent};
pub use types::{ContentItem, ContentKind, ContentRef};
