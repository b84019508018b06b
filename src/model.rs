//! Library / Document / Chunk data model.
//!
//! Metadata is kept as a plain JSON value the way `idz`'s `Chunk` stores its
//! `serde_json::Value` metadata column — callers hand us arbitrary
//! JSON-representable data and we round-trip it without interpreting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arbitrary caller-supplied metadata: string keys, JSON-representable values.
pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAlgorithm {
    Exact,
    Lsh,
}

impl std::str::FromStr for IndexAlgorithm {
    type Err = crate::error::VdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(IndexAlgorithm::Exact),
            "lsh" => Ok(IndexAlgorithm::Lsh),
            other => Err(crate::error::VdbError::InvalidArgument(format!(
                "unknown index algorithm: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub library_id: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_indexed: bool,
    pub index_algorithm: Option<IndexAlgorithm>,
    /// Fixed at first chunk insertion; `None` until then.
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub library_id: String,
    pub title: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub library_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new chunk; `chunk_id` is minted if absent.
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub chunk_id: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// One search result: the matched chunk and its cosine distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Exact-match metadata filter applied as a post-filter over search
/// candidates, before top-k truncation (see `EntityStore::search`).
pub type MetadataFilter = HashMap<String, serde_json::Value>;

pub(crate) fn matches_filter(metadata: &Metadata, filter: &MetadataFilter) -> bool {
    filter
        .iter()
        .all(|(k, v)| metadata.get(k).map(|mv| mv == v).unwrap_or(false))
}
