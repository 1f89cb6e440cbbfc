use serde::{Deserialize, Serialize};

/// One retrieved entry, ordered nearest-first in search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub position: usize,
    pub chapter_index: i64,
    pub text: String,
    /// Squared L2 distance between the query and the stored vector.
    pub distance: f32,
}

/// Snapshot of a store, cheap to print or serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub dimension: usize,
    pub model_id: String,
    pub revision: u64,
    pub chapters: Vec<i64>,
    pub dirty: bool,
}
