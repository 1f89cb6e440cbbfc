//! # Novel Vector Store
//!
//! Retrieval memory for long-form novel generation: every generated chapter is
//! embedded and indexed, and before the next chapter is drafted the most
//! relevant earlier chapters are pulled back into the prompt.
//!
//! ## Features
//!
//! - **Exact k-NN search** under squared L2 distance, deterministic tie-break
//! - **Pluggable embeddings**: ONNX Runtime sentence models or a model-free
//!   lexical embedder
//! - **Paired persistence**: binary index + JSON documents, cross-checked on load
//! - **Model identity tags** so stores built with another embedder are rejected
//!
//! ## Architecture
//!
//! ```text
//! chapter text
//!     │
//!     ├──> EmbeddingModel (shared, Arc)
//!     │      └─> Vec<f32>[D]
//!     │
//!     ├──> ChapterMemory
//!     │      ├─> SimilarityIndex (vectors by position)
//!     │      └─> DocumentStore   (chapter index + text by position)
//!     │
//!     └──> <novel>/vector_store/
//!            ├─> novel.index            (bincode)
//!            └─> novel.index.docs.json  (JSON)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use novel_vector_store::{EmbeddingConfig, EmbeddingModel, VectorStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> novel_vector_store::Result<()> {
//!     let embedder = Arc::new(EmbeddingModel::new(&EmbeddingConfig::from_env()?)?);
//!     let mut store = VectorStore::open("novels/dragon-saga", embedder).await?;
//!
//!     store.add_document("The dragon woke beneath the mountain.", 0).await?;
//!     store.save().await?;
//!
//!     for text in store.search("What happened to the dragon?", 3).await? {
//!         println!("{text}");
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod documents;
mod embeddings;
mod error;
mod flat_index;
mod memory;
mod paths;
mod store;
mod types;

pub use config::{
    default_model_dir, EmbeddingConfig, EmbeddingMode, RetrievalConfig, DEFAULT_MODEL_ID,
    DEFAULT_TOP_K,
};
pub use documents::{DocumentStore, StoredDocument};
pub use embeddings::EmbeddingModel;
pub use error::{Result, VectorStoreError};
pub use flat_index::SimilarityIndex;
pub use memory::ChapterMemory;
pub use paths::{chapters_dir, documents_path, index_path, vector_store_dir};
pub use store::VectorStore;
pub use types::{SearchHit, StoreStats};
