use crate::documents::{documents_revision, is_blank};
use crate::embeddings::EmbeddingModel;
use crate::error::{Result, VectorStoreError};
use crate::flat_index::index_revision;
use crate::memory::{ArtifactHeader, ChapterMemory};
use crate::paths::{documents_path, index_path, tmp_path, vector_store_dir};
use crate::types::{SearchHit, StoreStats};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Retrieval memory of one novel, bound to the novel's directory.
///
/// Mutating calls take `&mut self`; hosts that share a store between tasks
/// wrap it in a mutex. Only one live instance per novel directory is
/// supported, since `save` overwrites whatever is on disk.
pub struct VectorStore {
    embedder: Arc<EmbeddingModel>,
    memory: ChapterMemory,
    novel_dir: PathBuf,
    revision: u64,
    dirty: bool,
}

impl VectorStore {
    /// Open the store for `novel_dir`, loading persisted state when present.
    pub async fn open(novel_dir: impl AsRef<Path>, embedder: Arc<EmbeddingModel>) -> Result<Self> {
        let novel_dir = novel_dir.as_ref().to_path_buf();
        Self::load(novel_dir, embedder).await.inspect_err(|err| {
            if err.is_corrupt() {
                log::warn!("Persisted vector store cannot be used: {err}");
            }
        })
    }

    async fn load(novel_dir: PathBuf, embedder: Arc<EmbeddingModel>) -> Result<Self> {
        let index_file = index_path(&novel_dir);
        let documents_file = documents_path(&novel_dir);

        let has_index = tokio::fs::try_exists(&index_file).await?;
        let has_documents = tokio::fs::try_exists(&documents_file).await?;

        match (has_index, has_documents) {
            (false, false) => {
                log::info!(
                    "No vector store at {:?}, starting empty (model {}, dim {})",
                    vector_store_dir(&novel_dir),
                    embedder.model_id(),
                    embedder.dimension()
                );
                Ok(Self::empty(novel_dir, embedder))
            }
            (true, false) => Err(VectorStoreError::corrupt(
                &documents_file,
                "index artifact exists but the document artifact is missing",
            )),
            (false, true) => Err(VectorStoreError::corrupt(
                &index_file,
                "document artifact exists but the index artifact is missing",
            )),
            (true, true) => {
                log::info!("Loading vector store from {:?}", vector_store_dir(&novel_dir));
                let index_bytes = read_artifact(&index_file).await?;
                let document_bytes = read_artifact(&documents_file).await?;
                let (memory, header) = ChapterMemory::decode(
                    &index_bytes,
                    &document_bytes,
                    &vector_store_dir(&novel_dir),
                )?;

                if header.model_id != embedder.model_id() {
                    return Err(VectorStoreError::ModelMismatch {
                        stored: header.model_id,
                        current: embedder.model_id().to_string(),
                    });
                }
                if memory.dimension() != embedder.dimension() {
                    return Err(VectorStoreError::corrupt(
                        &index_file,
                        format!(
                            "index dimension {} does not match embedder dimension {}",
                            memory.dimension(),
                            embedder.dimension()
                        ),
                    ));
                }

                log::info!(
                    "Loaded {} entries (revision {})",
                    memory.len(),
                    header.revision
                );
                Ok(Self {
                    embedder,
                    memory,
                    novel_dir,
                    revision: header.revision,
                    dirty: false,
                })
            }
        }
    }

    /// A fresh, empty store for `novel_dir` that ignores anything already on
    /// disk. The next `save` replaces the persisted artifacts.
    #[must_use]
    pub fn empty(novel_dir: impl Into<PathBuf>, embedder: Arc<EmbeddingModel>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            memory: ChapterMemory::new(dimension),
            novel_dir: novel_dir.into(),
            revision: 0,
            dirty: false,
        }
    }

    /// Embed and index one chapter. Blank text is skipped silently.
    pub async fn add_document(&mut self, text: &str, chapter_index: i64) -> Result<()> {
        if is_blank(text) {
            log::debug!("Skipping empty text for chapter {chapter_index}");
            return Ok(());
        }

        let vector = self.embedder.embed(text).await?;
        let position = self
            .memory
            .push(chapter_index, text.to_string(), vector)?;
        self.dirty = true;

        log::debug!("Indexed chapter {chapter_index} at position {position}");
        Ok(())
    }

    /// Embed and index several chapters with a single embedder call. Blank
    /// texts are skipped; either every remaining entry is added or none is.
    /// Returns the number of entries added.
    pub async fn add_documents(&mut self, documents: &[(i64, &str)]) -> Result<usize> {
        let kept: Vec<(i64, &str)> = documents
            .iter()
            .copied()
            .filter(|(_, text)| !is_blank(text))
            .collect();
        if kept.is_empty() {
            return Ok(0);
        }

        let vectors = self
            .embedder
            .embed_batch(kept.iter().map(|(_, text)| *text).collect())
            .await?;
        let entries = kept
            .into_iter()
            .zip(vectors)
            .map(|((chapter_index, text), vector)| (chapter_index, text.to_string(), vector))
            .collect::<Vec<_>>();
        let added = entries.len();
        self.memory.extend(entries)?;
        self.dirty = true;

        log::info!("Indexed {added} entries. Total: {}", self.memory.len());
        Ok(added)
    }

    /// Texts of the `k` entries most similar to `query`, nearest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .search_hits(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    /// Like [`Self::search`] but keeps position, chapter and distance.
    pub async fn search_hits(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || is_blank(query) || self.memory.is_empty() {
            return Ok(Vec::new());
        }

        log::debug!("Searching {} entries (k={k})", self.memory.len());
        let query_vector = self.embedder.embed(query).await?;
        let hits = self.memory.search(&query_vector, k)?;
        log::debug!("Found {} results", hits.len());
        Ok(hits)
    }

    /// Persist index and documents under the novel directory.
    ///
    /// Each artifact is written to a temp file and renamed into place,
    /// documents first. Both carry the same revision, so a save interrupted
    /// between the two renames is reported as corrupt on the next load.
    pub async fn save(&mut self) -> Result<()> {
        let dir = vector_store_dir(&self.novel_dir);
        log::info!("Saving vector store to {dir:?}");
        tokio::fs::create_dir_all(&dir).await?;

        // Stay above any revision on disk; `empty` stores start at 0.
        let on_disk = self.revision_on_disk().await;
        if on_disk > self.revision {
            log::debug!("Artifacts on disk are at revision {on_disk}, saving above it");
        }
        let header = ArtifactHeader {
            model_id: self.embedder.model_id().to_string(),
            revision: self.revision.max(on_disk) + 1,
        };
        let (index_bytes, document_bytes) = self.memory.encode(&header)?;

        let index_file = index_path(&self.novel_dir);
        let documents_file = documents_path(&self.novel_dir);
        let index_tmp = tmp_path(&index_file);
        let documents_tmp = tmp_path(&documents_file);

        tokio::fs::write(&documents_tmp, document_bytes).await?;
        tokio::fs::write(&index_tmp, index_bytes).await?;
        tokio::fs::rename(&documents_tmp, &documents_file).await?;
        tokio::fs::rename(&index_tmp, &index_file).await?;

        self.revision = header.revision;
        self.dirty = false;
        log::info!(
            "Vector store saved ({} entries, revision {})",
            self.memory.len(),
            self.revision
        );
        Ok(())
    }

    /// Highest revision among the readable artifacts already on disk.
    async fn revision_on_disk(&self) -> u64 {
        let mut revision = 0;
        if let Ok(bytes) = tokio::fs::read(index_path(&self.novel_dir)).await {
            revision = revision.max(index_revision(&bytes).unwrap_or(0));
        }
        if let Ok(bytes) = tokio::fs::read(documents_path(&self.novel_dir)).await {
            revision = revision.max(documents_revision(&bytes).unwrap_or(0));
        }
        revision
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.memory.dimension()
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    #[must_use]
    pub fn location(&self) -> &Path {
        &self.novel_dir
    }

    /// True when entries were added since the last load or save.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn chapters(&self) -> Vec<i64> {
        self.memory.chapters()
    }

    #[must_use]
    pub const fn memory(&self) -> &ChapterMemory {
        &self.memory
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.memory.len(),
            dimension: self.memory.dimension(),
            model_id: self.embedder.model_id().to_string(),
            revision: self.revision,
            chapters: self.memory.chapters(),
            dirty: self.dirty,
        }
    }
}

async fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| VectorStoreError::corrupt(path, format!("artifact is unreadable: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn embedder() -> Arc<EmbeddingModel> {
        Arc::new(EmbeddingModel::lexical(64))
    }

    #[tokio::test]
    async fn add_and_search_on_fresh_store() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());

        store
            .add_document("The harbor burned at dawn.", 0)
            .await
            .unwrap();
        store
            .add_document("The queen signed the treaty.", 1)
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.is_dirty());
        let results = store.search("treaty with the queen", 1).await.unwrap();
        assert_eq!(results, vec!["The queen signed the treaty.".to_string()]);
    }

    #[tokio::test]
    async fn blank_inputs_are_no_ops() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();

        store.add_document("", 0).await.unwrap();
        store.add_document("  \n ", 1).await.unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());

        store.add_document("Some text", 2).await.unwrap();
        assert!(store.search("", 3).await.unwrap().is_empty());
        assert!(store.search("   ", 3).await.unwrap().is_empty());
        assert!(store.search("Some text", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_add_skips_blank_texts() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();

        let added = store
            .add_documents(&[(0, "prologue"), (1, " "), (2, "chapter two")])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.chapters(), vec![0, 2]);
        assert_eq!(store.memory().text_at(1).unwrap(), "chapter two");
        assert_eq!(store.add_documents(&[(3, "")]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn save_bumps_revision_and_clears_dirty_flag() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();
        store.add_document("text", 0).await.unwrap();
        store.save().await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.revision, 1);
        assert!(!stats.dirty);
        assert!(index_path(temp.path()).exists());
        assert!(documents_path(temp.path()).exists());
        assert!(!tmp_path(&index_path(temp.path())).exists());

        store.save().await.unwrap();
        assert_eq!(store.stats().revision, 2);
    }

    #[tokio::test]
    async fn reopening_with_another_model_is_a_mismatch() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();
        store.add_document("text", 0).await.unwrap();
        store.save().await.unwrap();

        let other = Arc::new(EmbeddingModel::lexical(32));
        let Err(err) = VectorStore::open(temp.path(), other).await else {
            panic!("expected a model mismatch");
        };
        assert!(matches!(err, VectorStoreError::ModelMismatch { .. }));
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn empty_store_ignores_existing_artifacts() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();
        store.add_document("old text", 0).await.unwrap();
        store.save().await.unwrap();

        let mut fresh = VectorStore::empty(temp.path(), embedder());
        assert!(fresh.is_empty());
        fresh.add_document("new text", 0).await.unwrap();
        fresh.save().await.unwrap();

        let reopened = VectorStore::open(temp.path(), embedder()).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.memory().text_at(0).unwrap(), "new text");
    }

    #[tokio::test]
    async fn embedding_failure_leaves_store_unchanged() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();
        store.add_document("The harbor burned.", 0).await.unwrap();
        store.save().await.unwrap();

        store.embedder = Arc::new(EmbeddingModel::failing(64));
        let err = store.add_document("A new chapter.", 1).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::EmbeddingError(_)));
        let err = store
            .add_documents(&[(1, "one"), (2, "two")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::EmbeddingError(_)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.memory().text_at(0).unwrap(), "The harbor burned.");
        assert!(store.memory().vector_at(1).is_err());
        assert!(store.memory().text_at(1).is_err());
        assert_eq!(store.chapters(), vec![0]);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn empty_store_saves_above_revision_on_disk() {
        let temp = TempDir::new().unwrap();
        let mut store = VectorStore::open(temp.path(), embedder()).await.unwrap();
        store.add_document("old text", 0).await.unwrap();
        store.save().await.unwrap();
        store.save().await.unwrap();
        assert_eq!(store.stats().revision, 2);

        let mut fresh = VectorStore::empty(temp.path(), embedder());
        fresh.add_document("new text", 0).await.unwrap();
        fresh.save().await.unwrap();
        assert_eq!(fresh.stats().revision, 3);

        let reopened = VectorStore::open(temp.path(), embedder()).await.unwrap();
        assert_eq!(reopened.stats().revision, 3);
    }
}
