use crate::documents::{decode_documents, is_blank, DocumentStore, StoredDocument};
use crate::error::{Result, VectorStoreError};
use crate::flat_index::{decode_index, SimilarityIndex};
use crate::types::SearchHit;
use std::path::Path;

/// Similarity index and document list behind one API.
///
/// Every mutation appends to both collections or to neither, so position `n`
/// in the index always describes document `n`. Neither half is reachable on
/// its own from outside the crate.
#[derive(Debug, Clone)]
pub struct ChapterMemory {
    index: SimilarityIndex,
    documents: DocumentStore,
}

/// Header values shared by both persisted artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArtifactHeader {
    pub model_id: String,
    pub revision: u64,
}

impl ChapterMemory {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            index: SimilarityIndex::new(dimension),
            documents: DocumentStore::new(),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Append one entry and return its position.
    pub fn push(&mut self, chapter_index: i64, text: String, vector: Vec<f32>) -> Result<usize> {
        let position = self.len();
        self.extend(vec![(chapter_index, text, vector)])?;
        Ok(position)
    }

    /// Append a batch of `(chapter_index, text, vector)` entries. The batch is
    /// validated up front; on any error the memory is left untouched.
    pub fn extend(&mut self, entries: Vec<(i64, String, Vec<f32>)>) -> Result<()> {
        for (_, text, vector) in &entries {
            if is_blank(text) {
                return Err(VectorStoreError::EmptyText);
            }
            if vector.len() != self.dimension() {
                return Err(VectorStoreError::InvalidDimension {
                    expected: self.dimension(),
                    actual: vector.len(),
                });
            }
        }

        // Everything append and add reject was checked above.
        let mut vectors = Vec::with_capacity(entries.len());
        for (chapter_index, text, vector) in entries {
            self.documents.append(chapter_index, text)?;
            vectors.push(vector);
        }
        self.index.add(&vectors)?;

        debug_assert_eq!(self.index.len(), self.documents.len());
        Ok(())
    }

    /// Nearest entries to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.index
            .search(query, k)?
            .into_iter()
            .map(|(position, distance)| {
                let doc = self.documents.get(position)?;
                Ok(SearchHit {
                    position,
                    chapter_index: doc.chapter_index,
                    text: doc.text.clone(),
                    distance,
                })
            })
            .collect()
    }

    pub fn text_at(&self, position: usize) -> Result<&str> {
        self.documents.text_at(position)
    }

    pub fn chapter_index_at(&self, position: usize) -> Result<i64> {
        self.documents.chapter_index_at(position)
    }

    pub fn vector_at(&self, position: usize) -> Result<Vec<f32>> {
        self.index.vector(position)
    }

    pub fn documents(&self) -> impl Iterator<Item = &StoredDocument> {
        self.documents.iter()
    }

    /// Distinct chapter indices in first-seen order.
    #[must_use]
    pub fn chapters(&self) -> Vec<i64> {
        let mut seen = Vec::new();
        for doc in self.documents.iter() {
            if !seen.contains(&doc.chapter_index) {
                seen.push(doc.chapter_index);
            }
        }
        seen
    }

    /// Encode both artifacts with a shared header. Returns `(index, documents)`.
    pub(crate) fn encode(&self, header: &ArtifactHeader) -> Result<(Vec<u8>, Vec<u8>)> {
        let index = self.index.to_bytes(&header.model_id, header.revision)?;
        let documents = self.documents.to_json(&header.model_id, header.revision)?;
        Ok((index, documents))
    }

    /// Decode both artifacts and cross-check them. `path` only labels errors.
    pub(crate) fn decode(
        index_bytes: &[u8],
        document_bytes: &[u8],
        path: &Path,
    ) -> Result<(Self, ArtifactHeader)> {
        let corrupt = |reason: String| VectorStoreError::corrupt(path, reason);

        let persisted_index = decode_index(index_bytes).map_err(corrupt)?;
        let persisted_docs = decode_documents(document_bytes).map_err(corrupt)?;

        if persisted_index.model_id != persisted_docs.model_id {
            return Err(corrupt(format!(
                "index was written by model '{}' but documents by '{}'",
                persisted_index.model_id, persisted_docs.model_id
            )));
        }
        if persisted_index.revision != persisted_docs.revision {
            return Err(corrupt(format!(
                "index revision {} does not match documents revision {} (interrupted save?)",
                persisted_index.revision, persisted_docs.revision
            )));
        }
        if persisted_index.len != persisted_docs.documents.len() {
            return Err(corrupt(format!(
                "index holds {} vectors but {} documents are present",
                persisted_index.len,
                persisted_docs.documents.len()
            )));
        }

        let header = ArtifactHeader {
            model_id: persisted_index.model_id.clone(),
            revision: persisted_index.revision,
        };
        let index = SimilarityIndex::from_persisted(persisted_index).map_err(corrupt)?;
        let documents = DocumentStore::from_persisted(persisted_docs).map_err(corrupt)?;

        Ok((Self { index, documents }, header))
    }
}
