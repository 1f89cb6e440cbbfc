use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};

pub const DOCUMENTS_SCHEMA_VERSION: u32 = 1;

/// Source text of one indexed entry and the chapter it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub chapter_index: i64,
    pub text: String,
}

/// Insertion-ordered documents; entry `n` belongs to index position `n`.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: Vec<StoredDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedDocuments {
    pub schema_version: u32,
    pub model_id: String,
    pub revision: u64,
    pub len: usize,
    pub documents: Vec<StoredDocument>,
}

pub(crate) fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chapter_index: i64, text: impl Into<String>) -> Result<usize> {
        let text = text.into();
        if is_blank(&text) {
            return Err(VectorStoreError::EmptyText);
        }
        self.documents.push(StoredDocument {
            chapter_index,
            text,
        });
        Ok(self.documents.len() - 1)
    }

    pub fn get(&self, position: usize) -> Result<&StoredDocument> {
        self.documents
            .get(position)
            .ok_or(VectorStoreError::OutOfRange {
                position,
                len: self.documents.len(),
            })
    }

    pub fn text_at(&self, position: usize) -> Result<&str> {
        self.get(position).map(|doc| doc.text.as_str())
    }

    pub fn chapter_index_at(&self, position: usize) -> Result<i64> {
        self.get(position).map(|doc| doc.chapter_index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredDocument> {
        self.documents.iter()
    }

    pub(crate) fn to_persisted(&self, model_id: &str, revision: u64) -> PersistedDocuments {
        PersistedDocuments {
            schema_version: DOCUMENTS_SCHEMA_VERSION,
            model_id: model_id.to_string(),
            revision,
            len: self.documents.len(),
            documents: self.documents.clone(),
        }
    }

    pub(crate) fn from_persisted(
        persisted: PersistedDocuments,
    ) -> std::result::Result<Self, String> {
        if persisted.schema_version != DOCUMENTS_SCHEMA_VERSION {
            return Err(format!(
                "unsupported documents schema_version {} (expected {DOCUMENTS_SCHEMA_VERSION})",
                persisted.schema_version
            ));
        }
        if persisted.len != persisted.documents.len() {
            return Err(format!(
                "documents header says {} entries but {} are present",
                persisted.len,
                persisted.documents.len()
            ));
        }
        if let Some(position) = persisted.documents.iter().position(|d| is_blank(&d.text)) {
            return Err(format!("document at position {position} has empty text"));
        }
        Ok(Self {
            documents: persisted.documents,
        })
    }

    /// Pretty JSON form of the document artifact.
    pub fn to_json(&self, model_id: &str, revision: u64) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(
            &self.to_persisted(model_id, revision),
        )?)
    }
}

pub(crate) fn decode_documents(bytes: &[u8]) -> std::result::Result<PersistedDocuments, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("document artifact is unreadable: {e}"))
}

#[derive(Deserialize)]
struct DocumentsHeader {
    revision: u64,
}

/// Revision stored in a document artifact.
pub(crate) fn documents_revision(bytes: &[u8]) -> Option<u64> {
    serde_json::from_slice::<DocumentsHeader>(bytes)
        .ok()
        .map(|header| header.revision)
}
