use std::path::{Path, PathBuf};

pub const VECTOR_STORE_DIR_NAME: &str = "vector_store";
pub const INDEX_FILE_NAME: &str = "novel.index";
pub const DOCUMENTS_SUFFIX: &str = ".docs.json";
pub const CHAPTERS_DIR_NAME: &str = "chapters";

#[must_use]
pub fn vector_store_dir(novel_dir: &Path) -> PathBuf {
    novel_dir.join(VECTOR_STORE_DIR_NAME)
}

/// Binary index artifact: `<novel>/vector_store/novel.index`.
#[must_use]
pub fn index_path(novel_dir: &Path) -> PathBuf {
    vector_store_dir(novel_dir).join(INDEX_FILE_NAME)
}

/// Document artifact, named after the index: `novel.index.docs.json`.
#[must_use]
pub fn documents_path(novel_dir: &Path) -> PathBuf {
    vector_store_dir(novel_dir).join(format!("{INDEX_FILE_NAME}{DOCUMENTS_SUFFIX}"))
}

#[must_use]
pub fn chapters_dir(novel_dir: &Path) -> PathBuf {
    novel_dir.join(CHAPTERS_DIR_NAME)
}

/// Sibling temp path used for write-then-rename.
#[must_use]
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
