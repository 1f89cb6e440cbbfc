use crate::error::{Result, VectorStoreError};
use std::env;
use std::path::PathBuf;

pub const MODEL_CACHE_DIR_NAME: &str = "novel-memory";
pub const DEFAULT_MODEL_ID: &str = "ko-sroberta-multitask";
pub const DEFAULT_LEXICAL_DIMENSION: usize = 384;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Sentence-embedding model executed by ONNX Runtime.
    Onnx,
    /// Deterministic feature-hashing embedder, no model files required.
    Lexical,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" | "fast" => Ok(Self::Onnx),
            "lexical" | "stub" => Ok(Self::Lexical),
            other => Err(VectorStoreError::InvalidConfig(format!(
                "Unsupported NOVEL_EMBEDDING_MODE '{other}' (expected 'onnx' or 'lexical')"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Lexical => "lexical",
        }
    }
}

/// Everything needed to construct the process-wide [`crate::EmbeddingModel`].
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,
    pub model_id: String,
    pub model_dir: PathBuf,
    pub use_cuda: bool,
    pub lexical_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Onnx,
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_dir: default_model_dir(),
            use_cuda: false,
            lexical_dimension: DEFAULT_LEXICAL_DIMENSION,
        }
    }
}

impl EmbeddingConfig {
    /// Lexical configuration with the default dimension. Handy for tests and
    /// for running without downloaded models.
    #[must_use]
    pub fn lexical() -> Self {
        Self {
            mode: EmbeddingMode::Lexical,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("NOVEL_EMBEDDING_MODE") {
            config.mode = EmbeddingMode::parse(&raw)?;
        }
        if let Ok(model) = env::var("NOVEL_EMBEDDING_MODEL") {
            let model = model.trim();
            if model.is_empty() {
                return Err(VectorStoreError::InvalidConfig(
                    "NOVEL_EMBEDDING_MODEL is set but empty".to_string(),
                ));
            }
            config.model_id = model.to_string();
        }
        if let Ok(dir) = env::var("NOVEL_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var("NOVEL_USE_CUDA") {
            config.use_cuda = parse_flag("NOVEL_USE_CUDA", &raw)?;
        }
        if let Ok(raw) = env::var("NOVEL_LEXICAL_DIMENSION") {
            config.lexical_dimension = parse_positive("NOVEL_LEXICAL_DIMENSION", &raw)?;
        }

        Ok(config)
    }
}

/// Knobs the orchestrator uses when pulling context for the next chapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = env::var("NOVEL_RAG_TOP_K") {
            config.top_k = parse_positive("NOVEL_RAG_TOP_K", &raw)?;
        }
        Ok(config)
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(VectorStoreError::InvalidConfig(format!(
            "Invalid {name} '{other}' (expected 1/0/true/false)"
        ))),
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(VectorStoreError::InvalidConfig(format!(
            "Invalid {name} '{raw}' (expected a positive integer)"
        ))),
    }
}

/// Resolve the directory holding `<model_id>/model.onnx` assets.
#[must_use]
pub fn default_model_dir() -> PathBuf {
    // A `models/` folder next to the binary wins, so an installed tool keeps
    // using its own assets regardless of the working directory.
    if let Ok(exe) = env::current_exe() {
        if let Some(mut dir) = exe.parent().map(std::path::Path::to_path_buf) {
            loop {
                let candidate = dir.join("models");
                if candidate.join("manifest.json").exists() {
                    return candidate;
                }
                if !dir.pop() {
                    break;
                }
            }
        }
    }

    if let Ok(mut dir) = env::current_dir() {
        loop {
            let candidate = dir.join("models");
            if candidate.join("manifest.json").exists() {
                return candidate;
            }
            if !dir.pop() {
                break;
            }
        }
    }

    if let Ok(path) = env::var("XDG_CACHE_HOME") {
        return PathBuf::from(path).join(MODEL_CACHE_DIR_NAME).join("models");
    }

    env::var("HOME")
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
        .join(".cache")
        .join(MODEL_CACHE_DIR_NAME)
        .join("models")
}
