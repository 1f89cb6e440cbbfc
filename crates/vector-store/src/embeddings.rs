use crate::config::{EmbeddingConfig, EmbeddingMode};
use crate::error::{Result, VectorStoreError};
use ndarray::{Array, Axis, Dimension, Ix2, Ix3};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Input, Session, SessionInputs};
use ort::tensor::TensorElementType;
use ort::value::{DynTensor, Tensor};
use ort::Error as OrtError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

/// Bumped whenever the lexical feature scheme changes, so stores built with an
/// older scheme are reported as a model mismatch instead of silently drifting.
const LEXICAL_SCHEME: &str = "lexical-v1";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ModelId(String);

impl Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ModelId {
    fn from_raw(model_name: &str) -> Self {
        // Hub-style names ("jhgan/ko-sroberta-multitask") resolve by their last segment.
        let name = model_name
            .trim()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let normalized = match name.as_str() {
            "bge-small-en-v1.5" => "bge-small".to_string(),
            "bge-base-en-v1.5" => "bge-base".to_string(),
            other => other.to_string(),
        };
        Self(normalized)
    }

    fn spec(&self, model_dir: &Path) -> Result<ModelSpec> {
        let manifest_path = model_dir.join("manifest.json");
        if manifest_path.exists() {
            let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
                VectorStoreError::ModelLoadError(format!(
                    "Failed to read models manifest {}: {e}",
                    manifest_path.display()
                ))
            })?;
            let manifest: ModelsManifest = serde_json::from_str(&raw).map_err(|e| {
                VectorStoreError::ModelLoadError(format!(
                    "Invalid models manifest {}: {e}",
                    manifest_path.display()
                ))
            })?;
            if manifest.schema_version != 1 {
                return Err(VectorStoreError::ModelLoadError(format!(
                    "Unsupported models manifest schema_version {} (expected 1)",
                    manifest.schema_version
                )));
            }
            if let Some(model) = manifest
                .models
                .iter()
                .find(|m| Self::from_raw(&m.id) == *self)
            {
                return ModelSpec::from_manifest(self.clone(), model);
            }
        }

        builtin_spec(self).ok_or_else(|| {
            VectorStoreError::ModelLoadError(format!(
                "Unknown embedding model id '{}' and no manifest entry at {}",
                self.0,
                manifest_path.display()
            ))
        })
    }
}

#[derive(Clone, Debug)]
struct ModelSpec {
    id: ModelId,
    onnx_rel_path: PathBuf,
    tokenizer_rel_path: PathBuf,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

impl ModelSpec {
    fn from_manifest(id: ModelId, model: &ManifestModel) -> Result<Self> {
        let onnx_rel_path = match &model.onnx {
            Some(rel) => safe_rel_path(&model.id, rel)?,
            None => PathBuf::from("model.onnx"),
        };
        let tokenizer_rel_path = match &model.tokenizer {
            Some(rel) => safe_rel_path(&model.id, rel)?,
            None => PathBuf::from("tokenizer.json"),
        };
        if model.dimension == 0 || model.max_batch == 0 {
            return Err(VectorStoreError::ModelLoadError(format!(
                "Manifest entry for '{}' has zero dimension or batch size",
                model.id
            )));
        }
        Ok(Self {
            id,
            onnx_rel_path,
            tokenizer_rel_path,
            dimension: model.dimension,
            max_length: model.max_length,
            max_batch: model.max_batch,
        })
    }

    fn model_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.id.0).join(&self.onnx_rel_path)
    }

    fn tokenizer_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.id.0).join(&self.tokenizer_rel_path)
    }
}

fn builtin_spec(id: &ModelId) -> Option<ModelSpec> {
    let (dimension, max_length, max_batch) = match id.0.as_str() {
        "ko-sroberta-multitask" => (768, 128, 16),
        "bge-small" | "multilingual-e5-small" => (384, 512, 32),
        "bge-base" | "multilingual-e5-base" => (768, 512, 16),
        _ => return None,
    };
    Some(ModelSpec {
        id: id.clone(),
        onnx_rel_path: PathBuf::from("model.onnx"),
        tokenizer_rel_path: PathBuf::from("tokenizer.json"),
        dimension,
        max_length,
        max_batch,
    })
}

fn safe_rel_path(model_id: &str, rel: &str) -> Result<PathBuf> {
    let path = Path::new(rel);
    let mut has_component = false;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(VectorStoreError::ModelLoadError(format!(
                    "Invalid asset path for model '{model_id}': '{rel}' must stay inside the model directory"
                )));
            }
            Component::CurDir => {}
            Component::Normal(_) => has_component = true,
        }
    }
    if !has_component {
        return Err(VectorStoreError::ModelLoadError(format!(
            "Invalid asset path for model '{model_id}': path is empty"
        )));
    }
    Ok(path.to_path_buf())
}

#[derive(Debug, Deserialize)]
struct ModelsManifest {
    schema_version: u32,
    models: Vec<ManifestModel>,
}

#[derive(Debug, Deserialize)]
struct ManifestModel {
    id: String,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
    #[serde(default)]
    onnx: Option<String>,
    #[serde(default)]
    tokenizer: Option<String>,
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

impl OrtBackend {
    fn new(spec: &ModelSpec, model_dir: &Path, use_cuda: bool) -> Result<Self> {
        // Keep tokenization single-threaded unless the user opted in.
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let model_path = spec.model_path(model_dir);
        let tokenizer_path = spec.tokenizer_path(model_dir);
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::ModelLoadError(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {} (set NOVEL_MODEL_DIR or use NOVEL_EMBEDDING_MODE=lexical).",
                spec.id,
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| VectorStoreError::ModelLoadError(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                VectorStoreError::ModelLoadError(format!("Tokenizer truncation failed: {e}"))
            })?;

        let (intra_threads, inter_threads) = default_ort_threads();
        let session = Session::builder()
            .map_err(|e| to_model_load_error(&e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| to_model_load_error(&e))?
            .with_inter_threads(inter_threads)
            .map_err(|e| to_model_load_error(&e))?
            .with_intra_op_spinning(false)
            .map_err(|e| to_model_load_error(&e))?
            .with_execution_providers(execution_providers(use_cuda))
            .map_err(|e| {
                VectorStoreError::ModelLoadError(format!(
                    "Failed to register execution providers: {e}"
                ))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| to_model_load_error(&e))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                VectorStoreError::ModelLoadError(format!("Failed to load ONNX model: {e}"))
            })?;

        log::info!(
            "Loaded ONNX model '{}' (dim {}, max_length {}, batch {})",
            spec.id,
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("Tokenization failed: {e}"))
                })?;
            if encodings.is_empty() {
                continue;
            }

            let seq_len = encodings[0].len();
            if seq_len > self.max_length {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Tokenized length {seq_len} exceeds max_length {}",
                    self.max_length
                )));
            }
            if encodings.iter().any(|e| e.len() != seq_len) {
                return Err(VectorStoreError::EmbeddingError(
                    "Inconsistent sequence lengths after padding".to_string(),
                ));
            }
            let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);

            let ids_array = Array::from_shape_vec((batch.len(), seq_len), ids)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("IDs shape error: {e}")))?;
            let mask_array = Array::from_shape_vec((batch.len(), seq_len), masks)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Mask shape error: {e}")))?;
            let type_array = Array::from_shape_vec((batch.len(), seq_len), type_ids)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Types shape error: {e}")))?;
            let ids_shape = ids_array.raw_dim().into_dyn();

            let mut available: HashMap<String, DynTensor> = HashMap::new();
            available.insert(
                "input_ids".to_string(),
                Tensor::from_array(ids_array.into_dyn())
                    .map_err(|e| to_embedding_error(&e))?
                    .upcast(),
            );
            available.insert(
                "attention_mask".to_string(),
                Tensor::from_array(mask_array.into_dyn())
                    .map_err(|e| to_embedding_error(&e))?
                    .upcast(),
            );
            available.insert(
                "token_type_ids".to_string(),
                Tensor::from_array(type_array.into_dyn())
                    .map_err(|e| to_embedding_error(&e))?
                    .upcast(),
            );

            let array = {
                let mut session = self.session.lock().map_err(|_| {
                    VectorStoreError::EmbeddingError("Failed to lock ONNX session".into())
                })?;

                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in &session.inputs {
                    let key = input.name.clone();
                    if let Some(value) = available.remove(&key) {
                        feed.insert(key, value);
                    } else {
                        feed.insert(key, zero_tensor(&ids_shape, input)?);
                    }
                }

                let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("ONNX forward failed: {e}"))
                })?;
                if outputs.len() == 0 {
                    return Err(VectorStoreError::EmbeddingError(
                        "ONNX returned no outputs".to_string(),
                    ));
                }
                let array = outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        VectorStoreError::EmbeddingError(format!(
                            "Failed to decode ONNX output: {e}"
                        ))
                    })?
                    .to_owned();

                drop(outputs);
                drop(session);

                array
            };
            results.extend(embeddings_from_output(array, &mask_rows, self.dimension)?);
        }

        Ok(results)
    }
}

fn execution_providers(use_cuda: bool) -> Vec<ExecutionProviderDispatch> {
    let cpu = CPUExecutionProvider::default().build();
    if !use_cuda {
        return vec![cpu];
    }
    let cuda = CUDAExecutionProvider::default();
    match cuda.is_available() {
        Ok(true) => vec![cuda.build(), cpu],
        Ok(false) => {
            log::warn!("CUDA execution provider is not available, using CPU embeddings");
            vec![cpu]
        }
        Err(err) => {
            log::warn!("CUDA execution provider check failed ({err}), using CPU embeddings");
            vec![cpu]
        }
    }
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    let intra_threads = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };
    (intra_threads, 1)
}

fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for row in embeddings.outer_iter() {
                let mut emb = row.to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let attn = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample.view(), &attn);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_ids = encoding.get_ids();
        let encoding_masks = encoding.get_attention_mask();
        let encoding_types = encoding.get_type_ids();

        for idx in 0..seq_len {
            ids.push(i64::from(*encoding_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding_types.get(idx).unwrap_or(&0)));
        }
        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

fn zero_tensor(shape: &ndarray::IxDyn, input: &Input) -> Result<DynTensor> {
    let tensor = match &input.input_type {
        ort::value::ValueType::Tensor { ty, .. } => match ty {
            TensorElementType::Int64 => {
                Tensor::from_array(ndarray::Array::<i64, _>::zeros(shape.clone()))
                    .map_err(|e| to_embedding_error(&e))?
                    .upcast()
            }
            TensorElementType::Float32 => {
                Tensor::from_array(ndarray::Array::<f32, _>::zeros(shape.clone()))
                    .map_err(|e| to_embedding_error(&e))?
                    .upcast()
            }
            other => {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Cannot synthesize zeros for tensor type {other:?} (input {})",
                    input.name
                )))
            }
        },
        other => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported input type for zero init: {other:?}"
            )))
        }
    };
    Ok(tensor)
}

fn to_embedding_error(error: &OrtError) -> VectorStoreError {
    VectorStoreError::EmbeddingError(format!("{error}"))
}

fn to_model_load_error(error: &OrtError) -> VectorStoreError {
    VectorStoreError::ModelLoadError(format!("{error}"))
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Feature-hashing embedder over lowercase words and their character trigrams.
///
/// Texts sharing vocabulary (including inflected forms such as "dragon" and
/// "dragons") land close together under L2 distance. Empty text embeds to the
/// zero vector.
#[derive(Clone, Debug)]
struct LexicalBackend {
    dimension: usize,
}

impl LexicalBackend {
    const WORD_WEIGHT: f32 = 1.0;
    const TRIGRAM_WEIGHT: f32 = 0.5;

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vec, b"w:", word, Self::WORD_WEIGHT);

            let padded: Vec<char> = std::iter::once('<')
                .chain(word.chars())
                .chain(std::iter::once('>'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vec, b"g:", &trigram, Self::TRIGRAM_WEIGHT);
            }
        }
        normalize(&mut vec);
        vec
    }

    fn add_feature(&self, vec: &mut [f32], kind: &[u8], feature: &str, weight: f32) {
        let hash = fnv1a_64(&[kind, feature.as_bytes()]);
        let bucket = (hash % self.dimension as u64) as usize;
        // Signed buckets keep colliding features from only ever adding up.
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vec[bucket] += sign * weight;
    }
}

fn fnv1a_64(chunks: &[&[u8]]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for chunk in chunks {
        for byte in *chunk {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Lexical(LexicalBackend),
    #[cfg(test)]
    Failing,
}

/// Text embedder shared by every novel's store in the process.
///
/// Construct it once (loading an ONNX model is expensive) and hand out clones
/// of the `Arc` to each [`crate::VectorStore`]. `embed` takes `&self` and holds
/// no mutable state besides the ONNX session lock, so concurrent use from
/// several stores is fine.
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
    model_id: String,
}

impl EmbeddingModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        match config.mode {
            EmbeddingMode::Lexical => Ok(Self::lexical(config.lexical_dimension)),
            EmbeddingMode::Onnx => {
                let id = ModelId::from_raw(&config.model_id);
                let spec = id.spec(&config.model_dir)?;
                let backend = OrtBackend::new(&spec, &config.model_dir, config.use_cuda)?;
                Ok(Self {
                    dimension: spec.dimension,
                    model_id: format!("onnx:{}", spec.id),
                    backend: EmbeddingBackend::Ort(Arc::new(backend)),
                })
            }
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&EmbeddingConfig::from_env()?)
    }

    #[must_use]
    pub fn lexical(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("{LEXICAL_SCHEME}:{dimension}"),
            backend: EmbeddingBackend::Lexical(LexicalBackend { dimension }),
        }
    }

    /// Embedder whose every call fails with `EmbeddingError`.
    #[cfg(test)]
    pub(crate) fn failing(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("{LEXICAL_SCHEME}:{dimension}"),
            backend: EmbeddingBackend::Failing,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Identity tag persisted next to every index built with this model.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    /// One vector per input, in input order.
    pub async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let expected = texts.len();
        let vectors: Vec<Vec<f32>> = match &self.backend {
            EmbeddingBackend::Lexical(lexical) => {
                texts.into_iter().map(|text| lexical.embed(text)).collect()
            }
            EmbeddingBackend::Ort(backend) => {
                let owned: Vec<String> = texts.into_iter().map(ToString::to_string).collect();
                let backend = backend.clone();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))??
            }
            #[cfg(test)]
            EmbeddingBackend::Failing => {
                return Err(VectorStoreError::EmbeddingError(
                    "embedder unavailable".to_string(),
                ))
            }
        };

        if vectors.len() != expected {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Embedder returned {} vectors for {expected} inputs",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

impl std::fmt::Debug for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingModel")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use tempfile::TempDir;

    fn l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[tokio::test]
    async fn lexical_embeddings_are_deterministic_and_normalized() {
        let model = EmbeddingModel::lexical(128);
        let first = model.embed("The dragon circled the tower.").await.unwrap();
        let second = model.embed("The dragon circled the tower.").await.unwrap();

        assert_eq!(first.len(), 128);
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[tokio::test]
    async fn empty_batch_and_empty_text_do_not_fail() {
        let model = EmbeddingModel::lexical(64);
        assert!(model.embed_batch(vec![]).await.unwrap().is_empty());

        let out = model.embed_batch(vec!["", "word"]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![0.0; 64]);
        assert_eq!(out[1].len(), 64);
    }

    #[tokio::test]
    async fn lexical_embeddings_track_shared_vocabulary() {
        let model = EmbeddingModel::lexical(384);
        let query = model.embed("Tell me about dragons").await.unwrap();
        let dragon = model
            .embed("Chapter one text about a dragon.")
            .await
            .unwrap();
        let siege = model
            .embed("Chapter two text about a castle siege.")
            .await
            .unwrap();

        assert!(l2(&query, &dragon) < l2(&query, &siege));
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let model = EmbeddingModel::lexical(32);
        let batch = model.embed_batch(vec!["alpha", "beta"]).await.unwrap();
        assert_eq!(batch[0], model.embed("alpha").await.unwrap());
        assert_eq!(batch[1], model.embed("beta").await.unwrap());
    }

    #[test]
    fn lexical_model_id_encodes_scheme_and_dimension() {
        let model = EmbeddingModel::lexical(256);
        assert_eq!(model.model_id(), "lexical-v1:256");
        assert_eq!(model.dimension(), 256);
        assert_eq!(EmbeddingModel::lexical(0).dimension(), 1);
    }

    #[test]
    fn model_ids_are_normalized() {
        assert_eq!(
            ModelId::from_raw("jhgan/ko-sroberta-multitask").to_string(),
            "ko-sroberta-multitask"
        );
        assert_eq!(
            ModelId::from_raw(" BGE-small-en-v1.5 ").to_string(),
            "bge-small"
        );
    }

    #[test]
    fn onnx_mode_reports_missing_model_files() {
        let dir = TempDir::new().unwrap();
        let config = EmbeddingConfig {
            model_dir: dir.path().to_path_buf(),
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingModel::new(&config).unwrap_err();
        assert!(
            matches!(err, VectorStoreError::ModelLoadError(_)),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn onnx_mode_rejects_unknown_models() {
        let dir = TempDir::new().unwrap();
        let config = EmbeddingConfig {
            model_id: "no-such-model".to_string(),
            model_dir: dir.path().to_path_buf(),
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingModel::new(&config).unwrap_err();
        assert!(matches!(err, VectorStoreError::ModelLoadError(_)));
        assert!(err.to_string().contains("no-such-model"));
    }

    #[test]
    fn manifest_rejects_path_traversal_assets() {
        let dir = TempDir::new().unwrap();
        let manifest = r#"
{
  "schema_version": 1,
  "models": [
    {"id":"m1","dimension":8,"max_length":16,"max_batch":2,"onnx":"../evil.onnx"}
  ]
}
"#;
        std::fs::write(dir.path().join("manifest.json"), manifest).unwrap();
        let err = ModelId::from_raw("m1").spec(dir.path()).unwrap_err();
        assert!(
            err.to_string().contains("must stay inside the model directory"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn manifest_entries_override_builtin_table() {
        let dir = TempDir::new().unwrap();
        let manifest = r#"
{
  "schema_version": 1,
  "models": [
    {"id":"jhgan/ko-sroberta-multitask","dimension":16,"max_length":32,"max_batch":4}
  ]
}
"#;
        std::fs::write(dir.path().join("manifest.json"), manifest).unwrap();
        let spec = ModelId::from_raw("ko-sroberta-multitask")
            .spec(dir.path())
            .unwrap();
        assert_eq!(spec.dimension, 16);
        assert_eq!(spec.max_batch, 4);
        assert_eq!(
            spec.model_path(dir.path()),
            dir.path().join("ko-sroberta-multitask").join("model.onnx")
        );
    }

    #[tokio::test]
    #[ignore = "Requires ONNX model files under NOVEL_MODEL_DIR"]
    async fn onnx_embeddings_have_model_dimension() {
        let model = EmbeddingModel::from_env().unwrap();
        let embedding = model.embed("용이 성을 불태웠다").await.unwrap();
        assert_eq!(embedding.len(), model.dimension());
    }
}
