use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::application::ports::{Embedder, EmbedderError};
use crate::domain::Embedding;
use crate::presentation::config::EmbeddingPooling;

const BGE_EN_QUERY_INSTRUCTION: &str =
    "Represent this sentence for searching relevant passages: ";

/// BERT-family sentence embedder running on candle, weights pulled from the
/// Hugging Face hub on first use and cached locally.
pub struct LocalCandleEmbedder {
    inner: Arc<CandleModel>,
    query_instruction: Option<String>,
}

struct CandleModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pooling: EmbeddingPooling,
    hidden_size: usize,
}

impl LocalCandleEmbedder {
    pub fn new(model_id: &str, pooling: EmbeddingPooling) -> Result<Self, EmbedderError> {
        let device = Self::select_device();

        tracing::info!(
            device = ?device,
            model = model_id,
            pooling = ?pooling,
            "Initializing local Candle embedding model"
        );

        let api = Api::new().map_err(|e| EmbedderError::ModelLoadFailed(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer.json: {}", e)))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model.safetensors: {}", e)))?;

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("read config: {}", e)))?;
        let config: BertConfig = serde_json::from_str(&config_contents)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("parse config: {}", e)))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("truncation config: {}", e)))?;

        let dtype = Self::select_dtype(&device);

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, &device)
                .map_err(|e| EmbedderError::ModelLoadFailed(format!("weights: {}", e)))?
        };

        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model: {}", e)))?;

        tracing::info!("Local Candle embedding model loaded");

        Ok(Self {
            inner: Arc::new(CandleModel {
                model,
                tokenizer,
                device,
                pooling,
                hidden_size: config.hidden_size,
            }),
            query_instruction: default_query_instruction(model_id).map(str::to_string),
        })
    }

    /// Overrides the prefix prepended to queries (not documents) before embedding.
    pub fn with_query_instruction(mut self, instruction: Option<String>) -> Self {
        self.query_instruction = instruction.filter(|i| !i.is_empty());
        self
    }

    fn select_device() -> Device {
        Device::new_metal(0).unwrap_or(Device::Cpu)
    }

    fn select_dtype(device: &Device) -> DType {
        if device.is_cpu() {
            DType::F32
        } else {
            DType::F16
        }
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.encode_texts(&texts))
            .await
            .map_err(|e| EmbedderError::InferenceFailed(format!("task join error: {e}")))?
    }
}

/// BGE English checkpoints expect an instruction in front of retrieval queries.
pub fn default_query_instruction(model_id: &str) -> Option<&'static str> {
    let id = model_id.to_ascii_lowercase();
    (id.starts_with("baai/bge-") && id.contains("-en")).then_some(BGE_EN_QUERY_INSTRUCTION)
}

fn inference_error(e: candle_core::Error) -> EmbedderError {
    EmbedderError::InferenceFailed(e.to_string())
}

impl CandleModel {
    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| EmbedderError::InferenceFailed(format!("tokenization: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let batch_size = texts.len();
        let mut all_input_ids = Vec::with_capacity(batch_size * max_len);
        let mut all_type_ids = Vec::with_capacity(batch_size * max_len);
        let mut all_attention_mask = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let pad_len = max_len - encoding.get_ids().len();

            all_input_ids.extend_from_slice(encoding.get_ids());
            all_input_ids.extend(std::iter::repeat_n(0u32, pad_len));

            all_type_ids.extend_from_slice(encoding.get_type_ids());
            all_type_ids.extend(std::iter::repeat_n(0u32, pad_len));

            all_attention_mask.extend_from_slice(encoding.get_attention_mask());
            all_attention_mask.extend(std::iter::repeat_n(0u32, pad_len));
        }

        let input_ids = Tensor::from_vec(all_input_ids, (batch_size, max_len), &self.device)
            .map_err(inference_error)?;
        let token_type_ids = Tensor::from_vec(all_type_ids, (batch_size, max_len), &self.device)
            .map_err(inference_error)?;
        let attention_mask =
            Tensor::from_vec(all_attention_mask, (batch_size, max_len), &self.device)
                .map_err(inference_error)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(inference_error)?;

        let pooled = match self.pooling {
            EmbeddingPooling::Cls => hidden
                .narrow(1, 0, 1)
                .and_then(|t| t.squeeze(1))
                .map_err(inference_error)?,
            EmbeddingPooling::Mean => {
                mean_pool(&hidden, &attention_mask).map_err(inference_error)?
            }
        };

        let mut results = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut values: Vec<f32> = pooled
                .get(i)
                .and_then(|row| row.to_vec1())
                .map_err(inference_error)?;
            l2_normalize(&mut values);
            results.push(values);
        }

        Ok(results)
    }
}

fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(DType::F32)?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let token_counts = mask.sum(1)?.unsqueeze(1)?;
    summed.broadcast_div(&token_counts)
}

fn l2_normalize(v: &mut [f32]) {
    let length: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if length > 0.0 {
        v.iter_mut().for_each(|x| *x /= length);
    }
}

#[async_trait]
impl Embedder for LocalCandleEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
        let query = match &self.query_instruction {
            Some(instruction) => format!("{instruction}{text}"),
            None => text.to_string(),
        };
        self.encode(vec![query])
            .await?
            .into_iter()
            .next()
            .map(Embedding::new)
            .ok_or_else(|| EmbedderError::InferenceFailed("empty result".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned = texts.iter().map(|t| (*t).to_string()).collect();
        Ok(self
            .encode(owned)
            .await?
            .into_iter()
            .map(Embedding::new)
            .collect())
    }

    async fn dimensions(&self) -> Result<usize, EmbedderError> {
        Ok(self.inner.hidden_size)
    }
}
