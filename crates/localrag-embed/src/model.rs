use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use localrag_core::config::{expand_path, EmbeddingSettings};
use localrag_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

/// BGE-M3 dense embeddings: XLM-RoBERTa hidden states, masked mean, L2 norm.
pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BgeM3Embedder {
    pub fn load(settings: &EmbeddingSettings) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 weights");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
        let weights: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!(dim = settings.dim, max_len = settings.max_len, "BGE-M3 model ready");

        Ok(Self { model, tokenizer, device, dim: settings.dim, max_len: settings.max_len })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let v: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if v.len() != self.dim {
            bail!("model produced {} dims, configured for {}", v.len(), self.dim);
        }
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            tracing::debug!(ms = elapsed.as_millis() as u64, chars = text.len(), "slow embedding");
        }
        Ok(v)
    }
}

impl Embedder for BgeM3Embedder {
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = configured {
        candidates.push(expand_path(dir));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            candidates.push(expand_path(dir));
        }
    }
    candidates.push(Path::new("../models/bge-m3").to_path_buf());
    candidates.push(Path::new("models/bge-m3").to_path_buf());

    candidates
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Could not locate BGE-M3 model directory (set embedding.model_dir or APP_MODEL_DIR)"))
}
