#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use localrag_core::config::{ChunkingSettings, InferenceSettings, OrchestratorSettings};
use localrag_core::memory::InMemoryVectorStore;
use localrag_core::traits::{Embedder, InferenceClient, TextStream, VectorStore};
use localrag_core::types::{
    Embedding, GenerateRequest, MetadataFilter, Stage, StepEvent, StepStatus, VectorMatch, VectorRecord,
};
use localrag_embed::HashEmbedder;
use localrag_engine::{Ingestor, Orchestrator, Retriever, SemanticCache};

pub const DIM: usize = 64;

/// Hashing embedder that counts how many texts it was asked to embed.
pub struct CountingEmbedder {
    inner: HashEmbedder,
    texts: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self { inner: HashEmbedder::new(DIM), texts: AtomicUsize::new(0) }
    }

    pub fn embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) {
        self.texts.store(0, Ordering::SeqCst);
    }
}

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize {
        DIM
    }
    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

/// Replies chosen by the first needle found in the prompt or system text.
#[derive(Default)]
pub struct ScriptedInference {
    rules: Vec<(String, String)>,
    failing: HashSet<String>,
    broken_streams: HashSet<String>,
    fallback: Vec<String>,
    calls: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn fail_model(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }

    /// Streams from this model yield one delta, then an error.
    pub fn break_stream(mut self, model: &str) -> Self {
        self.broken_streams.insert(model.to_string());
        self
    }

    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn reply(&self, req: &GenerateRequest) -> anyhow::Result<String> {
        self.calls.lock().expect("calls lock").push(req.clone());
        if self.failing.contains(&req.model) {
            bail!("model {} is offline", req.model);
        }
        let haystack = format!("{}\n{}", req.system.as_deref().unwrap_or(""), req.prompt);
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map_or_else(|| "default answer".to_string(), |(_, reply)| reply.clone()))
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<String> {
        self.reply(request)
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> anyhow::Result<TextStream> {
        let text = self.reply(request)?;
        let mut pieces: Vec<anyhow::Result<String>> = text.split_inclusive(' ').map(|p| Ok(p.to_string())).collect();
        if self.broken_streams.contains(&request.model) {
            pieces.truncate(1);
            pieces.push(Err(anyhow::anyhow!("connection reset")));
        }
        Ok(stream::iter(pieces).boxed())
    }

    async fn list_models(&self) -> Vec<String> {
        self.fallback.clone()
    }
}

/// A store whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> anyhow::Result<()> {
        bail!("store offline")
    }
    async fn query(&self, _v: &[f32], _k: usize, _f: Option<&MetadataFilter>) -> anyhow::Result<Vec<VectorMatch>> {
        bail!("store offline")
    }
    async fn count(&self) -> anyhow::Result<usize> {
        bail!("store offline")
    }
    async fn reset(&self) -> anyhow::Result<()> {
        bail!("store offline")
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub inference: Arc<ScriptedInference>,
    pub embedder: Arc<CountingEmbedder>,
    pub cache_store: Arc<InMemoryVectorStore>,
}

pub fn inference_settings(fallback: &[&str]) -> InferenceSettings {
    InferenceSettings {
        default_model: "m1".into(),
        num_ctx: 2048,
        fallback_models: fallback.iter().map(|s| (*s).to_string()).collect(),
        ..InferenceSettings::default()
    }
}

pub const NOTES: &str = "Rainwater tanks should be cleaned every spring.\n\n\
Solar panels on the barn produce most power around noon.\n\n\
Goats need fresh hay and clean water daily.";

async fn seeded_docs(embedder: Arc<CountingEmbedder>) -> Arc<dyn VectorStore> {
    let docs = Arc::new(InMemoryVectorStore::new());
    let ingestor = Ingestor::new(embedder, docs.clone(), &ChunkingSettings { chunk_size: 120, chunk_overlap: 10 })
        .expect("ingestor");
    ingestor.ingest_text("homestead.md", NOTES).await.expect("seed");
    docs
}

pub async fn harness(inference: ScriptedInference, settings: OrchestratorSettings) -> Harness {
    harness_with(inference, settings, &inference_settings(&["m1", "m2", "m3"]), None).await
}

pub async fn harness_with(
    inference: ScriptedInference,
    settings: OrchestratorSettings,
    inference_cfg: &InferenceSettings,
    docs: Option<Arc<dyn VectorStore>>,
) -> Harness {
    let embedder = Arc::new(CountingEmbedder::new());
    let docs = match docs {
        Some(d) => d,
        None => seeded_docs(embedder.clone()).await,
    };
    embedder.reset_count();

    let inference = Arc::new(inference);
    let cache_store = Arc::new(InMemoryVectorStore::new());
    let retriever = Arc::new(Retriever::new(embedder.clone(), docs, 2));
    let cache = Arc::new(SemanticCache::new(embedder.clone(), cache_store.clone(), 0.25));
    let orchestrator = Orchestrator::new(retriever, inference.clone(), settings, inference_cfg).with_cache(cache);
    Harness { orchestrator, inference, embedder, cache_store }
}

/// Stage/status pairs with runs of `streaming` collapsed to one entry.
pub fn timeline(events: &[StepEvent]) -> Vec<(Stage, StepStatus)> {
    let mut out: Vec<(Stage, StepStatus)> = Vec::new();
    for ev in events {
        let entry = (ev.stage, ev.status);
        if ev.status == StepStatus::Streaming && out.last() == Some(&entry) {
            continue;
        }
        out.push(entry);
    }
    out
}

/// Distinct stages in first-seen order.
pub fn stages(events: &[StepEvent]) -> Vec<Stage> {
    let mut out = Vec::new();
    for ev in events {
        if !out.contains(&ev.stage) {
            out.push(ev.stage);
        }
    }
    out
}

pub fn done_content(events: &[StepEvent], stage: Stage) -> Option<String> {
    events
        .iter()
        .find(|e| e.stage == stage && e.status == StepStatus::Done)
        .and_then(|e| e.content.clone())
}

pub fn plain_settings() -> OrchestratorSettings {
    OrchestratorSettings { stream_answers: false, ..OrchestratorSettings::default() }
}
