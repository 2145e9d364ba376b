//! Staged reasoning pipelines over retrieval and inference.
//!
//! A run pushes [`StepEvent`]s onto an [`EventSink`] as it goes and returns a
//! [`PipelineOutcome`]. Inference failures never abort a run: they become the
//! stage's content and flow downstream like any other draft.
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use localrag_core::config::{InferenceSettings, OrchestratorSettings};
use localrag_core::traits::InferenceClient;
use localrag_core::types::{Embedding, GenerateOptions, GenerateRequest, Meta, Stage, StepEvent};
use localrag_core::{Error, Result};

use crate::cache::SemanticCache;
use crate::events::EventSink;
use crate::prompts;
use crate::retriever::{format_context, sources, Retriever};

/// Prefix of the in-band text a failed generation leaves in its stage.
pub const ERROR_PREFIX: &str = "Error computing response: ";

const TEMP_SIMPLE: f32 = 0.7;
const TEMP_PROVOCATEUR: f32 = 0.8;
const TEMP_CRITIC: f32 = 0.1;
const TEMP_SYNTHESIZER: f32 = 0.3;
const TEMP_DECOMPOSITION: f32 = 0.2;
const TEMP_HYPOTHESIS: f32 = 0.7;
const TEMP_CRITIQUE: f32 = 0.1;
const TEMP_REFINEMENT: f32 = 0.3;
const TEMP_VOTE: f32 = 0.5;
const TEMP_AGGREGATOR: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Simple,
    Swarm,
    Poetiq,
    DeepReasoning,
    Consensus,
}

impl Pipeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Pipeline::Simple => "simple",
            Pipeline::Swarm => "swarm",
            Pipeline::Poetiq => "poetiq",
            Pipeline::DeepReasoning => "deep_reasoning",
            Pipeline::Consensus => "consensus",
        }
    }

    /// Consensus answers depend on a whole roster, so they are never cached.
    pub fn cacheable(self) -> bool {
        !matches!(self, Pipeline::Consensus)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "simple" | "rag" => Ok(Pipeline::Simple),
            "swarm" | "multi_agent" => Ok(Pipeline::Swarm),
            "poetiq" | "trap" => Ok(Pipeline::Poetiq),
            "deep" | "deep_reasoning" => Ok(Pipeline::DeepReasoning),
            "consensus" => Ok(Pipeline::Consensus),
            other => Err(Error::InvalidConfig(format!("unknown pipeline '{other}'"))),
        }
    }
}

/// One question to answer.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    /// Falls back to the configured default model. May carry the trap marker.
    pub model: Option<String>,
    pub pipeline: Pipeline,
    pub use_cache: bool,
    /// Consensus participants; empty means use the configured roster.
    pub participants: Vec<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), model: None, pipeline: Pipeline::Simple, use_cache: true, participants: Vec::new() }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn participants<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = models.into_iter().map(Into::into).collect();
        self
    }
}

/// Where a request goes after the trap marker is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pipeline: Pipeline,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub pipeline: Pipeline,
    pub model: String,
    pub answer: String,
    pub context: String,
    pub sources: Vec<Meta>,
    pub cached: bool,
}

struct Retrieved {
    context: String,
    sources: Vec<Meta>,
}

struct Answer {
    text: String,
    model: String,
    retrieved: Retrieved,
}

#[derive(Clone)]
pub struct Orchestrator {
    retriever: Arc<Retriever>,
    inference: Arc<dyn InferenceClient>,
    cache: Option<Arc<SemanticCache>>,
    settings: OrchestratorSettings,
    default_model: String,
    num_ctx: u32,
    fallback_models: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        inference: Arc<dyn InferenceClient>,
        settings: OrchestratorSettings,
        inference_settings: &InferenceSettings,
    ) -> Self {
        Self {
            retriever,
            inference,
            cache: None,
            settings,
            default_model: inference_settings.default_model.clone(),
            num_ctx: inference_settings.num_ctx,
            fallback_models: inference_settings.fallback_models.clone(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<SemanticCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve the model and pipeline. A model carrying the trap marker is
    /// stripped of it and forced onto the PoetIQ pipeline.
    pub fn route(&self, model: Option<&str>, pipeline: Pipeline) -> Route {
        let requested = model.map(str::trim).filter(|m| !m.is_empty()).unwrap_or(self.default_model.as_str());
        let marker = self.settings.trap_marker.as_str();
        match requested.strip_prefix(marker).filter(|_| !marker.is_empty()) {
            Some(rest) => {
                let rest = rest.trim();
                let model = if rest.is_empty() { self.default_model.clone() } else { rest.to_string() };
                Route { pipeline: Pipeline::Poetiq, model }
            }
            None => Route { pipeline, model: requested.to_string() },
        }
    }

    /// Run to completion, returning the outcome and every emitted event.
    pub async fn run(&self, request: QueryRequest) -> Result<(PipelineOutcome, Vec<StepEvent>)> {
        let (sink, mut rx) = EventSink::channel();
        let outcome = self.execute(request, &sink).await?;
        drop(sink);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        Ok((outcome, events))
    }

    /// Run on a background task. Dropping the receiver cancels the run.
    pub fn stream(&self, request: QueryRequest) -> (UnboundedReceiver<StepEvent>, JoinHandle<Result<PipelineOutcome>>) {
        let (sink, rx) = EventSink::channel();
        let this = self.clone();
        let handle = tokio::spawn(async move { this.execute(request, &sink).await });
        (rx, handle)
    }

    pub async fn execute(&self, request: QueryRequest, sink: &EventSink) -> Result<PipelineOutcome> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(Error::InvalidConfig("query must not be empty".into()));
        }
        let route = self.route(request.model.as_deref(), request.pipeline);
        let participants = match route.pipeline {
            Pipeline::Consensus => self.participants(&request.participants)?,
            _ => Vec::new(),
        };
        tracing::info!(pipeline = %route.pipeline, model = %route.model, "pipeline run started");

        let cache = self.cache.as_ref().filter(|_| request.use_cache && route.pipeline.cacheable());
        let partition = cache_partition(&route);
        let mut query_embedding: Option<Embedding> = None;

        if let Some(cache) = cache {
            sink.running(Stage::Cache, "Checking semantic cache...")?;
            match cache.lookup(&query, &partition).await {
                Ok(lookup) => {
                    if let Some(hit) = lookup.hit {
                        sink.emit(
                            StepEvent::done(Stage::Cache, hit.response.clone())
                                .with_message(format!("Cache hit (distance {:.4})", hit.distance)),
                        )?;
                        self.final_output(sink, &hit.response)?;
                        return Ok(PipelineOutcome {
                            pipeline: route.pipeline,
                            model: route.model,
                            answer: hit.response,
                            context: String::new(),
                            sources: Vec::new(),
                            cached: true,
                        });
                    }
                    let message = match lookup.nearest {
                        Some(d) => format!("No cached answer (nearest distance {d:.4})"),
                        None => "No cached answer".to_string(),
                    };
                    sink.emit(StepEvent::done(Stage::Cache, "").with_message(message))?;
                    query_embedding = Some(lookup.embedding);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cache lookup failed");
                    sink.emit(StepEvent::done(Stage::Cache, "").with_message(format!("Cache unavailable: {e}")))?;
                }
            }
        }

        let answer = match route.pipeline {
            Pipeline::Simple => self.simple(sink, &query, &route.model, query_embedding.clone()).await?,
            Pipeline::Swarm => self.swarm(sink, &query, &route.model, query_embedding.clone()).await?,
            Pipeline::Poetiq => self.poetiq(sink, &query, &route.model, query_embedding.clone()).await?,
            Pipeline::DeepReasoning => self.deep_reasoning(sink, &query, &route.model).await?,
            Pipeline::Consensus => self.consensus(sink, &query, &participants, query_embedding.clone()).await?,
        };
        self.final_output(sink, &answer.text)?;

        if let Some(cache) = cache {
            if answer.text.contains(ERROR_PREFIX.trim_end()) || answer.text.trim().is_empty() {
                tracing::info!(model = %route.model, "answer not cached");
            } else {
                let stored = match query_embedding {
                    Some(embedding) => cache.store_with_embedding(&query, &answer.text, &partition, embedding).await,
                    None => cache.store(&query, &answer.text, &partition).await,
                };
                if let Err(e) = stored {
                    tracing::warn!(error = %e, "failed to store answer in cache");
                }
            }
        }

        tracing::info!(
            pipeline = %route.pipeline,
            model = %answer.model,
            chars = answer.text.len(),
            "pipeline run finished"
        );
        Ok(PipelineOutcome {
            pipeline: route.pipeline,
            model: answer.model,
            answer: answer.text,
            context: answer.retrieved.context,
            sources: answer.retrieved.sources,
            cached: false,
        })
    }

    async fn simple(&self, sink: &EventSink, query: &str, model: &str, embedding: Option<Embedding>) -> Result<Answer> {
        let retrieved = self.retrieve(sink, query, embedding).await?;
        let request = self
            .request(model, query, TEMP_SIMPLE)
            .system(prompts::simple_system(&retrieved.context));
        let text = self
            .generate_stage(sink, Stage::Generation, "Generating answer...", request, self.settings.stream_answers)
            .await?;
        Ok(Answer { text, model: model.to_string(), retrieved })
    }

    async fn swarm(&self, sink: &EventSink, query: &str, model: &str, embedding: Option<Embedding>) -> Result<Answer> {
        let retrieved = self.retrieve(sink, query, embedding).await?;
        let ctx = &retrieved.context;

        let draft_req = self.request(model, prompts::provocateur(query, ctx), TEMP_PROVOCATEUR);
        let draft = self
            .generate_stage(sink, Stage::Provocateur, "Provocateur is brainstorming...", draft_req, false)
            .await?;

        let audit_req = self.request(model, prompts::critic(&draft, ctx), TEMP_CRITIC);
        let audit = self
            .generate_stage(sink, Stage::Critic, "Critic is auditing the draft...", audit_req, false)
            .await?;

        let synth_req = self.request(model, prompts::synthesizer(query, &draft, &audit), TEMP_SYNTHESIZER);
        let text = self
            .generate_stage(
                sink,
                Stage::Synthesizer,
                "Synthesizer is writing final response...",
                synth_req,
                self.settings.stream_answers,
            )
            .await?;
        Ok(Answer { text, model: model.to_string(), retrieved })
    }

    async fn poetiq(&self, sink: &EventSink, query: &str, model: &str, embedding: Option<Embedding>) -> Result<Answer> {
        let retrieved = self.retrieve(sink, query, embedding).await?;
        let text = self.hypothesize_and_check(sink, query, model, &retrieved.context, None).await?;
        Ok(Answer { text, model: model.to_string(), retrieved })
    }

    async fn deep_reasoning(&self, sink: &EventSink, query: &str, model: &str) -> Result<Answer> {
        let plan_req = self.request(model, prompts::decomposition(query), TEMP_DECOMPOSITION);
        let plan = self
            .generate_stage(sink, Stage::Decomposition, "Breaking the question into steps...", plan_req, false)
            .await?;

        // The augmented text differs from the query, so a cached query embedding does not apply.
        let retrieved = self.retrieve(sink, &prompts::augmented_query(query, &plan), None).await?;
        let text = self
            .hypothesize_and_check(sink, query, model, &retrieved.context, Some(&plan))
            .await?;
        Ok(Answer { text, model: model.to_string(), retrieved })
    }

    /// hypothesis → critique → at most one refinement.
    async fn hypothesize_and_check(
        &self,
        sink: &EventSink,
        query: &str,
        model: &str,
        context: &str,
        plan: Option<&str>,
    ) -> Result<String> {
        let hyp_req = self.request(model, prompts::hypothesis(query, context, plan), TEMP_HYPOTHESIS);
        let hypothesis = self
            .generate_stage(sink, Stage::Hypothesis, "Drafting a hypothesis...", hyp_req, false)
            .await?;

        let crit_req = self.request(model, prompts::critique(query, context, &hypothesis), TEMP_CRITIQUE);
        let critique = self
            .generate_stage(sink, Stage::Critique, "Checking the hypothesis for errors...", crit_req, false)
            .await?;

        if critique_passes(&critique) {
            tracing::debug!(model, "critique passed; skipping refinement");
            return Ok(hypothesis);
        }
        let refine_prompt = prompts::refinement(query, context, &hypothesis, &critique);
        let refine_req = self.request(model, refine_prompt, TEMP_REFINEMENT);
        self.generate_stage(
            sink,
            Stage::Refinement,
            "Refining the answer...",
            refine_req,
            self.settings.stream_answers,
        )
        .await
    }

    async fn consensus(
        &self,
        sink: &EventSink,
        query: &str,
        models: &[String],
        embedding: Option<Embedding>,
    ) -> Result<Answer> {
        sink.running(Stage::ConsensusInit, format!("Convening council of {} models...", models.len()))?;
        let retrieved = match self.search(query, embedding).await {
            Ok(r) => {
                sink.emit(StepEvent::done(Stage::ConsensusInit, r.context.clone()).with_sources(r.sources.clone()))?;
                r
            }
            Err(e) => {
                tracing::warn!(error = %e, "consensus retrieval failed");
                sink.emit(
                    StepEvent::done(Stage::ConsensusInit, "")
                        .with_message(format!("Retrieval failed: {e}"))
                        .with_sources(Vec::new()),
                )?;
                Retrieved { context: String::new(), sources: Vec::new() }
            }
        };

        let prompt = prompts::vote(query, &retrieved.context);
        let requests: Vec<GenerateRequest> =
            models.iter().map(|m| self.request(m, prompt.clone(), TEMP_VOTE)).collect();
        let mut votes: Vec<(String, String)> = Vec::with_capacity(models.len());

        if self.settings.parallel_votes {
            for model in models {
                sink.emit(StepEvent::running(Stage::ModelVote, format!("Thinking: {model}...")).with_model(model))?;
            }
            let results = join_all(requests.iter().map(|r| self.inference.generate(r))).await;
            for (model, result) in models.iter().zip(results) {
                self.record_vote(sink, model, result, &mut votes)?;
            }
        } else {
            for (model, request) in models.iter().zip(&requests) {
                sink.emit(StepEvent::running(Stage::ModelVote, format!("Thinking: {model}...")).with_model(model))?;
                let result = self.inference.generate(request).await;
                self.record_vote(sink, model, result, &mut votes)?;
            }
        }

        let aggregator = models[0].clone();
        let agg_req = self.request(&aggregator, prompts::aggregator(query, &votes), TEMP_AGGREGATOR);
        let text = self
            .generate_stage(
                sink,
                Stage::Aggregator,
                "Aggregating consensus...",
                agg_req,
                self.settings.stream_answers,
            )
            .await?;
        Ok(Answer { text, model: aggregator, retrieved })
    }

    fn record_vote(
        &self,
        sink: &EventSink,
        model: &str,
        result: anyhow::Result<String>,
        votes: &mut Vec<(String, String)>,
    ) -> Result<()> {
        match result {
            Ok(answer) => {
                sink.emit(StepEvent::done(Stage::ModelVote, answer.clone()).with_model(model))?;
                votes.push((model.to_string(), answer));
            }
            Err(e) => {
                tracing::error!(model, error = %e, "consensus vote failed");
                sink.emit(StepEvent::done(Stage::ModelVote, error_text(&e)).with_model(model))?;
            }
        }
        Ok(())
    }

    fn participants(&self, requested: &[String]) -> Result<Vec<String>> {
        let pick = |list: &[String]| -> Vec<String> {
            list.iter().map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).collect()
        };
        let models = [requested, self.settings.consensus_models.as_slice(), self.fallback_models.as_slice()]
            .into_iter()
            .map(pick)
            .find(|list| !list.is_empty())
            .unwrap_or_default();
        if models.is_empty() {
            return Err(Error::InvalidConfig("consensus needs at least one participant model".into()));
        }
        Ok(models)
    }

    async fn search(&self, text: &str, embedding: Option<Embedding>) -> Result<Retrieved> {
        let results = match embedding {
            Some(e) => self.retriever.search(&e, self.retriever.top_k()).await?,
            None => self.retriever.search_text(text).await?,
        };
        Ok(Retrieved { context: format_context(&results), sources: sources(&results) })
    }

    /// Retrieval stage. A failing backend leaves an empty context and the run continues.
    async fn retrieve(&self, sink: &EventSink, text: &str, embedding: Option<Embedding>) -> Result<Retrieved> {
        sink.running(Stage::Retrieval, "Searching knowledge base...")?;
        match self.search(text, embedding).await {
            Ok(r) => {
                tracing::debug!(chunks = r.sources.len(), "retrieved context");
                sink.emit(StepEvent::done(Stage::Retrieval, r.context.clone()).with_sources(r.sources.clone()))?;
                Ok(r)
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed");
                sink.emit(
                    StepEvent::done(Stage::Retrieval, "")
                        .with_message(format!("Retrieval failed: {e}"))
                        .with_sources(Vec::new()),
                )?;
                Ok(Retrieved { context: String::new(), sources: Vec::new() })
            }
        }
    }

    async fn generate_stage(
        &self,
        sink: &EventSink,
        stage: Stage,
        message: &str,
        request: GenerateRequest,
        stream: bool,
    ) -> Result<String> {
        sink.running(stage, message)?;
        let text = if stream {
            self.stream_into(sink, stage, &request).await?
        } else {
            match self.inference.generate(&request).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(stage = %stage, model = %request.model, error = %e, "inference failed");
                    error_text(&e)
                }
            }
        };
        sink.done(stage, text.clone())?;
        Ok(text)
    }

    /// Emits the accumulated text after every delta, so each streaming event
    /// extends the previous one.
    async fn stream_into(&self, sink: &EventSink, stage: Stage, request: &GenerateRequest) -> Result<String> {
        let mut deltas = match self.inference.generate_stream(request).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(stage = %stage, model = %request.model, error = %e, "inference stream failed to start");
                return Ok(error_text(&e));
            }
        };
        let mut acc = String::new();
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(piece) if piece.is_empty() => {}
                Ok(piece) => {
                    acc.push_str(&piece);
                    sink.streaming(stage, acc.clone())?;
                }
                Err(e) => {
                    tracing::error!(stage = %stage, model = %request.model, error = %e, "inference stream broke");
                    if !acc.is_empty() {
                        acc.push_str("\n\n");
                    }
                    acc.push_str(&error_text(&e));
                    break;
                }
            }
        }
        Ok(acc)
    }

    fn final_output(&self, sink: &EventSink, answer: &str) -> Result<()> {
        sink.running(Stage::FinalOutput, "Finalizing answer...")?;
        sink.done(Stage::FinalOutput, answer)
    }

    fn request(&self, model: &str, prompt: impl Into<String>, temperature: f32) -> GenerateRequest {
        GenerateRequest::new(model, prompt).options(GenerateOptions {
            num_ctx: Some(self.num_ctx),
            ..GenerateOptions::with_temperature(temperature)
        })
    }
}

/// The critique passes when it mentions PASS (any case) and is shorter than 50 characters.
pub fn critique_passes(critique: &str) -> bool {
    let trimmed = critique.trim();
    trimmed.to_uppercase().contains("PASS") && trimmed.chars().count() < 50
}

/// Cache entries are partitioned per model, and per pipeline for the
/// multi-stage pipelines whose answers differ from a plain generation.
pub fn cache_partition(route: &Route) -> String {
    match route.pipeline {
        Pipeline::Simple => route.model.clone(),
        other => format!("{}::{}", route.model, other),
    }
}

fn error_text(e: &anyhow::Error) -> String {
    format!("{ERROR_PREFIX}{e:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critique_rule() {
        assert!(critique_passes("PASS"));
        assert!(critique_passes("  pass.  "));
        assert!(critique_passes("Verdict: Pass"));
        assert!(!critique_passes("The answer misstates the date."));
        assert!(!critique_passes(&format!("PASS {}", "x".repeat(50))));
        assert!(!critique_passes(""));
    }

    #[test]
    fn pipeline_names_parse() {
        assert_eq!("deep-reasoning".parse::<Pipeline>().ok(), Some(Pipeline::DeepReasoning));
        assert_eq!("Swarm".parse::<Pipeline>().ok(), Some(Pipeline::Swarm));
        assert!("unknown".parse::<Pipeline>().is_err());
    }

    #[test]
    fn partitions_keep_pipelines_apart() {
        let simple = Route { pipeline: Pipeline::Simple, model: "m".into() };
        let swarm = Route { pipeline: Pipeline::Swarm, model: "m".into() };
        assert_eq!(cache_partition(&simple), "m");
        assert_eq!(cache_partition(&swarm), "m::swarm");
    }
}
