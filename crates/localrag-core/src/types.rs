//! Domain types shared by the splitter, the ports and the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;
/// Equality constraints on metadata keys, all of which must match.
pub type MetadataFilter = HashMap<String, String>;
pub type Embedding = Vec<f32>;

/// Metadata key naming the document a chunk came from.
pub const SOURCE_KEY: &str = "source";
/// Metadata key partitioning semantic-cache entries by model.
pub const MODEL_NAME_KEY: &str = "model_name";

/// A bounded fragment of a source document, produced once by the splitter.
///
/// - `text`: trimmed, non-empty payload
/// - `source_id`: name of the document the chunk came from
/// - `index`: position within the document's chunk sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    pub index: usize,
}

impl Chunk {
    pub fn metadata(&self) -> Meta {
        Meta::from([
            (SOURCE_KEY.to_string(), self.source_id.clone()),
            ("chunk_index".to_string(), self.index.to_string()),
        ])
    }
}

/// A row handed to the vector store. `id` is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: ChunkId,
    pub vector: Embedding,
    pub document: String,
    pub metadata: Meta,
}

/// A row returned by a vector query. `distance` is cosine distance, lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub document: String,
    pub metadata: Meta,
    pub distance: f32,
}

/// A retrieved chunk as seen by the orchestrator; lives for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    pub metadata: Meta,
    pub distance: f32,
}

impl From<VectorMatch> for RetrievalResult {
    fn from(m: VectorMatch) -> Self {
        Self { text: m.document, metadata: m.metadata, distance: m.distance }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

impl GenerateOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self { temperature: Some(temperature), ..Self::default() }
    }
}

/// One call to the inference port.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { model: model.into(), prompt: prompt.into(), system: None, options: GenerateOptions::default() }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Named unit of work inside a reasoning pipeline. Serialized as the `step` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    Decomposition,
    Retrieval,
    Generation,
    Provocateur,
    Critic,
    Synthesizer,
    Hypothesis,
    Critique,
    Refinement,
    ConsensusInit,
    ModelVote,
    Aggregator,
    FinalOutput,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Cache => "cache",
            Stage::Decomposition => "decomposition",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Provocateur => "provocateur",
            Stage::Critic => "critic",
            Stage::Synthesizer => "synthesizer",
            Stage::Hypothesis => "hypothesis",
            Stage::Critique => "critique",
            Stage::Refinement => "refinement",
            Stage::ConsensusInit => "consensus_init",
            Stage::ModelVote => "model_vote",
            Stage::Aggregator => "aggregator",
            Stage::FinalOutput => "final_output",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Streaming,
    Done,
}

/// The wire contract between a pipeline run and any UI.
///
/// Per stage (and per `model` for votes) a run emits one `running`, any number
/// of `streaming` events whose content only grows, then one `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(rename = "step")]
    pub stage: Stage,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Meta>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl StepEvent {
    pub fn running(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            status: StepStatus::Running,
            content: None,
            message: Some(message.into()),
            sources: None,
            model: None,
        }
    }

    pub fn streaming(stage: Stage, content: impl Into<String>) -> Self {
        Self {
            stage,
            status: StepStatus::Streaming,
            content: Some(content.into()),
            message: None,
            sources: None,
            model: None,
        }
    }

    pub fn done(stage: Stage, content: impl Into<String>) -> Self {
        Self {
            stage,
            status: StepStatus::Done,
            content: Some(content.into()),
            message: None,
            sources: None,
            model: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Meta>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_event_uses_step_field_and_omits_empty_fields() {
        let ev = StepEvent::done(Stage::FinalOutput, "answer");
        let json = serde_json::to_value(&ev).expect("serialize");
        assert_eq!(json["step"], "final_output");
        assert_eq!(json["status"], "done");
        assert_eq!(json["content"], "answer");
        assert!(json.get("sources").is_none());
        assert!(json.get("model").is_none());
    }

    #[test]
    fn consensus_init_keeps_its_wire_name() {
        let json = serde_json::to_string(&Stage::ConsensusInit).expect("serialize");
        assert_eq!(json, "\"consensus_init\"");
        assert_eq!(Stage::ModelVote.as_str(), "model_vote");
    }
}
