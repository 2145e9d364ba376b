//! Query-time engine: semantic cache, retrieval, ingestion and the staged
//! reasoning pipelines, all wired against the ports in `localrag-core`.

pub mod cache;
pub mod events;
pub mod ingest;
pub mod orchestrator;
pub mod prompts;
pub mod retriever;

pub use cache::{CacheLookup, CachedAnswer, SemanticCache};
pub use events::EventSink;
pub use ingest::Ingestor;
pub use orchestrator::{critique_passes, Orchestrator, Pipeline, PipelineOutcome, QueryRequest, Route, ERROR_PREFIX};
pub use retriever::Retriever;
