use serde::Serialize;
use std::sync::Arc;

use localrag_core::{Error, Result};
use localrag_engine::{Orchestrator, Pipeline, PipelineOutcome, QueryRequest};

use crate::ledger::{LeaderboardEntry, Outcome, RatingLedger};

/// Two answers to one question, awaiting a verdict.
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub query: String,
    pub model_a: String,
    pub model_b: String,
    pub answer_a: PipelineOutcome,
    pub answer_b: PipelineOutcome,
}

pub struct Arena {
    orchestrator: Orchestrator,
    ledger: Arc<RatingLedger>,
    pipeline: Pipeline,
}

impl Arena {
    pub fn new(orchestrator: Orchestrator, ledger: Arc<RatingLedger>) -> Self {
        Self { orchestrator, ledger, pipeline: Pipeline::Simple }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn ledger(&self) -> &RatingLedger {
        &self.ledger
    }

    /// Answer `query` with both models, one after the other. The cache is
    /// bypassed so each side is a fresh generation.
    pub async fn compare(&self, query: &str, model_a: &str, model_b: &str) -> Result<Round> {
        let (model_a, model_b) = (model_a.trim(), model_b.trim());
        if model_a.is_empty() || model_b.is_empty() {
            return Err(Error::InvalidConfig("both models must be named".into()));
        }
        if model_a == model_b {
            return Err(Error::InvalidConfig(format!("'{model_a}' cannot be compared with itself")));
        }
        tracing::info!(model_a, model_b, "comparison round started");

        let (answer_a, _) = self.orchestrator.run(self.request(query, model_a)).await?;
        let (answer_b, _) = self.orchestrator.run(self.request(query, model_b)).await?;
        Ok(Round {
            query: query.to_string(),
            model_a: model_a.to_string(),
            model_b: model_b.to_string(),
            answer_a,
            answer_b,
        })
    }

    pub fn vote(&self, round: &Round, outcome: Outcome) -> Result<Vec<LeaderboardEntry>> {
        self.ledger.record_match(&round.model_a, &round.model_b, outcome)
    }

    pub fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        self.ledger.leaderboard()
    }

    fn request(&self, query: &str, model: &str) -> QueryRequest {
        QueryRequest::new(query).model(model).pipeline(self.pipeline).no_cache()
    }
}
