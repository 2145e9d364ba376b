//! `localrag`: ingest notes, ask questions through a reasoning pipeline, and
//! rate models head to head.
//!
//! Progress and pipeline steps go to stderr; answers go to stdout.
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use localrag_arena::{Arena, LeaderboardEntry, Outcome, RatingLedger};
use localrag_core::config::{expand_path, Config, Settings};
use localrag_core::traits::{Embedder, InferenceClient, VectorStore};
use localrag_core::types::{StepEvent, StepStatus};
use localrag_embed::get_default_embedder;
use localrag_engine::{Ingestor, Orchestrator, Pipeline, PipelineOutcome, QueryRequest, Retriever, SemanticCache};
use localrag_infer::OllamaClient;
use localrag_vector::open_stores;

#[derive(Parser, Debug)]
#[command(name = "localrag", version, about = "Offline retrieval-augmented answers over local notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index a .txt/.md file or a directory of them
    Ingest { path: PathBuf },
    /// Answer a question
    Ask {
        query: String,
        #[arg(short, long)]
        model: Option<String>,
        /// simple, swarm, poetiq, deep_reasoning or consensus
        #[arg(short, long, default_value = "simple")]
        pipeline: Pipeline,
        /// Consensus participants (repeatable)
        #[arg(long = "participant")]
        participants: Vec<String>,
        #[arg(long)]
        no_cache: bool,
        /// Print the outcome as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Answer with two models side by side, then ask for a verdict
    Compare { query: String, model_a: String, model_b: String },
    /// Record a verdict without running a comparison
    Vote { model_a: String, model_b: String, outcome: Outcome },
    Leaderboard,
    /// List models served by the inference backend
    Models,
    /// Clear the knowledge base and the answer cache
    Reset,
}

struct App {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    documents: Arc<dyn VectorStore>,
    cache_store: Arc<dyn VectorStore>,
    inference: Arc<OllamaClient>,
}

impl App {
    async fn build(settings: Settings) -> Result<Self> {
        let embedder = get_default_embedder(&settings.embedding)?;
        let mut data = settings.data.clone();
        data.vector_db_dir = expand_path(&data.vector_db_dir).to_string_lossy().into_owned();
        let (documents, cache_store) = open_stores(&data, embedder.dim()).await?;
        let inference = Arc::new(OllamaClient::new(&settings.inference)?);
        Ok(Self { settings, embedder, documents: Arc::new(documents), cache_store: Arc::new(cache_store), inference })
    }

    fn orchestrator(&self) -> Orchestrator {
        let top_k = self.settings.retrieval.top_k;
        let retriever = Arc::new(Retriever::new(self.embedder.clone(), self.documents.clone(), top_k));
        let orchestrator = Orchestrator::new(
            retriever,
            self.inference.clone(),
            self.settings.orchestrator.clone(),
            &self.settings.inference,
        );
        if self.settings.cache.enabled {
            let threshold = self.settings.cache.threshold;
            let cache = SemanticCache::new(self.embedder.clone(), self.cache_store.clone(), threshold);
            orchestrator.with_cache(Arc::new(cache))
        } else {
            orchestrator
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Open the ratings file synchronised against whatever the backend serves now.
async fn ledger(settings: &Settings, inference: &dyn InferenceClient) -> Result<Arc<RatingLedger>> {
    let roster = inference.list_models().await;
    let path = expand_path(&settings.data.ratings_path);
    Ok(Arc::new(RatingLedger::load_with_roster(path, &roster)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "command parsed");
    let settings = Config::load()?.settings().context("invalid configuration")?;

    match cli.command {
        Command::Ingest { path } => {
            let app = App::build(settings).await?;
            let ingestor = Ingestor::new(app.embedder.clone(), app.documents.clone(), &app.settings.chunking)?
                .with_progress(true);
            let files = ingestor.ingest_path(&path).await?;
            let chunks: usize = files.iter().map(|(_, n)| n).sum();
            for (file, n) in &files {
                eprintln!("  {n:>5}  {}", file.display());
            }
            println!("Ingested {chunks} chunks from {} file(s)", files.len());
        }
        Command::Ask { query, model, pipeline, participants, no_cache, json } => {
            let app = App::build(settings).await?;
            let mut request = QueryRequest::new(query).pipeline(pipeline).participants(participants);
            if let Some(model) = model {
                request = request.model(model);
            }
            if no_cache {
                request = request.no_cache();
            }
            let outcome = ask(&app.orchestrator(), request, !json).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.answer);
            }
        }
        Command::Compare { query, model_a, model_b } => {
            let app = App::build(settings).await?;
            let arena = Arena::new(app.orchestrator(), ledger(&app.settings, app.inference.as_ref()).await?);
            let round = arena.compare(&query, &model_a, &model_b).await?;
            println!("=== A: {} ===\n{}\n", round.model_a, round.answer_a.answer);
            println!("=== B: {} ===\n{}\n", round.model_b, round.answer_b.answer);
            let outcome = prompt_verdict()?;
            print_leaderboard(&arena.vote(&round, outcome)?);
        }
        Command::Vote { model_a, model_b, outcome } => {
            let inference = OllamaClient::new(&settings.inference)?;
            let ledger = ledger(&settings, &inference).await?;
            print_leaderboard(&ledger.record_match(model_a.trim(), model_b.trim(), outcome)?);
        }
        Command::Leaderboard => {
            let inference = OllamaClient::new(&settings.inference)?;
            print_leaderboard(&ledger(&settings, &inference).await?.leaderboard()?);
        }
        Command::Models => {
            let inference = OllamaClient::new(&settings.inference)?;
            for model in inference.list_models().await {
                println!("{model}");
            }
        }
        Command::Reset => {
            let app = App::build(settings).await?;
            app.documents.reset().await?;
            app.cache_store.reset().await?;
            println!("Knowledge base and answer cache cleared");
        }
    }
    Ok(())
}

/// Drive one run, echoing steps (and streamed answer text) to stderr.
async fn ask(orchestrator: &Orchestrator, request: QueryRequest, echo: bool) -> Result<PipelineOutcome> {
    let (mut rx, handle) = orchestrator.stream(request);
    let mut printed: HashMap<(String, Option<String>), usize> = HashMap::new();
    while let Some(event) = rx.recv().await {
        if echo {
            echo_event(&event, &mut printed)?;
        }
    }
    Ok(handle.await??)
}

fn echo_event(event: &StepEvent, printed: &mut HashMap<(String, Option<String>), usize>) -> Result<()> {
    let mut err = std::io::stderr().lock();
    let label = match &event.model {
        Some(model) => format!("{} [{model}]", event.stage),
        None => event.stage.to_string(),
    };
    match event.status {
        StepStatus::Running => writeln!(err, "> {label}: {}", event.message.as_deref().unwrap_or(""))?,
        StepStatus::Streaming => {
            let content = event.content.as_deref().unwrap_or("");
            let seen = printed.entry((event.stage.to_string(), event.model.clone())).or_insert(0);
            if let Some(delta) = content.get(*seen..) {
                write!(err, "{delta}")?;
                err.flush()?;
            }
            *seen = content.len();
        }
        StepStatus::Done => {
            let key = (event.stage.to_string(), event.model.clone());
            if printed.remove(&key).is_some() {
                writeln!(err)?;
            }
            match &event.message {
                Some(message) => writeln!(err, "  {label} done: {message}")?,
                None => writeln!(err, "  {label} done")?,
            }
        }
    }
    Ok(())
}

fn prompt_verdict() -> Result<Outcome> {
    let stdin = std::io::stdin();
    loop {
        eprint!("Which answer is better? [A/B/tie]: ");
        std::io::stderr().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("no verdict given");
        }
        match line.parse::<Outcome>() {
            Ok(outcome) => return Ok(outcome),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("No rated models yet");
        return;
    }
    for entry in entries {
        println!("{:>3}. {:<32} {:>7.1}", entry.rank, entry.model, entry.elo);
    }
}
