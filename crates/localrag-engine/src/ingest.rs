//! Split, embed and upsert documents into the knowledge base.
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

use localrag_core::config::ChunkingSettings;
use localrag_core::splitter::TextSplitter;
use localrag_core::traits::{Embedder, VectorStore};
use localrag_core::types::{Chunk, VectorRecord};
use localrag_core::{Error, Result};

const EMBED_BATCH: usize = 32;
const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    show_progress: bool,
}

impl Ingestor {
    /// Rejects an overlap that is not smaller than the chunk size.
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, chunking: &ChunkingSettings) -> Result<Self> {
        chunking.validate()?;
        Ok(Self {
            embedder,
            store,
            splitter: TextSplitter::new(chunking.chunk_size, chunking.chunk_overlap),
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Returns the number of chunks written. Blank text writes nothing.
    pub async fn ingest_text(&self, source_id: &str, text: &str) -> Result<usize> {
        let chunks = self.splitter.split_document(source_id, text);
        if chunks.is_empty() {
            tracing::info!(source = source_id, "no text to ingest");
            return Ok(0);
        }

        let pb = self.progress(chunks.len(), source_id);
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(Error::Operation(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            let records = batch.iter().zip(vectors).map(|(c, v)| to_record(c, v)).collect();
            self.store.upsert(records).await?;
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        tracing::info!(source = source_id, chunks = chunks.len(), "ingested document");
        Ok(chunks.len())
    }

    /// Ingest one `.txt` or `.md` file under its file name.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        if !is_supported(path) {
            return Err(Error::Unsupported(format!("{} (expected .txt or .md)", path.display())));
        }
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Operation(format!("reading {}: {e}", path.display())),
        })?;
        let text = String::from_utf8(bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "file is not valid UTF-8; decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        });
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest_text(&source, &text).await
    }

    /// Recursively ingest every supported file, in path order.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Vec<(PathBuf, usize)>> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("directory {}", dir.display())));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        let mut counts = Vec::with_capacity(files.len());
        for path in files {
            let n = self.ingest_file(&path).await?;
            counts.push((path, n));
        }
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        tracing::info!(dir = %dir.display(), files = counts.len(), chunks = total, "directory ingested");
        Ok(counts)
    }

    /// Ingest a file or a directory tree.
    pub async fn ingest_path(&self, path: &Path) -> Result<Vec<(PathBuf, usize)>> {
        if path.is_dir() {
            self.ingest_directory(path).await
        } else {
            Ok(vec![(path.to_path_buf(), self.ingest_file(path).await?)])
        }
    }

    fn progress(&self, len: usize, source: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}",
        )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message(source.to_string());
        pb
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}

/// `{source}_chunk_{index}_{8 hex}`; the random suffix keeps re-ingestion from colliding.
fn chunk_id(chunk: &Chunk) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_chunk_{}_{}", chunk.source_id, chunk.index, &suffix[..8])
}

fn to_record(chunk: &Chunk, vector: Vec<f32>) -> VectorRecord {
    VectorRecord { id: chunk_id(chunk), vector, document: chunk.text.clone(), metadata: chunk.metadata() }
}
