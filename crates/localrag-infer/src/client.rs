use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use localrag_core::config::InferenceSettings;
use localrag_core::traits::{InferenceClient, TextStream};
use localrag_core::types::GenerateRequest;

use crate::wire::{ChatRequest, ChatResponse, NdjsonDecoder, TagsResponse};

/// Listing models is a health probe; it must not wait out the generation timeout.
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    keep_alive: Option<String>,
    fallback_models: Vec<String>,
}

impl OllamaClient {
    pub fn new(settings: &InferenceSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            keep_alive: settings.keep_alive.clone(),
            fallback_models: settings.fallback_models.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_chat(&self, request: &GenerateRequest, stream: bool) -> Result<reqwest::Response> {
        let body = ChatRequest::from_request(request, stream, self.keep_alive.as_deref());
        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url} (model {})", request.model))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ChatResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(text);
            bail!("ollama returned {status} for model {}: {detail}", request.model);
        }
        Ok(resp)
    }

    async fn fetch_tags(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.http.get(&url).timeout(LIST_TIMEOUT).send().await?;
        if !resp.status().is_success() {
            bail!("GET {url} returned {}", resp.status());
        }
        let tags: TagsResponse = resp.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let resp = self.post_chat(request, false).await?;
        let reply: ChatResponse = resp.json().await.context("decoding chat reply")?;
        if let Some(err) = reply.error {
            bail!("ollama error for model {}: {err}", request.model);
        }
        Ok(reply.content().to_string())
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let resp = self.post_chat(request, true).await?;
        let model = request.model.clone();
        let (tx, rx) = mpsc::channel::<Result<String>>(64);

        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            let mut decoder = NdjsonDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let lines = match chunk.map_err(anyhow::Error::from).and_then(|b| Ok(decoder.push(&b)?)) {
                    Ok(lines) => lines,
                    Err(e) => {
                        let _ = tx.send(Err(e.context(format!("reading stream from {model}")))).await;
                        return;
                    }
                };
                for line in lines {
                    if !forward(&tx, line).await {
                        return;
                    }
                }
            }
            match decoder.finish() {
                Ok(Some(line)) => {
                    forward(&tx, line).await;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(anyhow!(e).context("trailing stream line"))).await;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_tags().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = ?self.fallback_models,
                    "model listing failed; using fallback roster"
                );
                self.fallback_models.clone()
            }
        }
    }
}

/// Send one decoded line downstream. Returns false once the stream is over,
/// either because the receiver went away or the backend signalled an end.
async fn forward(tx: &mpsc::Sender<Result<String>>, line: ChatResponse) -> bool {
    if let Some(err) = line.error {
        let _ = tx.send(Err(anyhow!("ollama stream error: {err}"))).await;
        return false;
    }
    let content = line.content();
    if !content.is_empty() && tx.send(Ok(content.to_string())).await.is_err() {
        return false;
    }
    !line.done
}
