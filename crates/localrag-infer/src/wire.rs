//! Request and response bodies for `/api/chat` and `/api/tags`, plus the
//! newline-delimited JSON decoder used for streamed replies.
use serde::{Deserialize, Serialize};

use localrag_core::types::{GenerateOptions, GenerateRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: &'a GenerateOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<&'a str>,
}

impl<'a> ChatRequest<'a> {
    /// System message first when present, then the user prompt.
    pub fn from_request(req: &'a GenerateRequest, stream: bool, keep_alive: Option<&'a str>) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = req.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage { role: "system".into(), content: system.to_string() });
        }
        messages.push(ChatMessage { role: "user".into(), content: req.prompt.clone() });
        Self { model: &req.model, messages, stream, options: &req.options, keep_alive }
    }
}

/// One reply object; a stream sends many, a single-shot call sends one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn content(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

/// Reassembles NDJSON lines across arbitrary byte-chunk boundaries.
///
/// Bytes are buffered until a `\n` arrives, so a UTF-8 sequence split between
/// two network chunks is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete, non-blank line it finished.
    pub fn push(&mut self, bytes: &[u8]) -> serde_json::Result<Vec<ChatResponse>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(resp) = parse_line(&line)? {
                out.push(resp);
            }
        }
        Ok(out)
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> serde_json::Result<Option<ChatResponse>> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> serde_json::Result<Option<ChatResponse>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(line).map(Some)
}
