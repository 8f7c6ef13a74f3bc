//! OpenAI-compatible Chat Completions provider.
//!
//! Groq, OpenAI, and Ollama all speak the `/v1/chat/completions` streaming
//! dialect, so one client covers the original deployment's LLM and any
//! compatible stand-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use voxflow_core::config::ServiceConfig;

use crate::sse::parse_sse_stream;
use crate::{ChatChunk, ChatRequest, ChatStream, ChunkUsage, LlmProvider};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct OpenAiCompatProvider {
    base_url: String,
    provider_id: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn groq(api_key: Option<String>, base_url: Option<&str>) -> Self {
        Self::new("groq", api_key, base_url.unwrap_or(GROQ_BASE_URL))
    }

    pub fn openai(api_key: Option<String>, base_url: Option<&str>) -> Self {
        Self::new("openai", api_key, base_url.unwrap_or(OPENAI_BASE_URL))
    }

    /// Local Ollama needs no key.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", None, base_url.unwrap_or(OLLAMA_BASE_URL))
    }

    pub fn from_config(cfg: &ServiceConfig) -> Self {
        let key = cfg.resolve_api_key();
        let base = cfg.base_url.as_deref();
        match cfg.provider.as_deref() {
            Some("openai") => Self::openai(key, base),
            Some("ollama") => Self::ollama(base),
            _ => Self::groq(key, base),
        }
    }

    fn new(id: &str, api_key: Option<String>, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_id: id.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct CompletionsRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn format_messages(request: &ChatRequest) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(ref system) = request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for m in &request.messages {
        messages.push(json!({ "role": m.role, "content": m.content }));
    }
    messages
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn stream(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        let body = CompletionsRequest {
            model: request.model.clone(),
            messages: format_messages(request),
            max_tokens: request.max_tokens,
            stream: true,
            temperature: request.temperature,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        debug!(model = %body.model, base_url = %self.base_url, "Streaming chat completion");

        let mut req_builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");

        if let Some(ref key) = self.api_key {
            req_builder = req_builder.header("authorization", format!("Bearer {key}"));
        } else if self.provider_id != "ollama" {
            anyhow::bail!("No API key configured for LLM provider '{}'", self.provider_id);
        }

        let response = req_builder.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {status}: {body}");
        }

        let sse = parse_sse_stream(response);

        let chunk_stream = futures::stream::unfold(Box::pin(sse), |mut sse| async move {
            loop {
                match sse.next().await {
                    Some(Ok(event)) => {
                        let data = event.data.trim();
                        if data == "[DONE]" {
                            return None;
                        }

                        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
                            Ok(c) => c,
                            Err(e) => {
                                trace!(%e, data, "Failed to parse completion chunk");
                                continue;
                            }
                        };

                        // Usage arrives in a choice-less trailer chunk
                        if let Some(usage) = chunk.usage {
                            let c = ChatChunk {
                                usage: Some(ChunkUsage {
                                    input_tokens: Some(usage.prompt_tokens),
                                    output_tokens: Some(usage.completion_tokens),
                                }),
                                ..ChatChunk::default()
                            };
                            return Some((Ok(c), sse));
                        }

                        let Some(choice) = chunk.choices.first() else {
                            continue;
                        };

                        if let Some(ref content) = choice.delta.content {
                            if !content.is_empty() {
                                let c = ChatChunk {
                                    delta: Some(content.clone()),
                                    ..ChatChunk::default()
                                };
                                return Some((Ok(c), sse));
                            }
                        }

                        if let Some(ref reason) = choice.finish_reason {
                            let c = ChatChunk {
                                stop_reason: Some(reason.clone()),
                                ..ChatChunk::default()
                            };
                            return Some((Ok(c), sse));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), sse)),
                    None => return None,
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;

    #[test]
    fn test_groq_provider_creation() {
        let provider = OpenAiCompatProvider::groq(Some("gsk-1".into()), None);
        assert_eq!(provider.id(), "groq");
        assert_eq!(provider.base_url(), GROQ_BASE_URL);
    }

    #[test]
    fn test_custom_base_url_trimmed() {
        let provider = OpenAiCompatProvider::openai(None, Some("https://proxy.example.com/"));
        assert_eq!(provider.base_url(), "https://proxy.example.com");
    }

    #[test]
    fn test_from_config_provider_selection() {
        let groq = ServiceConfig {
            provider: Some("groq".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(OpenAiCompatProvider::from_config(&groq).id(), "groq");

        let ollama = ServiceConfig {
            provider: Some("ollama".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(OpenAiCompatProvider::from_config(&ollama).id(), "ollama");
    }

    #[test]
    fn test_format_messages_system_first() {
        let request = ChatRequest {
            model: "llama-3.3-70b-versatile".into(),
            system: Some("You are terse.".into()),
            messages: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            max_tokens: 256,
            temperature: None,
        };
        let messages = format_messages(&request);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["content"], "hello");
    }

    #[test]
    fn test_chunk_deserialization_text() {
        let json = r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Hey"},"finish_reason":null}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hey"));
    }

    #[test]
    fn test_chunk_deserialization_usage_trailer() {
        let json = r#"{"id":"chatcmpl-1","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 34);
    }

    #[test]
    fn test_chunk_deserialization_finish_reason() {
        let json = r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_stream_requires_key_for_hosted() {
        let provider = OpenAiCompatProvider::groq(None, None);
        let request = ChatRequest {
            model: "llama-3.3-70b-versatile".into(),
            system: None,
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 16,
            temperature: None,
        };
        let err = match provider.stream(&request).await {
            Ok(_) => panic!("expected stream() to fail without an API key"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("API key"));
    }
}
