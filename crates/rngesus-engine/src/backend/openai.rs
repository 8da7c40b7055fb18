use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BackendConfig, GenerationBackend, PartialStream};
use crate::error::BackendError;
use crate::program::{render, Program, Sampling, Step};
use crate::request::GenerationRequest;
use crate::schema::PartialOutput;

/// Runs programs against an OpenAI-compatible `/chat/completions` endpoint,
/// one streamed completion per open generation slot.
#[derive(Clone)]
pub struct ChatCompletionBackend {
    client: Client,
    config: Arc<BackendConfig>,
}

impl ChatCompletionBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

impl GenerationBackend for ChatCompletionBackend {
    fn generate(&self, program: Program, request: GenerationRequest) -> PartialStream {
        run_program(self.client.clone(), self.config.clone(), program, request).boxed()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl WireMessage {
    fn new(role: &'static str, content: String) -> Self {
        Self { role, content }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Program execution
// ---------------------------------------------------------------------------

fn run_program(
    client: Client,
    config: Arc<BackendConfig>,
    program: Program,
    request: GenerationRequest,
) -> impl Stream<Item = Result<PartialOutput, BackendError>> {
    try_stream! {
        let mut snapshot = PartialOutput::new();
        let mut messages: Vec<WireMessage> = Vec::new();

        for step in program.into_steps() {
            match step {
                Step::System(text) => {
                    let content = fill(&text, &snapshot, &request);
                    messages.push(WireMessage::new("system", content));
                }
                Step::User(text) => {
                    let content = fill(&text, &snapshot, &request);
                    messages.push(WireMessage::new("user", content));
                }
                Step::Assistant(text) => messages.push(WireMessage::new("assistant", text)),
                Step::Generate { field, sampling } => {
                    if let Some(forced) = request.forced_value(field) {
                        let text = forced.to_string();
                        snapshot.insert(field.to_string(), text.clone());
                        messages.push(WireMessage::new("assistant", text));
                        yield snapshot.clone();
                        continue;
                    }

                    ensure_api_key(&config)?;
                    debug!(field, model = %config.model, "Requesting completion");
                    let response = send_completion(&client, &config, &messages, sampling).await?;

                    let mut body = response.bytes_stream();
                    let mut lines = SseLineBuffer::default();
                    let mut text = String::new();
                    let mut finished = false;

                    while let Some(chunk) = body.next().await {
                        let chunk = chunk?;
                        for line in lines.push(&chunk) {
                            match parse_event(&line)? {
                                SseEvent::Delta(delta) => {
                                    text.push_str(&delta);
                                    snapshot.insert(field.to_string(), text.clone());
                                    yield snapshot.clone();
                                }
                                SseEvent::Done => finished = true,
                                SseEvent::Skip => {}
                            }
                            if finished {
                                break;
                            }
                        }
                        if finished {
                            break;
                        }
                    }

                    if !finished {
                        if let Some(line) = lines.finish() {
                            if let SseEvent::Delta(delta) = parse_event(&line)? {
                                text.push_str(&delta);
                                snapshot.insert(field.to_string(), text.clone());
                                yield snapshot.clone();
                            }
                        }
                    }

                    debug!(field, chars = text.len(), "Completion finished");
                    messages.push(WireMessage::new("assistant", text));
                }
            }
        }
    }
}

/// Render a template against fields produced in this run first, then the
/// request's context and forced values.
fn fill(template: &str, snapshot: &PartialOutput, request: &GenerationRequest) -> String {
    render(template, |name| {
        snapshot
            .get(name)
            .map(String::as_str)
            .filter(|text| !text.is_empty())
            .or_else(|| request.value(name))
    })
}

fn ensure_api_key(config: &BackendConfig) -> Result<(), BackendError> {
    if config.api_key.trim().is_empty() {
        return Err(BackendError::MissingApiKey);
    }
    Ok(())
}

async fn send_completion(
    client: &Client,
    config: &BackendConfig,
    messages: &[WireMessage],
    sampling: Sampling,
) -> Result<reqwest::Response, BackendError> {
    let body = CompletionRequest {
        model: &config.model,
        messages,
        temperature: sampling.temperature,
        max_tokens: sampling.max_tokens,
        stream: true,
    };

    let response = client
        .post(config.completions_url())
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1);
        warn!(retry_after_secs, "Generation API rate limited");
        return Err(BackendError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(BackendError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

// ---------------------------------------------------------------------------
// Server-sent events
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

fn parse_event(line: &str) -> Result<SseEvent, BackendError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| BackendError::MalformedStream(format!("{e}: {data}")))?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();

    if content.is_empty() {
        Ok(SseEvent::Skip)
    } else {
        Ok(SseEvent::Delta(content))
    }
}

/// Reassembles lines split across network chunks.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Whatever is left after the body ended without a final newline.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\r').to_string()
}
