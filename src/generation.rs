//! Text-generation providers.
//!
//! Concrete implementations of [`pdfqa_core::generate::TextGenerator`]:
//! - **[`DisabledGenerator`]**: fails every call.
//! - **[`OpenAIGenerator`]**: `POST {url}/v1/chat/completions` with
//!   `stream: true`, decoded from server-sent events.
//! - **[`OllamaGenerator`]**: `POST {url}/api/chat` with `stream: true`,
//!   decoded from newline-delimited JSON.
//!
//! Chat APIs know only `system`, `user` and `assistant` roles, so evidence
//! messages are sent as user messages prefixed with `Relevant information:`.
//!
//! Streams are not retried: a transport error mid-answer ends the stream
//! with [`Error::Generation`].

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use pdfqa_core::generate::{FragmentStream, TextGenerator};
use pdfqa_core::prompt::{PromptMessage, Role};
use pdfqa_core::{Error, Result};
use serde_json::Value;
use tracing::debug;

use crate::config::GenerationConfig;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";
const EVIDENCE_PREFIX: &str = "Relevant information:";

// ============ Disabled Provider ============

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _messages: &[PromptMessage]) -> Result<FragmentStream> {
        Err(Error::Generation(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Streaming chat completions against the OpenAI API (or any compatible
/// endpoint set via `generation.url`). Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "messages": chat_messages(messages),
        });
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("OpenAI connection error: {}", e)))?;
        let response = check_status(response, "OpenAI").await?;
        debug!(model = %self.model, "streaming completion");
        Ok(sse_fragments(byte_lines(response.bytes_stream().boxed())))
    }
}

// ============ Ollama Provider ============

/// Streaming chat against a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    temperature: f32,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": true,
            "options": { "temperature": self.temperature },
            "messages": chat_messages(messages),
        });
        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Generation(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;
        let response = check_status(response, "Ollama").await?;
        Ok(ndjson_fragments(byte_lines(response.bytes_stream().boxed())))
    }
}

// ============ Wire formats ============

/// Map role-tagged prompt messages onto chat API messages.
pub fn chat_messages(messages: &[PromptMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => serde_json::json!({ "role": "system", "content": m.content }),
            Role::User => serde_json::json!({ "role": "user", "content": m.content }),
            Role::Evidence => serde_json::json!({
                "role": "user",
                "content": format!("{}\n{}", EVIDENCE_PREFIX, m.content),
            }),
        })
        .collect()
}

/// Answers stream for as long as the model keeps talking, so the timeout
/// bounds connecting and each gap between body reads, not the whole request.
fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    let timeout = Duration::from_secs(timeout_secs);
    Ok(reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?)
}

async fn check_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body_text = response.text().await.unwrap_or_default();
    Err(Error::Generation(format!(
        "{} API error {}: {}",
        provider, status, body_text
    )))
}

struct LineState<B, E> {
    inner: BoxStream<'static, std::result::Result<B, E>>,
    buf: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

/// Split a byte stream into lines (without the trailing `\n` / `\r\n`).
/// Multi-byte characters split across chunks are reassembled.
fn byte_lines<B, E>(
    inner: BoxStream<'static, std::result::Result<B, E>>,
) -> BoxStream<'static, Result<String>>
where
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = LineState {
        inner,
        buf: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = st.buf.drain(..=pos).collect();
                        st.pending.push_back(decode_line(&line));
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((
                        Err(Error::Generation(format!("stream interrupted: {}", e))),
                        st,
                    ));
                }
                None => {
                    st.done = true;
                    if !st.buf.is_empty() {
                        let rest = std::mem::take(&mut st.buf);
                        st.pending.push_back(decode_line(&rest));
                    }
                }
            }
        }
    })
    .boxed()
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

enum StreamEvent {
    Fragment(String),
    Skip,
    Done,
    Failed(Error),
}

fn finish(events: BoxStream<'static, StreamEvent>) -> FragmentStream {
    events
        .take_while(|event| ready(!matches!(event, StreamEvent::Done)))
        .filter_map(|event| {
            ready(match event {
                StreamEvent::Fragment(text) => Some(Ok(text)),
                StreamEvent::Failed(e) => Some(Err(e)),
                StreamEvent::Skip | StreamEvent::Done => None,
            })
        })
        .boxed()
}

/// Decode OpenAI server-sent events into answer fragments.
fn sse_fragments(lines: BoxStream<'static, Result<String>>) -> FragmentStream {
    finish(lines.map(|line| match line {
        Ok(line) => parse_sse_line(&line),
        Err(e) => StreamEvent::Failed(e),
    }).boxed())
}

fn parse_sse_line(line: &str) -> StreamEvent {
    let Some(payload) = line.strip_prefix("data:") else {
        // Comments, `event:` and blank separator lines.
        return StreamEvent::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return StreamEvent::Done;
    }
    let json: Value = match serde_json::from_str(payload) {
        Ok(json) => json,
        Err(e) => return StreamEvent::Failed(Error::Generation(format!("bad SSE payload: {}", e))),
    };
    if let Some(err) = json.get("error") {
        return StreamEvent::Failed(Error::Generation(format!("OpenAI stream error: {}", err)));
    }
    match json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        Some(text) if !text.is_empty() => StreamEvent::Fragment(text.to_string()),
        _ => StreamEvent::Skip,
    }
}

/// Decode Ollama's newline-delimited JSON chat stream.
fn ndjson_fragments(lines: BoxStream<'static, Result<String>>) -> FragmentStream {
    finish(lines.map(|line| match line {
        Ok(line) => parse_ndjson_line(&line),
        Err(e) => StreamEvent::Failed(e),
    }).boxed())
}

fn parse_ndjson_line(line: &str) -> StreamEvent {
    if line.trim().is_empty() {
        return StreamEvent::Skip;
    }
    let json: Value = match serde_json::from_str(line) {
        Ok(json) => json,
        Err(e) => return StreamEvent::Failed(Error::Generation(format!("bad NDJSON line: {}", e))),
    };
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return StreamEvent::Failed(Error::Generation(format!("Ollama stream error: {}", err)));
    }
    let text = json
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    let done = json.get("done").and_then(|d| d.as_bool()).unwrap_or(false);
    match (text.is_empty(), done) {
        (false, _) => StreamEvent::Fragment(text.to_string()),
        (true, true) => StreamEvent::Done,
        (true, false) => StreamEvent::Skip,
    }
}

/// Create the [`TextGenerator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfqa_core::generate::collect_fragments;
    use std::convert::Infallible;

    fn chunks(parts: &[&str]) -> BoxStream<'static, std::result::Result<Vec<u8>, Infallible>> {
        let owned: Vec<std::result::Result<Vec<u8>, Infallible>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn lines_are_reassembled_across_chunks() {
        let lines: Vec<String> = byte_lines(chunks(&["hel", "lo\r\nwor", "ld\n", "tail"]))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["hello", "world", "tail"]);
    }

    #[tokio::test]
    async fn multibyte_split_is_preserved() {
        let bytes = "é\n".as_bytes();
        let parts: Vec<std::result::Result<Vec<u8>, Infallible>> =
            vec![Ok(bytes[..1].to_vec()), Ok(bytes[1..].to_vec())];
        let lines: Vec<String> = byte_lines(stream::iter(parts).boxed())
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["é"]);
    }

    #[tokio::test]
    async fn sse_stream_concatenates_deltas_until_done() {
        let body = [
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is.\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ];
        let answer = collect_fragments(sse_fragments(byte_lines(chunks(&body))))
            .await
            .unwrap();
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn sse_error_event_fails_stream() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n",
        ];
        let err = collect_fragments(sse_fragments(byte_lines(chunks(&body))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("overloaded")));
    }

    #[tokio::test]
    async fn ndjson_stream_concatenates_messages() {
        let body = [
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hello\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\", world\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        ];
        let answer = collect_fragments(ndjson_fragments(byte_lines(chunks(&body))))
            .await
            .unwrap();
        assert_eq!(answer, "Hello, world");
    }

    /// Serve one Ollama-style chat response, pausing between lines.
    async fn slow_ndjson_server(lines: &'static [&'static str], pause: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(pause).await;
                }
                socket.write_all(line.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn slow_stream_outlives_timeout() {
        let url = slow_ndjson_server(
            &[
                "{\"message\":{\"content\":\"Hello\"},\"done\":false}\n",
                "{\"message\":{\"content\":\", world\"},\"done\":false}\n",
                "{\"done\":true}\n",
            ],
            Duration::from_millis(700),
        )
        .await;
        let generator = OllamaGenerator::new(&GenerationConfig {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            url: Some(url),
            timeout_secs: 1,
            ..GenerationConfig::default()
        })
        .unwrap();

        let fragments = generator
            .generate(&[PromptMessage::user("greet me")])
            .await
            .unwrap();
        let answer = collect_fragments(fragments).await.unwrap();
        assert_eq!(answer, "Hello, world");
    }

    #[test]
    fn evidence_becomes_prefixed_user_message() {
        let msgs = chat_messages(&[
            PromptMessage::system("rules"),
            PromptMessage::evidence("[{\"text\":\"Paris\"}]"),
            PromptMessage::user("capital?"),
        ]);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["role"], "user");
        assert!(msgs[1]["content"]
            .as_str()
            .unwrap()
            .starts_with("Relevant information:\n"));
        assert_eq!(msgs[2]["content"], "capital?");
    }

    #[tokio::test]
    async fn disabled_generator_fails() {
        assert!(matches!(
            DisabledGenerator.generate(&[]).await,
            Err(Error::Generation(_))
        ));
    }

    #[test]
    fn factory_rejects_unknown() {
        let config = GenerationConfig {
            provider: "anthropic".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
