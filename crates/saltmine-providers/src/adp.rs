//! Tencent ADP (agent development platform) streaming chat client.
//!
//! The upstream answers with an SSE stream whose `data:` lines carry JSON
//! events tagged by `type`. Reply content is cumulative: every `reply` event
//! holds the full text generated so far, and the last one is flagged
//! `is_final`.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ProviderError;

pub const DEFAULT_API_URL: &str = "https://wss.lke.cloud.tencent.com/v1/qbot/chat/sse";

pub const CODE_INVALID_SESSION: i64 = 460006;
pub const CODE_EMPTY_CONTENT: i64 = 460007;
/// Used for local failures that never reached the upstream.
pub const CODE_LOCAL: i64 = -1;

#[derive(Debug, Clone)]
pub struct AdpConfig {
    pub api_url: String,
    pub app_key: Option<String>,
    /// Applies until response headers arrive; the body may stream longer.
    pub timeout: Duration,
}

impl Default for AdpConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub visitor_biz_id: String,
    pub content: String,
    pub request_id: Option<String>,
}

impl ChatRequest {
    /// A request on a brand new session.
    pub fn new(visitor_biz_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            visitor_biz_id: visitor_biz_id.into(),
            content: content.into(),
            request_id: None,
        }
    }
}

// -- Events --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Reply {
        payload: ReplyPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    TokenStat {
        payload: TokenStatPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Reference {
        payload: ReferencePayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Error {
        error: ChatError,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

impl ChatEvent {
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self::Error {
            error: ChatError {
                code,
                message: message.into(),
            },
            message_id: None,
        }
    }

    /// SSE event name used when relaying this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reply { .. } => "reply",
            Self::TokenStat { .. } => "token_stat",
            Self::Reference { .. } => "reference",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub record_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub is_final: bool,
    /// Set by the upstream's content filter.
    #[serde(default)]
    pub is_evil: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_process: Option<String>,
    #[serde(default)]
    pub response_type: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStatPayload {
    #[serde(default)]
    pub elapsed: u64,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferencePayload {
    #[serde(default)]
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// 1 = web search, 2 = knowledge base document.
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatError {
    pub code: i64,
    pub message: String,
}

/// Readable text for the error codes the upstream documents.
pub fn describe_error_code(code: i64) -> Option<&'static str> {
    match code {
        460004 => Some("Application not found, check the app key"),
        460005 => Some("Invalid app key"),
        CODE_INVALID_SESSION => Some("Invalid session id"),
        CODE_EMPTY_CONTENT => Some("Message content must not be empty"),
        460008 => Some("Too many requests, please try again later"),
        460009 => Some("Service temporarily unavailable"),
        460010 => Some("Quota exhausted"),
        _ => None,
    }
}

// -- Provider --

pub trait ChatProvider: Send + Sync {
    /// Streams the upstream's events. Failures arrive as a final
    /// `ChatEvent::Error` instead of an `Err`.
    fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, ChatEvent>;
}

/// Drains a chat stream and returns the full answer. Replies are cumulative,
/// so the latest one wins and a final reply ends the wait.
pub async fn chat(provider: &dyn ChatProvider, request: ChatRequest) -> Result<String, ProviderError> {
    let mut events = provider.stream_chat(request);
    let mut out = String::new();
    while let Some(event) = events.next().await {
        match event {
            ChatEvent::Reply { payload, .. } => {
                out = payload.content;
                if payload.is_final {
                    break;
                }
            }
            ChatEvent::Error { error, .. } => {
                let message = describe_error_code(error.code)
                    .map(str::to_string)
                    .unwrap_or(error.message);
                return Err(ProviderError::Validation(message));
            }
            _ => {}
        }
    }
    Ok(out)
}

#[derive(Clone)]
pub struct AdpClient {
    http: Client,
    config: Arc<AdpConfig>,
}

impl AdpClient {
    pub fn new(config: AdpConfig) -> Self {
        Self {
            http: Client::new(),
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
struct AdpRequestBody<'a> {
    bot_app_key: &'a str,
    session_id: &'a str,
    visitor_biz_id: &'a str,
    content: &'a str,
    request_id: &'a str,
    stream: &'static str,
}

fn validate(request: &ChatRequest) -> Result<(), ChatEvent> {
    let len = request.session_id.chars().count();
    if !(2..=64).contains(&len) {
        return Err(ChatEvent::error(
            CODE_INVALID_SESSION,
            "Session id must be between 2 and 64 characters",
        ));
    }
    if request.content.trim().is_empty() {
        return Err(ChatEvent::error(CODE_EMPTY_CONTENT, "Message content must not be empty"));
    }
    Ok(())
}

impl ChatProvider for AdpClient {
    fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, ChatEvent> {
        let http = self.http.clone();
        let config = self.config.clone();

        Box::pin(stream! {
            if let Err(event) = validate(&request) {
                yield event;
                return;
            }
            let Some(app_key) = config.app_key.as_deref() else {
                yield ChatEvent::error(CODE_LOCAL, "TENCENT_ADP_APP_KEY is not configured");
                return;
            };

            let request_id = request
                .request_id
                .clone()
                .unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple()));
            let body = AdpRequestBody {
                bot_app_key: app_key,
                session_id: &request.session_id,
                visitor_biz_id: &request.visitor_biz_id,
                content: request.content.trim(),
                request_id: &request_id,
                stream: "enable",
            };
            info!(
                session_id = %request.session_id,
                request_id = %request_id,
                content_len = request.content.len(),
                "Sending ADP chat request"
            );

            let send = http.post(&config.api_url).json(&body).send();
            let response = match tokio::time::timeout(config.timeout, send).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    error!("ADP request failed: {}", e);
                    yield ChatEvent::error(CODE_LOCAL, e.to_string());
                    return;
                }
                Err(_) => {
                    warn!("ADP request timed out after {:?}", config.timeout);
                    yield ChatEvent::error(CODE_LOCAL, "Request timed out, please try again later");
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                error!(status = status.as_u16(), "ADP API error");
                yield ChatEvent::error(i64::from(status.as_u16()), format!("ADP API returned {}", status));
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            loop {
                let (pending, eof) = match bytes.next().await {
                    Some(Ok(chunk)) => (lines.push(&chunk), false),
                    Some(Err(e)) => {
                        error!("ADP stream read failed: {}", e);
                        yield ChatEvent::error(CODE_LOCAL, e.to_string());
                        return;
                    }
                    None => (lines.finish().into_iter().collect(), true),
                };

                for line in pending {
                    match parse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => {
                            debug!("ADP stream sent [DONE]");
                            return;
                        }
                        SseLine::Event(event) => {
                            log_event(&event);
                            let stop = matches!(event, ChatEvent::Error { .. });
                            yield event;
                            if stop {
                                return;
                            }
                        }
                        SseLine::Malformed(data) => {
                            warn!(data = %data, "Skipping malformed ADP event");
                        }
                    }
                }

                if eof {
                    debug!("ADP stream completed");
                    return;
                }
            }
        })
    }
}

fn log_event(event: &ChatEvent) {
    match event {
        ChatEvent::Reply { payload, .. } => {
            debug!(len = payload.content.len(), is_final = payload.is_final, "ADP reply");
        }
        ChatEvent::TokenStat { payload, .. } => {
            debug!(tokens = payload.token_count, elapsed = payload.elapsed, "ADP token stat");
        }
        ChatEvent::Error { error, .. } => {
            error!(code = error.code, "ADP error event: {}", error.message);
        }
        ChatEvent::Reference { .. } => {}
    }
}

// -- SSE decoding --

/// Splits a byte stream into lines. Partial lines are kept as bytes until
/// their newline arrives, so multi-byte characters cut across chunks
/// decode intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Returns the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, PartialEq)]
pub enum SseLine {
    /// Blank, comment or `event:` line.
    Skip,
    /// The `[DONE]` sentinel.
    Done,
    Event(ChatEvent),
    Malformed(String),
}

pub fn parse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str(data) {
        Ok(event) => SseLine::Event(event),
        Err(_) => SseLine::Malformed(data.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn line_buffer_keeps_partial_lines_and_utf8() {
        let mut buf = SseLineBuffer::default();
        let text = "data: {\"x\":\"痛点\"}\n";
        let bytes = text.as_bytes();
        // Cut inside the first multi-byte character
        let cut = text.find('痛').unwrap() + 1;

        assert!(buf.push(&bytes[..cut]).is_empty());
        let lines = buf.push(&bytes[cut..]);
        assert_eq!(lines, vec!["data: {\"x\":\"痛点\"}".to_string()]);

        assert_eq!(buf.push(b"a\r\nb\npartial"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(buf.finish().as_deref(), Some("partial"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn parses_reply_events() {
        let line = r#"data: {"type":"reply","payload":{"content":"hi","is_final":true,"record_id":"r1"},"message_id":"m1"}"#;
        match parse_line(line) {
            SseLine::Event(ChatEvent::Reply { payload, message_id }) => {
                assert_eq!(payload.content, "hi");
                assert!(payload.is_final);
                assert_eq!(message_id.as_deref(), Some("m1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_control_lines() {
        assert_eq!(parse_line(""), SseLine::Skip);
        assert_eq!(parse_line("event: reply"), SseLine::Skip);
        assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_line("data: {nope"), SseLine::Malformed("{nope".into()));
        assert_eq!(
            parse_line(r#"data: {"type":"error","error":{"code":460008,"message":"slow down"}}"#),
            SseLine::Event(ChatEvent::error(460008, "slow down"))
        );
    }

    #[test]
    fn validation_rejects_bad_sessions_and_empty_content() {
        let mut req = ChatRequest::new("visitor", "hello");
        assert!(validate(&req).is_ok());

        req.session_id = "x".into();
        match validate(&req) {
            Err(ChatEvent::Error { error, .. }) => assert_eq!(error.code, CODE_INVALID_SESSION),
            other => panic!("unexpected {:?}", other),
        }

        let req = ChatRequest::new("visitor", "   ");
        match validate(&req) {
            Err(ChatEvent::Error { error, .. }) => assert_eq!(error.code, CODE_EMPTY_CONTENT),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(ChatEvent::error(1, "x")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["code"], 1);
    }

    #[tokio::test]
    async fn invalid_request_yields_single_error() {
        let client = AdpClient::new(AdpConfig::default());
        let mut req = ChatRequest::new("visitor", "hello");
        req.session_id = "x".into();

        let events: Vec<_> = client.stream_chat(req).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "error");
    }

    struct Scripted(Vec<ChatEvent>);

    impl ChatProvider for Scripted {
        fn stream_chat(&self, _request: ChatRequest) -> BoxStream<'static, ChatEvent> {
            Box::pin(stream::iter(self.0.clone()))
        }
    }

    fn reply(content: &str, is_final: bool) -> ChatEvent {
        ChatEvent::Reply {
            payload: ReplyPayload {
                content: content.into(),
                is_final,
                ..Default::default()
            },
            message_id: None,
        }
    }

    #[tokio::test]
    async fn chat_keeps_the_final_reply_and_maps_errors() {
        let growing = Scripted(vec![reply("Hel", false), reply("Hello", true)]);
        assert_eq!(chat(&growing, ChatRequest::new("v", "q")).await.unwrap(), "Hello");

        let unflagged = Scripted(vec![reply("a", false), reply("ab", false)]);
        assert_eq!(chat(&unflagged, ChatRequest::new("v", "q")).await.unwrap(), "ab");

        let failing = Scripted(vec![reply("a", false), ChatEvent::error(460010, "raw")]);
        let err = chat(&failing, ChatRequest::new("v", "q")).await.unwrap_err();
        assert_eq!(err.to_string(), "Quota exhausted");
    }
}
