//! Typed HTTP boundary to the assistant backend.
//!
//! Shapes requests and decodes replies. No conversation logic lives here:
//! the controller decides what a reply means for the log.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde_json::{Map, Value};

use cartwise_core::config::{AudioConfig, BackendConfig};
use cartwise_core::types::{AudioRef, ContentType, MessageDraft, Role};

use crate::error::ChatError;

const ASK_PATH: &str = "/api/ask_product";
const HISTORY_PATH: &str = "/api/history";
const QUERY_TEXT_HEADER: &str = "x-query-text";
const ANSWER_HEADER: &str = "x-answer";
const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

// =============================================================================
// Wire types
// =============================================================================

/// Reply to a text query. `answer` is `None` when the backend omitted it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AskReply {
    pub answer: Option<String>,
}

/// Reply to a voice upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoiceReply {
    /// Transcript of what the user said.
    pub user_query: Option<String>,
    /// The assistant's answer text.
    pub ai_response: Option<String>,
    /// Synthesized speech for the answer, when the backend produced any.
    pub audio: Option<AudioRef>,
}

/// A finalized recording ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct VoicePayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl VoicePayload {
    pub fn new(bytes: Vec<u8>, config: &AudioConfig) -> Self {
        Self {
            bytes,
            file_name: config.file_name.clone(),
            mime_type: config.mime_type.clone(),
        }
    }
}

impl std::fmt::Debug for VoicePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePayload")
            .field("bytes", &self.bytes.len())
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

// =============================================================================
// Transport trait
// =============================================================================

/// Requests the conversation controller can make. The session id is always
/// passed as a query parameter, never in a body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET /api/ask_product?query=..&session_id=..`
    async fn ask_product(&self, query: &str, session_id: &str) -> Result<AskReply, ChatError>;

    /// `GET /api/history?session_id=..`. A non-array body is an empty history.
    async fn history(&self, session_id: &str) -> Result<Vec<MessageDraft>, ChatError>;

    /// Multipart upload of one recording to the voice endpoint.
    async fn voice_chat(
        &self,
        session_id: &str,
        payload: VoicePayload,
    ) -> Result<VoiceReply, ChatError>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// [`Transport`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    voice_endpoint: String,
    tts_voice: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &BackendConfig) -> Result<Self, ChatError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ChatError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::InvalidUrl(config.base_url.clone()));
        }

        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url,
            voice_endpoint: config.voice_endpoint.clone(),
            tts_voice: config.tts_voice.clone().filter(|v| !v.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint URL under the base URL, keeping any path prefix it has.
    pub fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        join_base(&self.base_url, path)
    }

    /// Resolve a backend-relative audio path to a playable URL.
    pub fn resolve_audio_path(&self, path: &str) -> Option<AudioRef> {
        resolve_against(&self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ask_product(&self, query: &str, session_id: &str) -> Result<AskReply, ChatError> {
        let url = self.endpoint(ASK_PATH)?;
        let response = self
            .client
            .get(url)
            .query(&[("query", query), ("session_id", session_id)])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedReply(e.to_string()))?;
        let answer = str_field(&body, "answer");
        if answer.is_none() {
            tracing::debug!(session_id, "Ask reply has no answer field");
        }
        Ok(AskReply { answer })
    }

    async fn history(&self, session_id: &str) -> Result<Vec<MessageDraft>, ChatError> {
        let url = self.endpoint(HISTORY_PATH)?;
        let response = self
            .client
            .get(url)
            .query(&[("session_id", session_id)])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedReply(e.to_string()))?;
        Ok(parse_history(&body, &self.base_url))
    }

    async fn voice_chat(
        &self,
        session_id: &str,
        payload: VoicePayload,
    ) -> Result<VoiceReply, ChatError> {
        let url = self.endpoint(&self.voice_endpoint)?;
        let bytes = payload.bytes.len();
        let part = Part::bytes(payload.bytes)
            .file_name(payload.file_name)
            .mime_str(&payload.mime_type)?;
        let form = Form::new().part("file", part);

        let mut request = self
            .client
            .post(url)
            .query(&[("session_id", session_id)]);
        if let Some(voice) = &self.tts_voice {
            request = request.query(&[("voice", voice.as_str())]);
        }

        tracing::debug!(session_id, bytes, "Uploading voice recording");
        let response = request.multipart(form).send().await?.error_for_status()?;
        decode_voice_response(response, &self.base_url).await
    }
}

// =============================================================================
// Reply decoding
// =============================================================================

async fn decode_voice_response(response: Response, base: &Url) -> Result<VoiceReply, ChatError> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .unwrap_or_default();

    if content_type.starts_with("audio/") || content_type == "application/octet-stream" {
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let mime = if content_type.starts_with("audio/") {
            content_type
        } else {
            DEFAULT_AUDIO_MIME.to_string()
        };
        return Ok(voice_reply_from_headers(&headers, bytes.to_vec(), mime));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| ChatError::MalformedReply(e.to_string()))?;
    parse_voice_json(&body, base)
}

/// Binary reply shape: audio body, transcript and answer in headers.
fn voice_reply_from_headers(headers: &HeaderMap, bytes: Vec<u8>, mime: String) -> VoiceReply {
    let audio = if bytes.is_empty() {
        None
    } else {
        Some(AudioRef::inline(bytes, mime))
    };
    VoiceReply {
        user_query: header_text(headers, QUERY_TEXT_HEADER),
        ai_response: header_text(headers, ANSWER_HEADER),
        audio,
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(name)?;
    let raw = String::from_utf8_lossy(raw.as_bytes());
    let decoded = urlencoding::decode(&raw).unwrap_or(Cow::Borrowed(raw.as_ref()));
    Some(decoded.into_owned())
}

/// JSON reply shapes. `audio_path` wins over `audio_base64`.
fn parse_voice_json(body: &Value, base: &Url) -> Result<VoiceReply, ChatError> {
    if !body.is_object() {
        return Err(ChatError::MalformedReply(
            "voice reply is not a JSON object".to_string(),
        ));
    }

    let audio = match str_field(body, "audio_path").filter(|p| !p.is_empty()) {
        Some(path) => resolve_against(base, &path),
        None => inline_audio(body),
    };

    Ok(VoiceReply {
        user_query: str_field(body, "user_query"),
        ai_response: str_field(body, "ai_response"),
        audio,
    })
}

fn inline_audio(body: &Value) -> Option<AudioRef> {
    if body.get("has_audio").and_then(Value::as_bool) == Some(false) {
        return None;
    }
    let encoded = str_field(body, "audio_base64").filter(|s| !s.is_empty())?;
    match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
        Ok(bytes) if !bytes.is_empty() => {
            let mime = match str_field(body, "format").as_deref() {
                None | Some("") | Some("mp3") => DEFAULT_AUDIO_MIME.to_string(),
                Some(format) => format!("audio/{}", format),
            };
            Some(AudioRef::inline(bytes, mime))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding undecodable voice reply audio");
            None
        }
    }
}

/// Append `path` to the base URL's path. Absolute URLs are returned as-is.
///
/// A leading `/` in `path` never replaces the base's own path prefix.
fn join_base(base: &Url, path: &str) -> Result<Url, ChatError> {
    if let Ok(absolute) = Url::parse(path) {
        return Ok(absolute);
    }
    if path.starts_with("//") {
        return base
            .join(path)
            .map_err(|e| ChatError::InvalidUrl(format!("{}: {}", path, e)));
    }
    let mut prefix = base.clone();
    prefix.set_query(None);
    prefix.set_fragment(None);
    let dir = format!("{}/", base.path().trim_end_matches('/'));
    prefix.set_path(&dir);
    prefix
        .join(path.trim_start_matches('/'))
        .map_err(|e| ChatError::InvalidUrl(format!("{}: {}", path, e)))
}

fn resolve_against(base: &Url, path: &str) -> Option<AudioRef> {
    match join_base(base, path) {
        Ok(url) => Some(AudioRef::url(url.to_string())),
        Err(e) => {
            tracing::warn!(path, error = %e, "Unresolvable audio path");
            None
        }
    }
}

/// Decode a history body into drafts, preserving backend order.
///
/// Accepts full message-shaped entries and the legacy `{sender, text}`
/// shape. Anything other than an array is an empty history; non-object
/// entries are skipped.
pub fn parse_history(body: &Value, base: &Url) -> Vec<MessageDraft> {
    let Some(entries) = body.as_array() else {
        tracing::debug!("History body is not an array, treating as empty");
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry.as_object() {
            Some(obj) => Some(history_entry(obj, base)),
            None => {
                tracing::debug!("Skipping non-object history entry");
                None
            }
        })
        .collect()
}

fn history_entry(obj: &Map<String, Value>, base: &Url) -> MessageDraft {
    let get = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };

    let role = get(&["role", "sender"]).map(|label| Role::from_label(&label));
    let content_type = get(&["contentType", "content_type"])
        .and_then(|label| ContentType::from_label(&label))
        .unwrap_or_default();
    let audio_ref = get(&["audioRef", "audio_ref", "audioUrl", "audio_url", "audio_path"])
        .filter(|p| !p.is_empty())
        .and_then(|p| resolve_against(base, &p));

    MessageDraft {
        id: get(&["id"]),
        role,
        content_type,
        text: get(&["text", "message"]),
        image_url: get(&["imageUrl", "image_url"]),
        audio_ref,
        timestamp: get(&["timestamp"]),
    }
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

// =============================================================================
// Tests
// =============================================================================
