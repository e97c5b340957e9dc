use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map a backend `sender`/`role` label onto a role.
    ///
    /// Only `"user"` (any case) is a user; every other label the backends
    /// emit (`"ai"`, `"bot"`, `"assistant"`) is the assistant.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// How a message should be rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Image,
    /// Reply paired with synthesized speech.
    #[serde(rename = "audio-reply")]
    AudioReply,
}

impl ContentType {
    /// Parse the wire label used by history entries. Unknown labels are `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "text" => Some(ContentType::Text),
            "image" => Some(ContentType::Image),
            "audio-reply" | "audio_reply" | "audio" => Some(ContentType::AudioReply),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Text => write!(f, "text"),
            ContentType::Image => write!(f, "image"),
            ContentType::AudioReply => write!(f, "audio-reply"),
        }
    }
}

/// Lifecycle of one microphone capture cycle.
///
/// `Idle -> RequestingPermission -> Capturing -> Finalizing -> Idle`, with
/// `RequestingPermission -> Idle` on denial and `Capturing -> Idle` on
/// forced teardown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    #[default]
    Idle,
    RequestingPermission,
    Capturing,
    Finalizing,
}

impl RecordingState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &RecordingState) -> bool {
        matches!(
            (self, target),
            (RecordingState::Idle, RecordingState::RequestingPermission)
                | (RecordingState::RequestingPermission, RecordingState::Capturing)
                | (RecordingState::Capturing, RecordingState::Finalizing)
                | (RecordingState::Finalizing, RecordingState::Idle)
                // Denial and teardown
                | (RecordingState::RequestingPermission, RecordingState::Idle)
                | (RecordingState::Capturing, RecordingState::Idle)
        )
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "Idle"),
            RecordingState::RequestingPermission => write!(f, "RequestingPermission"),
            RecordingState::Capturing => write!(f, "Capturing"),
            RecordingState::Finalizing => write!(f, "Finalizing"),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Durable client identity attached to every backend request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a fresh globally-unique identifier.
    pub fn generate() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Audio references
// =============================================================================

/// Opaque handle to playable audio attached to a message.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioRef {
    /// A resource fetched over HTTP, already resolved to an absolute URL.
    Url { url: String },
    /// Audio bytes carried in the reply itself.
    Inline {
        #[serde(skip)]
        data: Arc<[u8]>,
        mime_type: String,
    },
}

impl AudioRef {
    pub fn url(url: impl Into<String>) -> Self {
        AudioRef::Url { url: url.into() }
    }

    pub fn inline(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        AudioRef::Inline {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// File extension matching the audio's MIME type, used when the bytes
    /// have to be handed to an external player.
    pub fn extension(&self) -> &'static str {
        let mime = match self {
            AudioRef::Url { url } => return extension_from_path(url),
            AudioRef::Inline { mime_type, .. } => mime_type.as_str(),
        };
        match mime {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" | "audio/opus" => "ogg",
            "audio/webm" => "webm",
            "audio/aac" => "aac",
            "audio/flac" => "flac",
            _ => "bin",
        }
    }
}

fn extension_from_path(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("mp3") => "mp3",
        Some("wav") => "wav",
        Some("ogg") => "ogg",
        Some("webm") => "webm",
        _ => "bin",
    }
}

impl fmt::Debug for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioRef::Url { url } => f.debug_struct("Url").field("url", url).finish(),
            AudioRef::Inline { data, mime_type } => f
                .debug_struct("Inline")
                .field("bytes", &data.len())
                .field("mime_type", mime_type)
                .finish(),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One entry of the conversation log. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content_type: ContentType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub audio_ref: Option<AudioRef>,
    pub timestamp: String,
}

/// A message that has not been appended yet. `id` and `timestamp` are
/// filled in by the store when absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageDraft {
    pub id: Option<String>,
    pub role: Option<Role>,
    pub content_type: ContentType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub audio_ref: Option<AudioRef>,
    pub timestamp: Option<String>,
}

impl MessageDraft {
    /// A plain-text message from the user.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A plain-text message from the assistant.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_audio(mut self, audio_ref: Option<AudioRef>) -> Self {
        self.audio_ref = audio_ref;
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Finalize into a [`Message`] with the given id. A missing role means
    /// the assistant, a missing timestamp means now.
    pub fn into_message(self, id: String) -> Message {
        Message {
            id,
            role: self.role.unwrap_or(Role::Assistant),
            content_type: self.content_type,
            text: self.text,
            image_url: self.image_url,
            audio_ref: self.audio_ref,
            timestamp: self.timestamp.unwrap_or_else(now_timestamp),
        }
    }
}

/// Current local time as an RFC 3339 string.
pub fn now_timestamp() -> String {
    Local::now().to_rfc3339()
}

// =============================================================================
// Tests
// =============================================================================
