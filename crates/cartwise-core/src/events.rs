use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Message, RecordingState};

/// Transient, non-fatal condition shown inline next to the conversation.
///
/// Never appended to the message log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// Microphone access was refused.
    PermissionDenied,
    /// A recording stopped without any audio data.
    NoAudioCaptured,
    /// Playback could not start; the user has to trigger it manually.
    PlaybackBlocked,
    /// The typed query exceeds the configured maximum length.
    QueryTooLong,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PermissionDenied => write!(f, "Microphone access denied."),
            Notice::NoAudioCaptured => write!(f, "No audio was captured. Please try again."),
            Notice::PlaybackBlocked => write!(f, "Playback was blocked. Press play to listen."),
            Notice::QueryTooLong => write!(f, "Your message is too long."),
        }
    }
}

/// Events emitted by the conversation controller for the rendering layer.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ConversationEvent {
    /// A message was appended to the end of the log.
    MessageAppended(Message),

    /// The log was replaced by backend history.
    LogHydrated { count: usize },

    /// The log was cleared by the user.
    LogReset,

    /// Number of in-flight requests changed. `pending > 0` shows the
    /// loading indicator.
    PendingChanged { pending: usize },

    /// The microphone state machine moved.
    RecordingStateChanged { from: RecordingState, to: RecordingState },

    /// An inline notice should be shown.
    Notice(Notice),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_display() {
        assert_eq!(Notice::PermissionDenied.to_string(), "Microphone access denied.");
        assert!(Notice::NoAudioCaptured.to_string().contains("No audio"));
        assert!(Notice::PlaybackBlocked.to_string().contains("play"));
        assert!(Notice::QueryTooLong.to_string().contains("too long"));
    }

    #[test]
    fn test_notice_serde() {
        let json = serde_json::to_string(&Notice::NoAudioCaptured).unwrap();
        assert_eq!(json, "\"no_audio_captured\"");
        let back: Notice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Notice::NoAudioCaptured);
    }

    #[test]
    fn test_event_debug() {
        let ev = ConversationEvent::RecordingStateChanged {
            from: RecordingState::Idle,
            to: RecordingState::RequestingPermission,
        };
        let dbg = format!("{:?}", ev);
        assert!(dbg.contains("RequestingPermission"));
    }
}
