//! Error types for microphone capture and playback.

use cartwise_core::error::CartwiseError;
use cartwise_core::types::RecordingState;

/// Errors from the audio subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no audio captured")]
    NoAudioCaptured,
    #[error("playback blocked: {0}")]
    PlaybackBlocked(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("invalid recording state transition: {from} -> {to}")]
    InvalidTransition {
        from: RecordingState,
        to: RecordingState,
    },
}

impl From<AudioError> for CartwiseError {
    fn from(err: AudioError) -> Self {
        CartwiseError::Audio(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_display() {
        assert_eq!(
            AudioError::PermissionDenied.to_string(),
            "microphone permission denied"
        );
        assert_eq!(AudioError::NoAudioCaptured.to_string(), "no audio captured");
        assert_eq!(
            AudioError::PlaybackBlocked("autoplay".to_string()).to_string(),
            "playback blocked: autoplay"
        );
        assert_eq!(
            AudioError::Device("unplugged".to_string()).to_string(),
            "audio device error: unplugged"
        );
        assert_eq!(
            AudioError::InvalidTransition {
                from: RecordingState::Idle,
                to: RecordingState::Finalizing,
            }
            .to_string(),
            "invalid recording state transition: Idle -> Finalizing"
        );
    }

    #[test]
    fn test_audio_error_into_cartwise_error() {
        let err: CartwiseError = AudioError::PermissionDenied.into();
        assert!(matches!(err, CartwiseError::Audio(_)));
        assert!(err.to_string().contains("permission denied"));
    }
}
