//! Cartwise Audio crate - microphone capture state machine and audio playback.
//!
//! Hardware is reached through the [`Microphone`], [`CaptureStream`] and
//! [`AudioSink`] traits. The crate ships mock implementations for tests, a
//! file-backed microphone for feeding recorded clips through the capture
//! pipeline, and a sink that hands audio to an external player process.

use std::future::Future;

use cartwise_core::types::AudioRef;

pub mod capture;
pub mod error;
pub mod file;
pub mod mock;
pub mod playback;
pub mod player;
pub mod state;

pub use capture::{AudioCaptureController, CaptureOutcome, CapturedAudio, StartOutcome};
pub use error::AudioError;
pub use file::FileMicrophone;
pub use mock::{MockAudioSink, MockMicrophone};
pub use playback::{AudioPlaybackController, PlaybackHandle, PlaybackOutcome};
pub use player::CommandAudioSink;
pub use state::{ChunkSink, RecordingSession};

// =============================================================================
// Traits
// =============================================================================

/// An audio input device that has to be granted access before it records.
///
/// Implementations deliver every data-available event to the [`ChunkSink`]
/// they were opened with, in arrival order.
pub trait Microphone: Send + Sync {
    /// Request access and open a capture stream.
    ///
    /// Resolves to `Err(AudioError::PermissionDenied)` when access is refused.
    fn open(
        &self,
        sink: ChunkSink,
    ) -> impl Future<Output = Result<Box<dyn CaptureStream>, AudioError>> + Send;
}

/// A live hardware capture stream owned by the capture controller.
pub trait CaptureStream: Send {
    /// Release the hardware. Any data the device still holds is flushed to
    /// the sink before this returns.
    fn close(&mut self);
}

/// Output device for audio references.
pub trait AudioSink: Send + Sync {
    /// Begin playing `audio`.
    ///
    /// Resolves once playback has started. The returned handle completes
    /// when playback ends.
    fn start(
        &self,
        audio: &AudioRef,
    ) -> impl Future<Output = Result<PlaybackHandle, AudioError>> + Send;
}
