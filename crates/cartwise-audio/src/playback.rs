//! On-demand playback of received or replayed audio.
//!
//! Every call to [`AudioPlaybackController::play`] is independent: starting a
//! new playback never stops another. Failures are reported in the outcome and
//! logged, never raised, since every voice reply also carries its text.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;

use cartwise_core::types::AudioRef;

use crate::AudioSink;

/// Completion handle for one started playback.
#[derive(Debug, Default)]
pub struct PlaybackHandle {
    task: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// A handle for playback that has already completed.
    pub fn finished() -> Self {
        Self { task: None }
    }

    /// A handle completing when `task` does.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    /// Wait for playback to end.
    pub async fn wait(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "Playback task ended abnormally");
            }
        }
    }
}

/// Result of a playback request.
#[derive(Debug)]
pub enum PlaybackOutcome {
    Started {
        playback_id: u64,
        handle: PlaybackHandle,
    },
    /// Playback could not start; the user has to trigger it manually.
    Blocked { reason: String },
}

impl PlaybackOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, PlaybackOutcome::Started { .. })
    }
}

/// Starts playback of audio references on an [`AudioSink`].
#[derive(Debug)]
pub struct AudioPlaybackController<S> {
    sink: S,
    next_id: AtomicU64,
}

impl<S: AudioSink> AudioPlaybackController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_id: AtomicU64::new(1),
        }
    }

    /// Begin playing `audio`.
    pub async fn play(&self, audio: &AudioRef) -> PlaybackOutcome {
        let playback_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.sink.start(audio).await {
            Ok(handle) => {
                tracing::info!(playback_id, audio = ?audio, "Playback started");
                PlaybackOutcome::Started {
                    playback_id,
                    handle,
                }
            }
            Err(e) => {
                tracing::warn!(playback_id, error = %e, "Playback blocked");
                PlaybackOutcome::Blocked {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

// =============================================================================
// Tests
// =============================================================================
