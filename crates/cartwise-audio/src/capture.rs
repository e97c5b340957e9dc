//! Microphone capture controller.
//!
//! Drives one [`Microphone`] through the recording lifecycle:
//! - Idle -> RequestingPermission (start requested)
//! - RequestingPermission -> Capturing (access granted, stream open)
//! - RequestingPermission -> Idle (access denied)
//! - Capturing -> Finalizing -> Idle (stop, payload handed off)
//! - Capturing -> Idle (teardown, buffered audio discarded)
//!
//! `start` while a cycle is active and `stop` while nothing is capturing are
//! no-ops. Dropping the controller abandons any active cycle without
//! signalling completion.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cartwise_core::types::RecordingState;

use crate::error::AudioError;
use crate::state::{lock_cell, CaptureCell, ChunkSink, RecordingSession};
use crate::Microphone;

/// Callback invoked after every applied state transition with `(from, to)`.
///
/// Runs after the controller's lock is released, so it may query the
/// controller.
pub type TransitionHook = Box<dyn Fn(RecordingState, RecordingState) + Send + Sync>;

/// Result of [`AudioCaptureController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Access granted; the controller is capturing.
    Started,
    /// A cycle was already active; nothing changed.
    AlreadyActive(RecordingState),
    /// Access was refused; the controller is back in `Idle`.
    PermissionDenied,
    /// The device failed to open; the controller is back in `Idle`.
    DeviceUnavailable(String),
    /// The cycle was torn down while waiting for access.
    Abandoned,
}

/// The finalized recording handed off on a successful stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedAudio {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub bytes: Vec<u8>,
}

/// Result of a stop on an active capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Completed(CapturedAudio),
    NoAudioCaptured,
}

impl CaptureOutcome {
    /// Convert into the payload, mapping an empty recording to
    /// [`AudioError::NoAudioCaptured`].
    pub fn into_result(self) -> Result<CapturedAudio, AudioError> {
        match self {
            CaptureOutcome::Completed(audio) => Ok(audio),
            CaptureOutcome::NoAudioCaptured => Err(AudioError::NoAudioCaptured),
        }
    }
}

/// State machine around exclusive hardware microphone capture.
pub struct AudioCaptureController<M> {
    microphone: M,
    cell: Arc<Mutex<CaptureCell>>,
    on_transition: Option<TransitionHook>,
}

impl<M> std::fmt::Debug for AudioCaptureController<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCaptureController")
            .field("cell", &self.cell)
            .field("has_hook", &self.on_transition.is_some())
            .finish()
    }
}

impl<M: Microphone> AudioCaptureController<M> {
    pub fn new(microphone: M) -> Self {
        Self {
            microphone,
            cell: Arc::new(Mutex::new(CaptureCell::new())),
            on_transition: None,
        }
    }

    /// Register a callback observing every state transition.
    pub fn with_transition_hook(mut self, hook: TransitionHook) -> Self {
        self.on_transition = Some(hook);
        self
    }

    /// Request microphone access and begin capturing.
    ///
    /// Never returns an error: denial and device failures are reported in
    /// the outcome and leave the controller in `Idle`.
    pub async fn start(&self) -> StartOutcome {
        let (generation, sink, applied) = {
            let mut cell = lock_cell(&self.cell);
            if cell.state != RecordingState::Idle {
                tracing::debug!(state = %cell.state, "Capture start ignored; already active");
                return StartOutcome::AlreadyActive(cell.state);
            }
            let applied = match cell.transition(RecordingState::RequestingPermission) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "Capture start rejected");
                    return StartOutcome::AlreadyActive(cell.state);
                }
            };
            cell.generation += 1;
            cell.session = Some(RecordingSession::new());
            let generation = cell.generation;
            (generation, ChunkSink::new(&self.cell, generation), applied)
        };
        self.notify(applied);

        let opened = self.microphone.open(sink).await;

        let mut cell = lock_cell(&self.cell);
        if cell.generation != generation || cell.state != RecordingState::RequestingPermission {
            drop(cell);
            if let Ok(mut stream) = opened {
                stream.close();
            }
            tracing::info!("Capture abandoned while waiting for microphone access");
            return StartOutcome::Abandoned;
        }

        match opened {
            Ok(stream) => {
                cell.stream = Some(stream);
                let applied = cell.transition(RecordingState::Capturing);
                let session_id = cell.session.as_ref().map(|s| s.id);
                drop(cell);
                if let Ok(pair) = applied {
                    self.notify(pair);
                }
                if let Some(id) = session_id {
                    tracing::info!(session_id = %id, "Microphone capture started");
                }
                StartOutcome::Started
            }
            Err(e) => {
                cell.session = None;
                let applied = cell.transition(RecordingState::Idle);
                drop(cell);
                if let Ok(pair) = applied {
                    self.notify(pair);
                }
                match e {
                    AudioError::PermissionDenied => {
                        tracing::warn!("Microphone permission denied");
                        StartOutcome::PermissionDenied
                    }
                    other => {
                        tracing::warn!(error = %other, "Microphone unavailable");
                        StartOutcome::DeviceUnavailable(other.to_string())
                    }
                }
            }
        }
    }

    /// Stop capturing and hand off the recording.
    ///
    /// Returns `None` when no capture was active. Otherwise the controller
    /// always ends in `Idle`.
    pub fn stop(&self) -> Option<CaptureOutcome> {
        let (generation, stream, applied) = {
            let mut cell = lock_cell(&self.cell);
            if cell.state != RecordingState::Capturing {
                tracing::debug!(state = %cell.state, "Capture stop ignored; not capturing");
                return None;
            }
            let applied = cell.transition(RecordingState::Finalizing).ok()?;
            (cell.generation, cell.stream.take(), applied)
        };
        self.notify(applied);

        // The device may flush its last chunk while closing.
        if let Some(mut stream) = stream {
            stream.close();
        }

        let (session, applied) = {
            let mut cell = lock_cell(&self.cell);
            if cell.generation != generation || cell.state != RecordingState::Finalizing {
                return None;
            }
            let session = cell.session.take();
            (session, cell.transition(RecordingState::Idle))
        };
        if let Ok(pair) = applied {
            self.notify(pair);
        }

        let Some(session) = session else {
            return Some(CaptureOutcome::NoAudioCaptured);
        };
        let session_id = session.id;
        let started_at = session.started_at;
        let chunk_count = session.chunk_count();
        match session.into_payload() {
            Some(bytes) => {
                tracing::info!(
                    session_id = %session_id,
                    chunks = chunk_count,
                    bytes = bytes.len(),
                    "Microphone capture finalized"
                );
                Some(CaptureOutcome::Completed(CapturedAudio {
                    session_id,
                    started_at,
                    chunk_count,
                    bytes,
                }))
            }
            None => {
                tracing::info!(session_id = %session_id, "Microphone capture ended with no audio");
                Some(CaptureOutcome::NoAudioCaptured)
            }
        }
    }
}

impl<M> AudioCaptureController<M> {
    /// Current state of the capture cycle.
    pub fn state(&self) -> RecordingState {
        lock_cell(&self.cell).state
    }

    /// Number of non-empty chunks buffered in the active cycle.
    pub fn buffered_chunks(&self) -> usize {
        lock_cell(&self.cell)
            .session
            .as_ref()
            .map(RecordingSession::chunk_count)
            .unwrap_or(0)
    }

    /// Tear down an active cycle: release the hardware and discard buffered
    /// audio without signalling completion.
    ///
    /// Returns `true` if a cycle was active.
    pub fn abandon(&self) -> bool {
        let (stream, applied) = {
            let mut cell = lock_cell(&self.cell);
            match cell.state {
                RecordingState::Idle => return false,
                RecordingState::Finalizing => {
                    // A stop is already handing the payload off.
                    return false;
                }
                RecordingState::RequestingPermission | RecordingState::Capturing => {}
            }
            cell.generation += 1;
            let discarded = cell.session.take().map(|s| s.chunk_count()).unwrap_or(0);
            tracing::info!(discarded_chunks = discarded, "Microphone capture abandoned");
            (cell.stream.take(), cell.transition(RecordingState::Idle))
        };
        if let Some(mut stream) = stream {
            stream.close();
        }
        if let Ok(pair) = applied {
            self.notify(pair);
        }
        true
    }

    fn notify(&self, (from, to): (RecordingState, RecordingState)) {
        if let Some(ref hook) = self.on_transition {
            hook(from, to);
        }
    }
}

impl<M> Drop for AudioCaptureController<M> {
    fn drop(&mut self) {
        self.abandon();
    }
}

// =============================================================================
// Tests
// =============================================================================
