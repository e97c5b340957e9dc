//! Recording state and the buffered audio of one capture cycle.
//!
//! The capture cell is shared between the controller and the [`ChunkSink`]
//! handed to the hardware. Every transition is validated with
//! [`RecordingState::can_transition_to`]; a generation counter ties each
//! sink to the capture cycle it was issued for so late hardware callbacks
//! from an abandoned cycle are dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cartwise_core::types::RecordingState;

use crate::error::AudioError;
use crate::CaptureStream;

/// Transient buffered audio for one microphone capture cycle.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Unique identifier for this capture cycle.
    pub id: Uuid,
    /// When capture was requested.
    pub started_at: DateTime<Utc>,
    chunks: Vec<Vec<u8>>,
    byte_len: usize,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            chunks: Vec::new(),
            byte_len: 0,
        }
    }

    /// Append a chunk in arrival order. Zero-length chunks are ignored.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.byte_len += chunk.len();
        self.chunks.push(chunk);
        true
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate all chunks into one payload, or `None` if nothing was
    /// captured.
    pub fn into_payload(self) -> Option<Vec<u8>> {
        if self.chunks.is_empty() {
            return None;
        }
        let mut payload = Vec::with_capacity(self.byte_len);
        for chunk in self.chunks {
            payload.extend_from_slice(&chunk);
        }
        Some(payload)
    }
}

/// Shared mutable state behind an [`AudioCaptureController`](crate::AudioCaptureController).
pub(crate) struct CaptureCell {
    pub(crate) state: RecordingState,
    pub(crate) generation: u64,
    pub(crate) session: Option<RecordingSession>,
    pub(crate) stream: Option<Box<dyn CaptureStream>>,
}

impl CaptureCell {
    pub(crate) fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            generation: 0,
            session: None,
            stream: None,
        }
    }

    /// Move to `target`, returning the applied `(from, to)` pair.
    pub(crate) fn transition(
        &mut self,
        target: RecordingState,
    ) -> Result<(RecordingState, RecordingState), AudioError> {
        let from = self.state;
        if from.can_transition_to(&target) {
            tracing::debug!("Recording state: {} -> {}", from, target);
            self.state = target;
            Ok((from, target))
        } else {
            Err(AudioError::InvalidTransition { from, to: target })
        }
    }

    fn accepts_chunks(&self, generation: u64) -> bool {
        self.generation == generation
            && matches!(
                self.state,
                RecordingState::RequestingPermission
                    | RecordingState::Capturing
                    | RecordingState::Finalizing
            )
    }
}

impl fmt::Debug for CaptureCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureCell")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("session", &self.session)
            .field("has_stream", &self.stream.is_some())
            .finish()
    }
}

pub(crate) fn lock_cell(cell: &Mutex<CaptureCell>) -> MutexGuard<'_, CaptureCell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle the hardware uses to report data-available events.
///
/// Holds only a weak reference to the controller, so a device callback that
/// outlives its controller simply has its data dropped.
#[derive(Clone)]
pub struct ChunkSink {
    cell: Weak<Mutex<CaptureCell>>,
    generation: u64,
}

impl ChunkSink {
    pub(crate) fn new(cell: &Arc<Mutex<CaptureCell>>, generation: u64) -> Self {
        Self {
            cell: Arc::downgrade(cell),
            generation,
        }
    }

    /// A sink attached to nothing. Every delivery is dropped.
    pub fn detached() -> Self {
        Self {
            cell: Weak::new(),
            generation: 0,
        }
    }

    /// Deliver one chunk of recorded bytes.
    ///
    /// Returns `false` when the chunk was dropped: it was empty, or the
    /// capture cycle this sink belongs to is no longer active.
    pub fn deliver(&self, chunk: impl Into<Vec<u8>>) -> bool {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return false;
        }
        let Some(cell) = self.cell.upgrade() else {
            return false;
        };
        let mut cell = lock_cell(&cell);
        if !cell.accepts_chunks(self.generation) {
            tracing::trace!(bytes = chunk.len(), "Dropping chunk from stale capture cycle");
            return false;
        }
        match cell.session.as_mut() {
            Some(session) => session.push_chunk(chunk),
            None => false,
        }
    }

    /// Whether deliveries are currently accepted.
    pub fn is_open(&self) -> bool {
        self.cell
            .upgrade()
            .map(|cell| lock_cell(&cell).accepts_chunks(self.generation))
            .unwrap_or(false)
    }
}

impl fmt::Debug for ChunkSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSink")
            .field("generation", &self.generation)
            .field("attached", &(self.cell.strong_count() > 0))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn capturing_cell() -> Arc<Mutex<CaptureCell>> {
        let mut cell = CaptureCell::new();
        cell.transition(RecordingState::RequestingPermission).unwrap();
        cell.transition(RecordingState::Capturing).unwrap();
        cell.generation = 1;
        cell.session = Some(RecordingSession::new());
        Arc::new(Mutex::new(cell))
    }

    #[test]
    fn test_session_ignores_empty_chunks() {
        let mut session = RecordingSession::new();
        assert!(!session.push_chunk(Vec::new()));
        assert!(session.is_empty());
        assert!(session.into_payload().is_none());
    }

    #[test]
    fn test_session_concatenates_in_order() {
        let mut session = RecordingSession::new();
        session.push_chunk(vec![1, 2]);
        session.push_chunk(vec![3]);
        session.push_chunk(vec![4, 5, 6]);
        assert_eq!(session.chunk_count(), 3);
        assert_eq!(session.byte_len(), 6);
        assert_eq!(session.into_payload().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_cell_transition_rejects_invalid() {
        let mut cell = CaptureCell::new();
        let err = cell.transition(RecordingState::Finalizing).unwrap_err();
        assert_eq!(
            err,
            AudioError::InvalidTransition {
                from: RecordingState::Idle,
                to: RecordingState::Finalizing,
            }
        );
        assert_eq!(cell.state, RecordingState::Idle);
    }

    #[test]
    fn test_cell_transition_reports_pair() {
        let mut cell = CaptureCell::new();
        let pair = cell.transition(RecordingState::RequestingPermission).unwrap();
        assert_eq!(
            pair,
            (RecordingState::Idle, RecordingState::RequestingPermission)
        );
    }

    #[test]
    fn test_sink_delivers_while_capturing() {
        let cell = capturing_cell();
        let sink = ChunkSink::new(&cell, 1);
        assert!(sink.is_open());
        assert!(sink.deliver(vec![9u8, 9]));
        assert!(!sink.deliver(Vec::<u8>::new()));
        let guard = lock_cell(&cell);
        assert_eq!(guard.session.as_ref().unwrap().chunk_count(), 1);
    }

    #[test]
    fn test_sink_from_old_generation_is_dropped() {
        let cell = capturing_cell();
        let stale = ChunkSink::new(&cell, 0);
        assert!(!stale.is_open());
        assert!(!stale.deliver(vec![1u8]));
        assert!(lock_cell(&cell).session.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_sink_after_cell_dropped() {
        let cell = capturing_cell();
        let sink = ChunkSink::new(&cell, 1);
        drop(cell);
        assert!(!sink.is_open());
        assert!(!sink.deliver(vec![1u8]));
    }

    #[test]
    fn test_detached_sink() {
        let sink = ChunkSink::detached();
        assert!(!sink.is_open());
        assert!(!sink.deliver(vec![1u8, 2, 3]));
    }
}
