//! Mock audio devices for testing without real hardware.
//!
//! Both mocks are cheaply cloneable; clones share their recorded state so a
//! test can keep a handle while the controller owns another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cartwise_core::types::AudioRef;

use crate::error::AudioError;
use crate::playback::PlaybackHandle;
use crate::state::ChunkSink;
use crate::{AudioSink, CaptureStream, Microphone};

// =============================================================================
// Microphone
// =============================================================================

#[derive(Debug, Clone)]
enum Access {
    Grant,
    Deny,
    Fail(String),
}

#[derive(Debug, Default)]
struct MicShared {
    sink: Mutex<Option<ChunkSink>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Scriptable microphone.
///
/// Grants access by default. Data-available events are simulated with
/// [`MockMicrophone::deliver`], which pushes to the sink of the most recent
/// open.
#[derive(Debug, Clone)]
pub struct MockMicrophone {
    access: Access,
    initial_chunks: Vec<Vec<u8>>,
    flush_on_close: Option<Vec<u8>>,
    shared: Arc<MicShared>,
}

impl Default for MockMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMicrophone {
    pub fn new() -> Self {
        Self {
            access: Access::Grant,
            initial_chunks: Vec::new(),
            flush_on_close: None,
            shared: Arc::new(MicShared::default()),
        }
    }

    /// A microphone whose permission prompt is always refused.
    pub fn denying() -> Self {
        Self {
            access: Access::Deny,
            ..Self::new()
        }
    }

    /// A microphone that fails to open with a device error.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            access: Access::Fail(reason.into()),
            ..Self::new()
        }
    }

    /// Chunks delivered as soon as access is granted.
    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.initial_chunks = chunks;
        self
    }

    /// A final chunk the device flushes while its stream is closed.
    pub fn with_flush_on_close(mut self, chunk: Vec<u8>) -> Self {
        self.flush_on_close = Some(chunk);
        self
    }

    /// Simulate a data-available event on the latest stream.
    pub fn deliver(&self, chunk: Vec<u8>) -> bool {
        let sink = self
            .shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sink.map(|s| s.deliver(chunk)).unwrap_or(false)
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

impl Microphone for MockMicrophone {
    async fn open(&self, sink: ChunkSink) -> Result<Box<dyn CaptureStream>, AudioError> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        match &self.access {
            Access::Deny => return Err(AudioError::PermissionDenied),
            Access::Fail(reason) => return Err(AudioError::Device(reason.clone())),
            Access::Grant => {}
        }
        *self
            .shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink.clone());
        for chunk in &self.initial_chunks {
            sink.deliver(chunk.clone());
        }
        tracing::debug!("Mock microphone opened");
        Ok(Box::new(MockStream {
            sink,
            flush_on_close: self.flush_on_close.clone(),
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

struct MockStream {
    sink: ChunkSink,
    flush_on_close: Option<Vec<u8>>,
    shared: Arc<MicShared>,
    closed: bool,
}

impl CaptureStream for MockStream {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(chunk) = self.flush_on_close.take() {
            self.sink.deliver(chunk);
        }
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Audio sink
// =============================================================================

/// Audio sink that records what it was asked to play.
#[derive(Debug, Clone, Default)]
pub struct MockAudioSink {
    blocked: bool,
    played: Arc<Mutex<Vec<AudioRef>>>,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses every playback, like a blocked autoplay policy.
    pub fn blocked() -> Self {
        Self {
            blocked: true,
            ..Self::default()
        }
    }

    /// Every audio reference that started playing, in order.
    pub fn played(&self) -> Vec<AudioRef> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AudioSink for MockAudioSink {
    async fn start(&self, audio: &AudioRef) -> Result<PlaybackHandle, AudioError> {
        if self.blocked {
            return Err(AudioError::PlaybackBlocked(
                "autoplay is not allowed".to_string(),
            ));
        }
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(audio.clone());
        Ok(PlaybackHandle::finished())
    }
}

// =============================================================================
// Tests
// =============================================================================
