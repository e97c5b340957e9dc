//! Microphone backed by a recorded clip on disk.
//!
//! Lets a pre-recorded file travel the same capture path as live input: the
//! file is "granted" on open and its bytes arrive as data-available chunks.

use std::path::{Path, PathBuf};

use crate::error::AudioError;
use crate::state::ChunkSink;
use crate::{CaptureStream, Microphone};

/// Default chunk size, close to what a browser recorder emits per second.
const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Microphone that replays a file as a single capture.
#[derive(Debug, Clone)]
pub struct FileMicrophone {
    path: PathBuf,
    chunk_bytes: usize,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Microphone for FileMicrophone {
    async fn open(&self, sink: ChunkSink) -> Result<Box<dyn CaptureStream>, AudioError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => AudioError::PermissionDenied,
            _ => AudioError::Device(format!("{}: {}", self.path.display(), e)),
        })?;

        let mut delivered = 0usize;
        for chunk in bytes.chunks(self.chunk_bytes) {
            if sink.deliver(chunk.to_vec()) {
                delivered += 1;
            }
        }
        tracing::debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            chunks = delivered,
            "File microphone opened"
        );
        Ok(Box::new(FileStream))
    }
}

struct FileStream;

impl CaptureStream for FileStream {
    fn close(&mut self) {}
}
