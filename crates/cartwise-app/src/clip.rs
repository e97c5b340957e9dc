//! Microphone fed from audio clips chosen at run time.
//!
//! The terminal has no live microphone, so each recording replays the clip
//! selected just before it through the normal capture state machine.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use cartwise_audio::{AudioError, CaptureStream, ChunkSink, FileMicrophone, Microphone};

/// Clones share the selected clip.
#[derive(Debug, Clone, Default)]
pub struct ClipMicrophone {
    next: Arc<Mutex<Option<PathBuf>>>,
}

impl ClipMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the clip the next recording replays.
    pub fn select(&self, path: PathBuf) {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner) = Some(path);
    }
}

impl Microphone for ClipMicrophone {
    async fn open(&self, sink: ChunkSink) -> Result<Box<dyn CaptureStream>, AudioError> {
        let path = self
            .next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match path {
            Some(path) => FileMicrophone::new(path).open(sink).await,
            None => Err(AudioError::Device("no clip selected".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartwise_audio::{AudioCaptureController, CaptureOutcome, StartOutcome};
    use std::io::Write;

    #[tokio::test]
    async fn test_selected_clip_is_captured_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"clip-bytes").unwrap();

        let mic = ClipMicrophone::new();
        let controller = AudioCaptureController::new(mic.clone());
        mic.select(file.path().to_path_buf());
        assert_eq!(controller.start().await, StartOutcome::Started);
        match controller.stop() {
            Some(CaptureOutcome::Completed(audio)) => assert_eq!(audio.bytes, b"clip-bytes"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // The selection is consumed by the first recording.
        assert!(matches!(
            controller.start().await,
            StartOutcome::DeviceUnavailable(_)
        ));
    }
}
