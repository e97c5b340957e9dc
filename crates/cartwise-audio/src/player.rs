//! Audio sink that hands each reference to an external player process.
//!
//! URLs are passed to the player directly. Inline audio is written to a
//! scratch file that is removed once the player exits.

use std::path::PathBuf;
use std::process::Stdio;

use uuid::Uuid;

use cartwise_core::config::AudioConfig;
use cartwise_core::types::AudioRef;

use crate::error::AudioError;
use crate::playback::PlaybackHandle;
use crate::AudioSink;

/// Plays audio by spawning a command such as `ffplay` or `mpv`.
#[derive(Debug, Clone)]
pub struct CommandAudioSink {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandAudioSink {
    pub fn new(program: impl Into<String>, args: Vec<String>, scratch_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            scratch_dir,
        }
    }

    pub fn from_config(config: &AudioConfig, scratch_dir: PathBuf) -> Self {
        Self::new(
            config.player_command.clone(),
            config.player_args.clone(),
            scratch_dir,
        )
    }

    async fn materialize(&self, audio: &AudioRef) -> Result<(String, Option<PathBuf>), AudioError> {
        match audio {
            AudioRef::Url { url } => Ok((url.clone(), None)),
            AudioRef::Inline { data, .. } => {
                tokio::fs::create_dir_all(&self.scratch_dir)
                    .await
                    .map_err(|e| AudioError::PlaybackBlocked(e.to_string()))?;
                let path = self
                    .scratch_dir
                    .join(format!("{}.{}", Uuid::new_v4(), audio.extension()));
                tokio::fs::write(&path, data.as_ref())
                    .await
                    .map_err(|e| AudioError::PlaybackBlocked(e.to_string()))?;
                Ok((path.to_string_lossy().into_owned(), Some(path)))
            }
        }
    }
}

impl AudioSink for CommandAudioSink {
    async fn start(&self, audio: &AudioRef) -> Result<PlaybackHandle, AudioError> {
        let (source, scratch) = self.materialize(audio).await?;

        let spawned = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                if let Some(path) = scratch {
                    let _ = tokio::fs::remove_file(&path).await;
                }
                return Err(AudioError::PlaybackBlocked(format!(
                    "failed to launch {}: {}",
                    self.program, e
                )));
            }
        };

        let program = self.program.clone();
        let task = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::debug!(program = %program, status = %status, "Player exited with failure");
                }
                Err(e) => tracing::warn!(program = %program, error = %e, "Player wait failed"),
                Ok(_) => {}
            }
            if let Some(path) = scratch {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::debug!(path = %path.display(), error = %e, "Scratch audio not removed");
                }
            }
        });
        Ok(PlaybackHandle::from_task(task))
    }
}
