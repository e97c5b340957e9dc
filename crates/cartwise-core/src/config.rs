use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CartwiseError, Result};

/// Top-level configuration for the Cartwise client.
///
/// Loaded from `~/.cartwise/config.toml` by default. Every section falls back
/// to its defaults when missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartwiseConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl CartwiseConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed. Does not log,
    /// since the log level itself comes from this file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`CartwiseConfig::load`], but a missing file is `Ok(None)`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(toml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CartwiseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Absolute path of the persisted session file.
    pub fn session_store_path(&self) -> PathBuf {
        let file = Path::new(&self.session.store_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            expand_home(&self.general.data_dir).join(file)
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for the session file and temporary playback files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.cartwise".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote answering service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every endpoint and relative audio path is resolved against.
    pub base_url: String,
    /// Path of the multipart voice endpoint.
    pub voice_endpoint: String,
    /// Per-request timeout in seconds. `0` disables the timeout.
    pub request_timeout_secs: u64,
    /// Optional synthesized voice name forwarded on voice uploads.
    pub tts_voice: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            voice_endpoint: "/api/voice/chat".to_string(),
            request_timeout_secs: 0,
            tts_voice: None,
        }
    }
}

/// Client-side session persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session file, relative to `general.data_dir` unless absolute.
    pub store_file: String,
    /// Fixed key the identifier is stored under.
    pub key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_file: "session.json".to_string(),
            key: "session_id".to_string(),
        }
    }
}

/// Voice upload and playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// MIME type of the uploaded recording.
    pub mime_type: String,
    /// File name of the multipart `file` field.
    pub file_name: String,
    /// External program used to play audio references.
    pub player_command: String,
    /// Arguments passed before the audio source.
    pub player_args: Vec<String>,
    /// Start playing a voice reply as soon as it arrives.
    pub autoplay: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mime_type: "audio/webm".to_string(),
            file_name: "voice.webm".to_string(),
            player_command: "ffplay".to_string(),
            player_args: vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
            ],
            autoplay: true,
        }
    }
}

/// Conversation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Text of the synthetic assistant message appended on a failed exchange.
    pub error_text: String,
    /// User message text when a voice reply carries no transcript.
    pub voice_placeholder: String,
    /// Longest accepted typed query, in characters.
    pub max_query_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            error_text: "⚠️ Server error. Please try again.".to_string(),
            voice_placeholder: "🎤 (voice input)".to_string(),
            max_query_chars: 2000,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") || path.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let rest = path.get(2..).unwrap_or("");
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
