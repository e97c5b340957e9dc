//! CLI argument definitions for the Cartwise terminal client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cartwise_core::config::{expand_home, CartwiseConfig};

const CONFIG_ENV: &str = "CARTWISE_CONFIG";
const BACKEND_URL_ENV: &str = "CARTWISE_BACKEND_URL";

/// Cartwise - talk to the shopping assistant by text or voice.
#[derive(Parser, Debug)]
#[command(name = "cartwise", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the assistant backend.
    #[arg(short = 'b', long = "backend-url")]
    pub backend_url: Option<String>,

    /// Directory for the session file and temporary audio.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask one question and print the reply.
    Ask {
        /// The question. Multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Print the stored conversation for this session.
    History,
    /// Send a recorded clip as a voice query.
    Voice {
        /// Audio file to upload.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Interactive conversation (default).
    Chat,
    /// Write the effective configuration to the config file.
    Init {
        /// Replace an existing config file.
        #[arg(long)]
        force: bool,
    },
}

impl CliArgs {
    /// The subcommand to run. Defaults to the interactive chat.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CARTWISE_CONFIG env var > ~/.cartwise/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.config_path_with(std::env::var(CONFIG_ENV).ok())
    }

    fn config_path_with(&self, env: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env.filter(|p| !p.is_empty()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value > "info".
    /// `RUST_LOG` still overrides the result when the subscriber is built.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if !config_level.trim().is_empty() {
            return config_level.to_string();
        }
        "info".to_string()
    }

    /// Apply flag and environment overrides to a loaded config.
    pub fn apply_overrides(&self, config: &mut CartwiseConfig) {
        self.apply_overrides_with(config, std::env::var(BACKEND_URL_ENV).ok());
    }

    fn apply_overrides_with(&self, config: &mut CartwiseConfig, backend_env: Option<String>) {
        if let Some(ref url) = self.backend_url {
            config.backend.base_url = url.clone();
        } else if let Some(url) = backend_env.filter(|u| !u.is_empty()) {
            config.backend.base_url = url;
        }
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    expand_home("~/.cartwise/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_command_is_chat() {
        assert_eq!(parse(&["cartwise"]).command(), Command::Chat);
    }

    #[test]
    fn test_ask_joins_words() {
        let args = parse(&["cartwise", "ask", "show", "me", "red", "shoes"]);
        match args.command() {
            Command::Ask { query } => assert_eq!(query.join(" "), "show me red shoes"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ask_requires_query() {
        assert!(CliArgs::try_parse_from(["cartwise", "ask"]).is_err());
    }

    #[test]
    fn test_voice_file() {
        let args = parse(&["cartwise", "voice", "--file", "clip.webm"]);
        assert_eq!(
            args.command(),
            Command::Voice {
                file: PathBuf::from("clip.webm")
            }
        );
    }

    #[test]
    fn test_init_force_flag() {
        assert_eq!(
            parse(&["cartwise", "init"]).command(),
            Command::Init { force: false }
        );
        assert_eq!(
            parse(&["cartwise", "init", "--force"]).command(),
            Command::Init { force: true }
        );
    }

    #[test]
    fn test_config_path_priority() {
        let flagged = parse(&["cartwise", "-c", "/tmp/a.toml"]);
        assert_eq!(
            flagged.config_path_with(Some("/tmp/b.toml".to_string())),
            PathBuf::from("/tmp/a.toml")
        );

        let plain = parse(&["cartwise"]);
        assert_eq!(
            plain.config_path_with(Some("/tmp/b.toml".to_string())),
            PathBuf::from("/tmp/b.toml")
        );
        assert!(plain
            .config_path_with(None)
            .ends_with(".cartwise/config.toml"));
    }

    #[test]
    fn test_log_level_priority() {
        assert_eq!(parse(&["cartwise", "-l", "debug"]).resolve_log_level("warn"), "debug");
        assert_eq!(parse(&["cartwise"]).resolve_log_level("warn"), "warn");
        assert_eq!(parse(&["cartwise"]).resolve_log_level(""), "info");
    }

    #[test]
    fn test_backend_url_priority() {
        let mut config = CartwiseConfig::default();
        parse(&["cartwise", "-b", "http://flag:1"])
            .apply_overrides_with(&mut config, Some("http://env:2".to_string()));
        assert_eq!(config.backend.base_url, "http://flag:1");

        let mut config = CartwiseConfig::default();
        parse(&["cartwise"]).apply_overrides_with(&mut config, Some("http://env:2".to_string()));
        assert_eq!(config.backend.base_url, "http://env:2");

        let mut config = CartwiseConfig::default();
        parse(&["cartwise"]).apply_overrides_with(&mut config, None);
        assert_eq!(config.backend.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = CartwiseConfig::default();
        parse(&["cartwise", "-d", "/tmp/cw"]).apply_overrides_with(&mut config, None);
        assert_eq!(config.general.data_dir, "/tmp/cw");
    }
}
