//! Terminal input parsing and message rendering for the interactive loop.

use std::path::PathBuf;

use cartwise_core::events::Notice;
use cartwise_core::types::{Message, Role};

pub const HELP: &str = "\
Type a question and press Enter.
  /voice <file>  send a recorded clip as a voice query
  /play <n>      play the audio of message n
  /reset         clear the conversation
  /quit          leave";

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Query(String),
    Voice(PathBuf),
    Play(usize),
    Reset,
    Help,
    Quit,
    Empty,
    /// A slash command that was not understood, with the reason.
    Invalid(String),
}

impl ChatInput {
    /// Queries keep the line exactly as typed.
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim();
        if line.is_empty() {
            return ChatInput::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ChatInput::Query(raw.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match name {
            "voice" if rest.is_empty() => ChatInput::Invalid("usage: /voice <file>".to_string()),
            "voice" => ChatInput::Voice(PathBuf::from(rest)),
            "play" => match rest.parse::<usize>() {
                Ok(n) if n > 0 => ChatInput::Play(n),
                _ => ChatInput::Invalid("usage: /play <message number>".to_string()),
            },
            "reset" | "clear" => ChatInput::Reset,
            "help" => ChatInput::Help,
            "quit" | "exit" => ChatInput::Quit,
            other => ChatInput::Invalid(format!("unknown command /{}", other)),
        }
    }
}

/// Render one message. `number` is its 1-based position in the log.
pub fn render_message(number: usize, message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let mut out = format!("[{}] {}: {}", number, speaker, message.text.as_deref().unwrap_or(""));
    if let Some(ref url) = message.image_url {
        out.push_str(&format!("\n      image: {}", url));
    }
    if message.audio_ref.is_some() {
        out.push_str(&format!("\n      audio: /play {}", number));
    }
    out
}

pub fn render_notice(notice: Notice) -> String {
    format!("! {}", notice)
}

/// Loading indicator line for `pending` in-flight requests.
pub fn render_pending(pending: usize) -> Option<String> {
    match pending {
        0 => None,
        1 => Some("(waiting for a reply)".to_string()),
        n => Some(format!("(waiting for {} replies)", n)),
    }
}
