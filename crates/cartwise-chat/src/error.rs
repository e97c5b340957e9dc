//! Error types for the conversation core.

use cartwise_core::error::CartwiseError;

/// Errors from the transport boundary and the conversation controller.
///
/// None of these reach a rendered message: the controller turns them into
/// the generic error reply or an inline notice.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ChatError::TransportFailure(format!("HTTP {}: {}", status, err)),
            None => ChatError::TransportFailure(err.to_string()),
        }
    }
}

impl From<ChatError> for CartwiseError {
    fn from(err: ChatError) -> Self {
        CartwiseError::Transport(err.to_string())
    }
}
