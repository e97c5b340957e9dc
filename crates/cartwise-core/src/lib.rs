//! Shared domain types, configuration and errors for the Cartwise shopping
//! assistant client.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::CartwiseConfig;
pub use error::{CartwiseError, Result};
pub use events::{ConversationEvent, Notice};
pub use types::*;
