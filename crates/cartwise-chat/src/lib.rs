//! Conversation core for Cartwise.
//!
//! Session identity, the message log, reply classification, the HTTP
//! boundary to the assistant backend, and the controller that ties them to
//! the audio crate's capture and playback controllers.

pub mod classifier;
pub mod controller;
pub mod error;
pub mod mock;
pub mod session;
pub mod store;
pub mod transport;

pub use classifier::{classify, Classification, NO_REPLY_TEXT};
pub use controller::{ConversationController, ToggleOutcome, VoiceOutcome};
pub use error::ChatError;
pub use mock::MockTransport;
pub use session::{
    FileSessionBackend, MemorySessionBackend, SessionBackend, SessionStore,
    UnavailableSessionBackend,
};
pub use store::MessageStore;
pub use transport::{AskReply, HttpTransport, Transport, VoicePayload, VoiceReply};
