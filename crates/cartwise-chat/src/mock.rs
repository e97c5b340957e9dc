//! Scriptable transport for tests and offline runs.
//!
//! Answers every query with an echo unless told otherwise. Individual
//! queries can be gated so a test decides exactly when each reply resolves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use cartwise_core::types::MessageDraft;

use crate::error::ChatError;
use crate::transport::{AskReply, Transport, VoicePayload, VoiceReply};

#[derive(Default)]
struct Script {
    answers: HashMap<String, Option<String>>,
    gates: HashMap<String, oneshot::Receiver<Result<AskReply, ChatError>>>,
    history: Option<Vec<MessageDraft>>,
    voice: Option<VoiceReply>,
    fail_all: bool,
    asked: Vec<(String, String)>,
    uploads: Vec<VoicePayload>,
}

/// In-memory [`Transport`]. Clones share the same script and records.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request fails with a transport failure.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.lock().fail_all = true;
        mock
    }

    /// Fixed answer for `query`. `None` simulates a reply without an answer.
    pub fn with_answer(self, query: &str, answer: Option<&str>) -> Self {
        self.lock()
            .answers
            .insert(query.to_string(), answer.map(str::to_string));
        self
    }

    pub fn with_history(self, history: Vec<MessageDraft>) -> Self {
        self.lock().history = Some(history);
        self
    }

    pub fn with_voice_reply(self, reply: VoiceReply) -> Self {
        self.lock().voice = Some(reply);
        self
    }

    /// Hold the reply to `query` until the returned sender fires.
    pub fn gate(&self, query: &str) -> oneshot::Sender<Result<AskReply, ChatError>> {
        let (tx, rx) = oneshot::channel();
        self.lock().gates.insert(query.to_string(), rx);
        tx
    }

    /// `(query, session_id)` of every text request, in call order.
    pub fn asked(&self) -> Vec<(String, String)> {
        self.lock().asked.clone()
    }

    /// Every voice payload received, in call order.
    pub fn uploads(&self) -> Vec<VoicePayload> {
        self.lock().uploads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn ask_product(&self, query: &str, session_id: &str) -> Result<AskReply, ChatError> {
        let gate = {
            let mut script = self.lock();
            script
                .asked
                .push((query.to_string(), session_id.to_string()));
            if script.fail_all {
                return Err(ChatError::TransportFailure("HTTP 500".to_string()));
            }
            if let Some(answer) = script.answers.get(query) {
                return Ok(AskReply {
                    answer: answer.clone(),
                });
            }
            script.gates.remove(query)
        };

        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ChatError::TransportFailure("gate dropped".to_string()))),
            None => Ok(AskReply {
                answer: Some(format!("echo: {}", query)),
            }),
        }
    }

    async fn history(&self, _session_id: &str) -> Result<Vec<MessageDraft>, ChatError> {
        let script = self.lock();
        if script.fail_all {
            return Err(ChatError::TransportFailure("HTTP 500".to_string()));
        }
        Ok(script.history.clone().unwrap_or_default())
    }

    async fn voice_chat(
        &self,
        _session_id: &str,
        payload: VoicePayload,
    ) -> Result<VoiceReply, ChatError> {
        let mut script = self.lock();
        script.uploads.push(payload);
        if script.fail_all {
            return Err(ChatError::TransportFailure("HTTP 500".to_string()));
        }
        Ok(script.voice.clone().unwrap_or_default())
    }
}
