//! Conversation controller: wires session, transport, classifier, message
//! log and audio controllers together.
//!
//! Every failure is recovered here. A failed exchange becomes one synthetic
//! assistant message; microphone, empty-recording and playback problems
//! become inline notices. Overlapping submissions are not serialized: each
//! reply is appended when it arrives, so completion order decides the log
//! order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use cartwise_audio::{
    AudioCaptureController, AudioPlaybackController, AudioSink, CaptureOutcome, Microphone,
    PlaybackOutcome, StartOutcome,
};
use cartwise_core::config::{AudioConfig, CartwiseConfig, ChatConfig};
use cartwise_core::events::{ConversationEvent, Notice};
use cartwise_core::types::{
    AudioRef, ContentType, Message, MessageDraft, RecordingState, Role, Session,
};

use crate::classifier::classify;
use crate::error::ChatError;
use crate::session::SessionStore;
use crate::store::MessageStore;
use crate::transport::{Transport, VoicePayload, VoiceReply};

/// Capacity of the event channel. Slow subscribers miss old events.
const EVENT_CAPACITY: usize = 256;

/// Result of stopping a recording.
#[derive(Debug)]
pub enum VoiceOutcome {
    /// No recording was in progress.
    NotRecording,
    /// The recording held no audio. Nothing was sent or appended.
    NoAudioCaptured,
    /// The backend answered; both messages were appended.
    Answered {
        transcript: Message,
        reply: Message,
        /// Set when the reply audio was played automatically.
        playback: Option<PlaybackOutcome>,
    },
    /// The upload failed; the synthetic error message was appended.
    Failed(Message),
}

/// Result of the single record button.
#[derive(Debug)]
pub enum ToggleOutcome {
    Started(StartOutcome),
    Stopped(VoiceOutcome),
    /// Permission request or finalization in progress; nothing was done.
    Busy(RecordingState),
}

/// Decrements the pending counter when the request ends, even if the
/// request future is dropped.
struct PendingGuard<'a> {
    pending: &'a AtomicUsize,
    events: &'a broadcast::Sender<ConversationEvent>,
}

impl<'a> PendingGuard<'a> {
    fn begin(pending: &'a AtomicUsize, events: &'a broadcast::Sender<ConversationEvent>) -> Self {
        let now = pending.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = events.send(ConversationEvent::PendingChanged { pending: now });
        Self { pending, events }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let now = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        let _ = self
            .events
            .send(ConversationEvent::PendingChanged { pending: now });
    }
}

/// Coordinates one client's conversation.
pub struct ConversationController<T, M, S> {
    transport: T,
    sessions: SessionStore,
    store: Mutex<MessageStore>,
    capture: AudioCaptureController<M>,
    playback: AudioPlaybackController<S>,
    chat: ChatConfig,
    audio: AudioConfig,
    pending: AtomicUsize,
    notice: Mutex<Option<Notice>>,
    events: broadcast::Sender<ConversationEvent>,
}

impl<T, M, S> ConversationController<T, M, S>
where
    T: Transport,
    M: Microphone,
    S: AudioSink,
{
    pub fn new(
        transport: T,
        sessions: SessionStore,
        microphone: M,
        sink: S,
        config: &CartwiseConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let hook_events = events.clone();
        let capture = AudioCaptureController::new(microphone).with_transition_hook(Box::new(
            move |from: RecordingState, to: RecordingState| {
                let _ = hook_events.send(ConversationEvent::RecordingStateChanged { from, to });
            },
        ));

        Self {
            transport,
            sessions,
            store: Mutex::new(MessageStore::new()),
            capture,
            playback: AudioPlaybackController::new(sink),
            chat: config.chat.clone(),
            audio: config.audio.clone(),
            pending: AtomicUsize::new(0),
            notice: Mutex::new(None),
            events,
        }
    }

    /// Resolve the session and load its history.
    ///
    /// History failures are silent: the conversation simply starts empty.
    /// History that arrives after the user already produced messages is
    /// dropped.
    pub async fn init(&self) -> Session {
        let session = self.sessions.resolve();
        match self.transport.history(&session.id).await {
            Ok(history) => {
                let count = history.len();
                let applied = self.lock_store().hydrate(history);
                if applied {
                    tracing::info!(session_id = %session.id, count, "Loaded conversation history");
                    self.emit(ConversationEvent::LogHydrated { count });
                }
            }
            Err(e) => {
                tracing::debug!(session_id = %session.id, error = %e, "History unavailable");
            }
        }
        session
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Send a typed query.
    ///
    /// The user message is appended immediately. Returns the assistant
    /// message appended for this exchange (the answer or the generic error
    /// message), or `None` when the query was blank or too long.
    /// The query is sent and logged exactly as typed; trimming only decides
    /// whether it is blank or too long.
    pub async fn submit_text(&self, query: &str) -> Option<Message> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            tracing::debug!("Ignoring blank query");
            return None;
        }
        if trimmed.chars().count() > self.chat.max_query_chars {
            tracing::debug!(
                chars = trimmed.chars().count(),
                max = self.chat.max_query_chars,
                "Rejecting long query"
            );
            self.set_notice(Notice::QueryTooLong);
            return None;
        }

        let session_id = self.sessions.resolve().id;
        self.append(MessageDraft::user_text(query));

        let result = {
            let _pending = PendingGuard::begin(&self.pending, &self.events);
            self.transport.ask_product(query, &session_id).await
        };

        let draft = match result {
            Ok(reply) => classified_draft(reply.answer.as_deref(), None),
            Err(ChatError::MalformedReply(reason)) => {
                tracing::warn!(session_id = %session_id, reason = %reason, "Malformed answer");
                classified_draft(None, None)
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Text exchange failed");
                MessageDraft::assistant_text(self.chat.error_text.clone())
            }
        };
        Some(self.append(draft))
    }

    // =========================================================================
    // Voice
    // =========================================================================

    /// Start capturing from the microphone.
    pub async fn start_recording(&self) -> StartOutcome {
        let outcome = self.capture.start().await;
        match &outcome {
            StartOutcome::PermissionDenied => {
                tracing::warn!("Microphone permission denied");
                self.set_notice(Notice::PermissionDenied);
            }
            StartOutcome::DeviceUnavailable(reason) => {
                tracing::warn!(reason = %reason, "Microphone unavailable");
            }
            StartOutcome::AlreadyActive(state) => {
                tracing::debug!(state = %state, "Recording already active");
            }
            StartOutcome::Started | StartOutcome::Abandoned => {}
        }
        outcome
    }

    /// Stop capturing and send the recording.
    pub async fn stop_recording(&self) -> VoiceOutcome {
        match self.capture.stop() {
            None => VoiceOutcome::NotRecording,
            Some(CaptureOutcome::NoAudioCaptured) => {
                tracing::info!("Recording stopped with no audio");
                self.set_notice(Notice::NoAudioCaptured);
                VoiceOutcome::NoAudioCaptured
            }
            Some(CaptureOutcome::Completed(audio)) => {
                tracing::info!(
                    recording = %audio.session_id,
                    chunks = audio.chunk_count,
                    bytes = audio.bytes.len(),
                    "Recording finalized"
                );
                self.send_voice(audio.bytes).await
            }
        }
    }

    /// Start when idle, stop and send when capturing.
    pub async fn toggle_recording(&self) -> ToggleOutcome {
        match self.capture.state() {
            RecordingState::Idle => ToggleOutcome::Started(self.start_recording().await),
            RecordingState::Capturing => ToggleOutcome::Stopped(self.stop_recording().await),
            busy => ToggleOutcome::Busy(busy),
        }
    }

    /// Drop an in-progress recording without sending anything.
    pub fn abandon_recording(&self) -> bool {
        self.capture.abandon()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.capture.state()
    }

    async fn send_voice(&self, bytes: Vec<u8>) -> VoiceOutcome {
        let session_id = self.sessions.resolve().id;
        let payload = VoicePayload::new(bytes, &self.audio);

        let result = {
            let _pending = PendingGuard::begin(&self.pending, &self.events);
            self.transport.voice_chat(&session_id, payload).await
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(ChatError::MalformedReply(reason)) => {
                tracing::warn!(session_id = %session_id, reason = %reason, "Malformed voice reply");
                VoiceReply::default()
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Voice exchange failed");
                let message =
                    self.append(MessageDraft::assistant_text(self.chat.error_text.clone()));
                return VoiceOutcome::Failed(message);
            }
        };

        let transcript_text = reply
            .user_query
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| self.chat.voice_placeholder.clone());
        let (transcript, reply_message) = self.append_exchange(
            MessageDraft::user_text(transcript_text),
            classified_draft(reply.ai_response.as_deref(), reply.audio),
        );

        let playback = match (&reply_message.audio_ref, self.audio.autoplay) {
            (Some(audio), true) => Some(self.play_audio(audio).await),
            _ => None,
        };

        VoiceOutcome::Answered {
            transcript,
            reply: reply_message,
            playback,
        }
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Play the audio attached to a message.
    ///
    /// Returns `None` when the message does not exist or carries no audio.
    pub async fn play(&self, message_id: &str) -> Option<PlaybackOutcome> {
        let audio = self.lock_store().get(message_id)?.audio_ref.clone()?;
        Some(self.play_audio(&audio).await)
    }

    async fn play_audio(&self, audio: &AudioRef) -> PlaybackOutcome {
        let outcome = self.playback.play(audio).await;
        if !outcome.is_started() {
            self.set_notice(Notice::PlaybackBlocked);
        }
        outcome
    }

    // =========================================================================
    // Log and notices
    // =========================================================================

    /// Clear the conversation and any notice. The session is kept.
    pub fn reset(&self) {
        self.lock_store().reset();
        *self.lock_notice() = None;
        tracing::info!("Conversation cleared");
        self.emit(ConversationEvent::LogReset);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.lock_store().snapshot()
    }

    /// Whether a request is in flight (the loading indicator).
    pub fn is_pending(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Take the current inline notice, clearing it.
    pub fn take_notice(&self) -> Option<Notice> {
        self.lock_notice().take()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Session {
        self.sessions.resolve()
    }

    pub fn is_session_degraded(&self) -> bool {
        self.sessions.is_degraded()
    }

    fn append(&self, draft: MessageDraft) -> Message {
        let mut store = self.lock_store();
        self.append_locked(&mut store, draft)
    }

    /// Append a user message and its reply with no other append between them.
    fn append_exchange(&self, user: MessageDraft, reply: MessageDraft) -> (Message, Message) {
        let mut store = self.lock_store();
        let user = self.append_locked(&mut store, user);
        let reply = self.append_locked(&mut store, reply);
        (user, reply)
    }

    fn append_locked(&self, store: &mut MessageStore, draft: MessageDraft) -> Message {
        let message = store.append(draft);
        tracing::debug!(
            id = %message.id,
            role = %message.role,
            content_type = %message.content_type,
            "Message appended"
        );
        self.emit(ConversationEvent::MessageAppended(message.clone()));
        message
    }

    fn set_notice(&self, notice: Notice) {
        *self.lock_notice() = Some(notice);
        self.emit(ConversationEvent::Notice(notice));
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_store(&self) -> MutexGuard<'_, MessageStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_notice(&self) -> MutexGuard<'_, Option<Notice>> {
        self.notice.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Assistant draft for a reply. Images win, then attached audio, then text.
fn classified_draft(
    raw: Option<&str>,
    audio: Option<AudioRef>,
) -> MessageDraft {
    let classification = classify(raw);
    let content_type = match (classification.content_type, &audio) {
        (ContentType::Image, _) => ContentType::Image,
        (_, Some(_)) => ContentType::AudioReply,
        (other, None) => other,
    };
    MessageDraft {
        role: Some(Role::Assistant),
        content_type,
        text: Some(classification.text),
        image_url: classification.image_url,
        audio_ref: audio,
        ..MessageDraft::default()
    }
}

// =============================================================================
// Tests
// =============================================================================
