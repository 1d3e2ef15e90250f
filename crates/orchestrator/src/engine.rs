//! The single-flight generation engine and its streaming reducer.
//!
//! A request walks `Idle -> PendingSubmit -> {Streaming | AwaitingMedia}`
//! and always lands back on `Idle`. The user message and its response
//! placeholder are appended before any network call; everything after that
//! point mutates the placeholder in place and must tolerate the target
//! session being deleted between awaits.

use anyhow::anyhow;
use parking_lot::Mutex;
use providers::GenerationBackend;
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::chat::{
    ChatSession, Message, MessageKind, MessagePatch, GENERATION_FAILED_NOTICE, IMAGE_READY_NOTICE,
    VIDEO_READY_NOTICE,
};
use std::sync::Arc;
use store::SessionStore;
use tokio::sync::mpsc;

/// Where the in-flight request currently is. Every phase except `Idle`
/// holds the single-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    PendingSubmit,
    Streaming,
    AwaitingMedia,
}

/// How a `generate` submission ended. A `Failed` run already wrote the
/// failure notice into the placeholder; nothing is raised to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    Completed,
    Failed,
    Ignored,
}

pub struct Orchestrator {
    store: Arc<Mutex<SessionStore>>,
    backend: Arc<dyn GenerationBackend>,
    phase: Mutex<RequestPhase>,
    status: Mutex<Option<String>>,
}

impl Orchestrator {
    pub fn new(store: SessionStore, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            backend,
            phase: Mutex::new(RequestPhase::Idle),
            status: Mutex::new(None),
        }
    }

    /// Shared handle to the store, for session management calls from the
    /// presentation layer (new chat, select, delete, purge).
    pub fn store(&self) -> Arc<Mutex<SessionStore>> {
        self.store.clone()
    }

    pub fn sessions_snapshot(&self) -> Vec<ChatSession> {
        self.store.lock().sessions().to_vec()
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.store.lock().current_id().map(str::to_string)
    }

    pub fn is_processing(&self) -> bool {
        *self.phase.lock() != RequestPhase::Idle
    }

    pub fn phase(&self) -> RequestPhase {
        *self.phase.lock()
    }

    /// Transient human-readable status (video generation phases); cleared
    /// when the request finishes either way.
    pub fn status_message(&self) -> Option<String> {
        self.status.lock().clone()
    }

    /// Run one generation request to completion or failure.
    ///
    /// A whitespace-only prompt, or a submission while another request is
    /// in flight, is ignored. Backend failures are written into the
    /// response placeholder as a fixed notice and never escape.
    pub async fn generate(
        &self,
        prompt: &str,
        kind: MessageKind,
        shadow_mode: bool,
    ) -> GenerateOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return GenerateOutcome::Ignored;
        }
        if !self.try_begin() {
            return GenerateOutcome::Ignored;
        }

        // Everything before the first await happens under one store lock:
        // the pair is visible (and persisted) before any network call.
        let (session_id, placeholder_id, history, first_exchange) = {
            let mut store = self.store.lock();
            let session_id = match store.current_id() {
                Some(id) => id.to_string(),
                None => store.create_session(shadow_mode),
            };
            let history: Vec<ChatMessage> = store
                .get(&session_id)
                .map(|s| {
                    s.messages
                        .iter()
                        .map(|m| ChatMessage {
                            role: m.role.as_str().to_string(),
                            content: m.content.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            let first_exchange = history.is_empty();

            let user = Message::user(prompt, kind);
            let placeholder = Message::placeholder(kind);
            let placeholder_id = placeholder.id.clone();
            store.append_message_pair(&session_id, user, placeholder);
            (session_id, placeholder_id, history, first_exchange)
        };

        let outcome = match kind {
            MessageKind::Text => {
                self.run_text(
                    &session_id,
                    &placeholder_id,
                    prompt,
                    history,
                    shadow_mode,
                    first_exchange,
                )
                .await
            }
            MessageKind::Image => self.run_image(&session_id, &placeholder_id, prompt).await,
            MessageKind::Video => self.run_video(&session_id, &placeholder_id, prompt).await,
        };

        self.finish();
        outcome
    }

    async fn run_text(
        &self,
        session_id: &str,
        placeholder_id: &str,
        prompt: &str,
        history: Vec<ChatMessage>,
        shadow_mode: bool,
        first_exchange: bool,
    ) -> GenerateOutcome {
        self.set_phase(RequestPhase::Streaming);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let prompt_owned = prompt.to_string();
        let call = tokio::spawn(async move {
            backend
                .stream_chat(history, &prompt_owned, shadow_mode, tx)
                .await
        });

        let mut accumulated = String::new();
        let mut stream_error: Option<String> = None;
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Delta(fragment) => {
                    accumulated.push_str(&fragment);
                    // Full replacement each time: a dropped update can never
                    // duplicate text, only delay it.
                    self.store.lock().update_message(
                        session_id,
                        placeholder_id,
                        MessagePatch::content(accumulated.clone()),
                    );
                }
                StreamChunk::Done => break,
                StreamChunk::Error(e) => {
                    stream_error = Some(e);
                    break;
                }
            }
        }

        match call.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if stream_error.is_none() {
                    stream_error = Some(format!("{e:#}"));
                }
            }
            Err(e) => {
                if stream_error.is_none() {
                    stream_error = Some(format!("stream task failed: {e}"));
                }
            }
        }

        if let Some(e) = stream_error {
            tracing::error!("text generation failed: {e}");
            self.store.lock().update_message(
                session_id,
                placeholder_id,
                MessagePatch::content(GENERATION_FAILED_NOTICE),
            );
            return GenerateOutcome::Failed;
        }

        if first_exchange && !shadow_mode {
            self.spawn_title_rename(session_id.to_string(), prompt.to_string());
        }
        GenerateOutcome::Completed
    }

    async fn run_image(
        &self,
        session_id: &str,
        placeholder_id: &str,
        prompt: &str,
    ) -> GenerateOutcome {
        self.set_phase(RequestPhase::AwaitingMedia);

        match self.backend.generate_image(prompt).await {
            Ok(url) => {
                self.store.lock().update_message(
                    session_id,
                    placeholder_id,
                    MessagePatch::media_ready(url, IMAGE_READY_NOTICE),
                );
                GenerateOutcome::Completed
            }
            Err(e) => {
                tracing::error!("image generation failed: {e:#}");
                self.store.lock().update_message(
                    session_id,
                    placeholder_id,
                    MessagePatch::content(GENERATION_FAILED_NOTICE),
                );
                GenerateOutcome::Failed
            }
        }
    }

    async fn run_video(
        &self,
        session_id: &str,
        placeholder_id: &str,
        prompt: &str,
    ) -> GenerateOutcome {
        self.set_phase(RequestPhase::AwaitingMedia);

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let prompt_owned = prompt.to_string();
        let call =
            tokio::spawn(async move { backend.generate_video(&prompt_owned, progress_tx).await });

        // The progress channel closes when the backend call returns, so
        // this loop also paces the wait.
        while let Some(phase) = progress_rx.recv().await {
            *self.status.lock() = Some(phase);
        }

        let result = match call.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("video task failed: {e}")),
        };

        match result {
            Ok(url) => {
                self.store.lock().update_message(
                    session_id,
                    placeholder_id,
                    MessagePatch::media_ready(url, VIDEO_READY_NOTICE),
                );
                GenerateOutcome::Completed
            }
            Err(e) => {
                tracing::error!("video generation failed: {e:#}");
                self.store.lock().update_message(
                    session_id,
                    placeholder_id,
                    MessagePatch::content(GENERATION_FAILED_NOTICE),
                );
                GenerateOutcome::Failed
            }
        }
    }

    /// Fire-and-forget title summarization after a session's first
    /// exchange. The backend call never fails; a vanished session makes
    /// the rename a no-op.
    fn spawn_title_rename(&self, session_id: String, prompt: String) {
        let backend = self.backend.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let title = backend.summarize_title(&prompt).await;
            store.lock().rename_session(&session_id, &title);
        });
    }

    fn try_begin(&self) -> bool {
        let mut phase = self.phase.lock();
        if *phase != RequestPhase::Idle {
            return false;
        }
        *phase = RequestPhase::PendingSubmit;
        true
    }

    fn set_phase(&self, next: RequestPhase) {
        *self.phase.lock() = next;
    }

    fn finish(&self) {
        *self.phase.lock() = RequestPhase::Idle;
        *self.status.lock() = None;
    }
}
