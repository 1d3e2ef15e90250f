//! Generation Service Client - the Gemini backend behind a trait
//!
//! The orchestrator consumes exactly four operations: streaming chat,
//! image generation, long-running video generation, and best-effort title
//! summarization. They are grouped into [`GenerationBackend`] so tests can
//! substitute a scripted fake for the real HTTP client.

pub mod gemini;
pub mod sse;

pub use gemini::GeminiClient;

use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::{ChatMessage, StreamChunk};
use tokio::sync::mpsc::UnboundedSender;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Stream a chat completion for `prompt` given the prior `history`.
    ///
    /// Fragments are pushed through `tx` in order as [`StreamChunk::Delta`],
    /// then [`StreamChunk::Done`]. A failure before the first delta is an
    /// `Err`; after that, a [`StreamChunk::Error`] and `Ok(())`.
    /// `shadow_mode` selects the alternate system persona.
    async fn stream_chat(
        &self,
        history: Vec<ChatMessage>,
        prompt: &str,
        shadow_mode: bool,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;

    /// One-shot image generation; resolves to a `data:` URI.
    async fn generate_image(&self, prompt: &str) -> Result<String>;

    /// Long-running video generation. Human-readable phase descriptions are
    /// pushed through `progress` while the remote operation is pending;
    /// resolves to a download URI.
    async fn generate_video(
        &self,
        prompt: &str,
        progress: UnboundedSender<String>,
    ) -> Result<String>;

    /// Short title for a session's first prompt. Best-effort: never fails,
    /// falls back to the default title.
    async fn summarize_title(&self, prompt: &str) -> String;
}
