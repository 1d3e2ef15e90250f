pub mod chat;

pub mod settings {
    use serde::{Deserialize, Serialize};

    /// Models and tuning for the generation backend.
    ///
    /// The API key is optional here; the client falls back to the
    /// `GEMINI_API_KEY` environment variable when it is absent.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GenerationSettings {
        pub api_key: Option<String>,
        pub chat_model: String,  // e.g., "gemini-3-flash-preview"
        pub image_model: String, // e.g., "gemini-2.5-flash-image"
        pub video_model: String, // e.g., "veo-3.1-fast-generate-preview"
        pub request_timeout_secs: u64,
        pub video_poll_interval_secs: u64,
    }

    impl Default for GenerationSettings {
        fn default() -> Self {
            Self {
                api_key: None,
                chat_model: "gemini-3-flash-preview".into(),
                image_model: "gemini-2.5-flash-image".into(),
                video_model: "veo-3.1-fast-generate-preview".into(),
                request_timeout_secs: 120,
                video_poll_interval_secs: 8,
            }
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// One history entry handed to the generation backend.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "user" | "model"
        pub content: String,
    }

    /// Protocol between a streaming backend call and its consumer.
    ///
    /// Contract: a transport failure *before* the first delta is an `Err`
    /// from the call itself. Once streaming has begun, errors travel as
    /// `StreamChunk::Error` and the call returns `Ok(())`.
    #[derive(Debug, Clone)]
    pub enum StreamChunk {
        /// Incremental text fragment, applied in receipt order.
        Delta(String),
        /// Stream finished normally.
        Done,
        /// Stream broke after it started.
        Error(String),
    }
}
