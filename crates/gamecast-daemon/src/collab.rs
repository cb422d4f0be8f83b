//! External request/response collaborators: commentary text and speech.
//!
//! Both are opaque to the pipeline. Implementations own their own
//! timeouts; see [`crate::openai::OpenAiClient`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("collaborator returned no content")]
    Empty,
}

/// Turns a prompt into commentary text.
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CollabError>;
}

/// Renders text as audio bytes in the given voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, CollabError>;
}
