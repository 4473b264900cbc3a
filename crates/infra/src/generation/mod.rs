//! External text-generation clients.
//!
//! The pipeline only sees [`GenerationClient`]: prompt in, raw text out. No
//! schema is enforced on the response; parsing is the caller's job.

mod gemini;
mod scripted;

pub use gemini::GeminiClient;
pub use scripted::ScriptedGenerationClient;

use async_trait::async_trait;
use thiserror::Error;

/// The generation call could not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError>;
}

#[async_trait]
impl<C> GenerationClient for std::sync::Arc<C>
where
    C: GenerationClient + ?Sized,
{
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        (**self).generate(prompt).await
    }
}
