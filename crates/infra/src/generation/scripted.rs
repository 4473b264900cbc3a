use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerationClient, TransportError};

/// Replays queued responses in order, for tests/dev.
///
/// Once the queue is drained every call returns the fallback (a transport
/// error unless one was set). Prompts are recorded for inspection.
#[derive(Debug, Default)]
pub struct ScriptedGenerationClient {
    queue: Mutex<VecDeque<Result<String, TransportError>>>,
    fallback: Option<Result<String, TransportError>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.push(Err(error))
    }

    /// Answer every unscripted call with `text`.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(Ok(text.into()));
        self
    }

    fn push(self, item: Result<String, TransportError>) -> Self {
        self.queue.lock().unwrap_or_else(|p| p.into_inner()).push_back(item);
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());

        let next = self.queue.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
        match next {
            Some(item) => item,
            None => self
                .fallback
                .clone()
                .unwrap_or_else(|| Err(TransportError::Request("no scripted response left".to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_falls_back() {
        let client = ScriptedGenerationClient::new()
            .respond("first")
            .fail(TransportError::Http { status: 500, body: "boom".to_string() })
            .otherwise("again");

        assert_eq!(client.generate("a").await.unwrap(), "first");
        assert!(client.generate("b").await.is_err());
        assert_eq!(client.generate("c").await.unwrap(), "again");
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn drained_queue_without_fallback_fails() {
        let client = ScriptedGenerationClient::new();
        assert!(matches!(client.generate("x").await, Err(TransportError::Request(_))));
    }
}
