//! Recording mock generator for tests.

use std::sync::{Arc, Mutex, PoisonError};

use rfqscope_shared::{Result, RfqScopeError};

use crate::TextGenerator;

type Responder = dyn Fn(&str, f32) -> Result<String> + Send + Sync;

/// One recorded service call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub temperature: f32,
}

/// A [`TextGenerator`] that records every call in order and answers via a closure.
#[derive(Clone)]
pub struct MockGenerator {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Arc<Responder>,
    fail_marker: Option<String>,
}

impl std::fmt::Debug for MockGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGenerator")
            .field("calls", &self.call_count())
            .field("fail_marker", &self.fail_marker)
            .finish()
    }
}

impl MockGenerator {
    /// Answer every call with the responder's output.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, f32) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
            fail_marker: None,
        }
    }

    /// Answer every call with the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::new(move |_, _| Ok(response.clone()))
    }

    /// Fail any call whose prompt contains `marker`. The call is still recorded.
    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Every call so far, in the order they were made.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Recorded calls whose prompt contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.prompt.contains(needle))
            .collect()
    }
}

impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                prompt: prompt.to_string(),
                temperature,
            });

        if let Some(marker) = &self.fail_marker
            && prompt.contains(marker.as_str())
        {
            return Err(RfqScopeError::generation("mock service failure"));
        }

        (self.responder)(prompt, temperature)
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let mock = MockGenerator::new(|prompt, _| Ok(format!("echo: {prompt}")));
        assert_eq!(mock.generate("first", 0.0).await.unwrap(), "echo: first");
        assert_eq!(mock.generate("second", 0.3).await.unwrap(), "echo: second");

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].prompt, "first");
        assert_eq!(calls[1].temperature, 0.3);
    }

    #[tokio::test]
    async fn fails_on_marker() {
        let mock = MockGenerator::fixed("ok").failing_on("BOOM");
        assert!(mock.generate("fine", 0.0).await.is_ok());
        assert!(mock.generate("this goes BOOM", 0.0).await.is_err());
        assert_eq!(mock.call_count(), 2);
    }
}
