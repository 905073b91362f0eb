//! Text-generation service contract and its HTTP implementation.
//!
//! Every stage of the pipeline talks to the service through [`TextGenerator`].
//! [`OpenAiClient`] speaks the OpenAI-compatible chat completions protocol;
//! the `mock` feature adds a recording [`mock::MockGenerator`] for tests.

mod client;
mod retry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::future::Future;

use rfqscope_shared::Result;

pub use client::OpenAiClient;

/// A service that turns a prompt into text.
///
/// Implementations must be safe to share across concurrently running role
/// tasks. A call either yields the generated text or fails; there is no
/// partial output.
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt` at the given sampling temperature.
    fn generate(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Model identifier, used to namespace cached generations.
    fn model(&self) -> &str;
}
