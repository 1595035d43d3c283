//! Generative model trait.

use async_trait::async_trait;

use crate::error::Result;

/// A generative language model that turns a prompt into free text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// An empty string is a valid response and means the model produced no text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
