//! Answer synthesis from retrieved snippets.

use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::truncate_chars;
use crate::document::SearchResult;
use crate::error::Result;
use crate::generation::TextGenerator;

/// Returned when the model produces no text.
pub const NO_ANSWER: &str = "Could not generate a clear answer.";

/// Returned when the model call fails.
pub const GENERATION_FAILED: &str = "An error occurred while generating the answer.";

/// Join results into a context block: `"From {name}:\n{content}"` separated by blank lines.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("From {}:\n{}", r.name, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds bounded prompts and turns model output into an answer string.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
    max_context_chars: usize,
}

impl AnswerSynthesizer {
    /// Create a synthesizer truncating context to `max_context_chars` characters.
    pub fn new(generator: Arc<dyn TextGenerator>, max_context_chars: usize) -> Self {
        Self { generator, max_context_chars }
    }

    /// Fill the prompt template with the truncated context and the question.
    pub fn build_prompt(&self, query: &str, context: &str) -> String {
        let context = truncate_chars(context, self.max_context_chars);
        format!(
            "\nBased on the following context, answer the question clearly and precisely.\n\
             If the answer is not found in the context, say that the information is not available.\n\
             \n\
             Context:\n\
             {context}\n\
             \n\
             Question: {query}\n"
        )
    }

    /// Generate an answer, returning the trimmed model text.
    ///
    /// An empty model response is returned as an empty string; use
    /// [`synthesize`](Self::synthesize) for the fallback behaviour.
    pub async fn try_synthesize(&self, query: &str, context: &str) -> Result<String> {
        let prompt = self.build_prompt(query, context);
        let text = self.generator.generate(&prompt).await?;
        Ok(text.trim().to_string())
    }

    /// Generate an answer, substituting fixed fallback strings for empty
    /// output and failures.
    pub async fn synthesize(&self, query: &str, context: &str) -> String {
        match self.try_synthesize(query, context).await {
            Ok(text) if text.is_empty() => NO_ANSWER.to_string(),
            Ok(text) => {
                info!(answer_len = text.len(), "generated answer");
                text
            }
            Err(e) => {
                error!(error = %e, "error generating answer");
                GENERATION_FAILED.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::error::RagError;

    #[derive(Default)]
    struct ScriptedGenerator {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().await.push(prompt.to_string());
            self.reply.clone().ok_or_else(|| RagError::GenerationError {
                provider: "scripted".into(),
                message: "quota exceeded".into(),
            })
        }
    }

    fn result(name: &str, content: &str) -> SearchResult {
        SearchResult { id: 1, name: name.into(), content: content.into(), score: 0.8 }
    }

    #[test]
    fn context_joins_sources_with_blank_lines() {
        let context = build_context(&[result("a.txt", "alpha"), result("b.txt", "beta")]);
        assert_eq!(context, "From a.txt:\nalpha\n\nFrom b.txt:\nbeta");
    }

    #[test]
    fn prompt_truncates_context() {
        let synth = AnswerSynthesizer::new(Arc::new(ScriptedGenerator::default()), 5);
        let prompt = synth.build_prompt("why?", "0123456789");
        assert!(prompt.contains("Context:\n01234\n"));
        assert!(!prompt.contains("56789"));
        assert!(prompt.contains("Question: why?"));
        assert!(prompt.contains("say that the information is not available"));
    }

    #[tokio::test]
    async fn answer_is_trimmed() {
        let generator = Arc::new(ScriptedGenerator {
            reply: Some("  It is a test.\n".into()),
            ..Default::default()
        });
        let synth = AnswerSynthesizer::new(generator.clone(), 8000);
        assert_eq!(synth.synthesize("q", "ctx").await, "It is a test.");
        assert_eq!(generator.prompts.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_output_falls_back() {
        let generator =
            Arc::new(ScriptedGenerator { reply: Some("   ".into()), ..Default::default() });
        let synth = AnswerSynthesizer::new(generator, 8000);
        assert_eq!(synth.synthesize("q", "ctx").await, NO_ANSWER);
    }

    #[tokio::test]
    async fn failure_returns_fixed_error_text() {
        let synth = AnswerSynthesizer::new(Arc::new(ScriptedGenerator::default()), 8000);
        assert_eq!(synth.synthesize("q", "ctx").await, GENERATION_FAILED);
    }
}
