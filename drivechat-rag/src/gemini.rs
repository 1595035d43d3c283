//! Gemini embedding and generation providers over the Generative Language REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// The default Generative Language API endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";

/// The default dimensionality for `text-embedding-004`.
const DEFAULT_DIMENSIONS: usize = 768;

/// The default generation model.
const DEFAULT_GENERATION_MODEL: &str = "models/gemini-2.5-flash-lite";

/// Task type hint sent with embedding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Text that will be stored and searched against.
    RetrievalDocument,
    /// A search query.
    RetrievalQuery,
}

/// Shared HTTP plumbing for the Gemini providers.
#[derive(Clone)]
struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    fn new(api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("Gemini API key must not be empty".into()));
        }
        Ok(Self { http: reqwest::Client::new(), api_key, base_url: DEFAULT_BASE_URL.into() })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{model}:{method}", self.base_url.trim_end_matches('/'))
    }

    /// POST `body` and decode the response, mapping failures with `wrap`.
    async fn post<B, R>(&self, url: &str, body: &B, wrap: impl Fn(String) -> RagError) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| wrap(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(wrap(format!("API returned {status}: {detail}")));
        }

        response.json().await.map_err(|e| wrap(format!("failed to parse response: {e}")))
    }
}

/// Read the API key from `GOOGLE_API_KEY`, falling back to `GEMINI_API_KEY`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if neither variable is set.
pub fn api_key_from_env() -> Result<String> {
    std::env::var("GOOGLE_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .map_err(|_| RagError::ConfigError("Missing GOOGLE_API_KEY environment variable.".into()))
}

// ── API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embedding provider ──────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini `embedContent` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use drivechat_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new("your-api-key")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: GeminiClient,
    model: String,
    task_type: TaskType,
    dimensions: usize,
    output_dimensionality: Option<usize>,
}

impl GeminiEmbeddingProvider {
    /// Create a provider using `text-embedding-004` and document task type.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key.into())?,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            task_type: TaskType::RetrievalDocument,
            dimensions: DEFAULT_DIMENSIONS,
            output_dimensionality: None,
        })
    }

    /// Set the model name (e.g. `models/gemini-embedding-001`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the task type used for embedding requests.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Request truncated output vectors of `dims` components.
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.output_dimensionality = Some(dims);
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "Gemini", model = %self.model, text_len = text.len(), "embedding text");

        let request = EmbedContentRequest {
            model: &self.model,
            content: Content { role: None, parts: vec![Part { text }] },
            task_type: self.task_type,
            output_dimensionality: self.output_dimensionality,
        };
        let url = self.client.endpoint(&self.model, "embedContent");

        let response: EmbedContentResponse = self
            .client
            .post(&url, &request, |message| RagError::EmbeddingError {
                provider: "Gemini".into(),
                message,
            })
            .await
            .inspect_err(|e| error!(provider = "Gemini", error = %e, "embedding request failed"))?;

        Ok(response.embedding.values)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Text generator ──────────────────────────────────────────────────

/// A [`TextGenerator`] backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
}

impl GeminiGenerator {
    /// Create a generator using `gemini-2.5-flash-lite`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self { client: GeminiClient::new(api_key.into())?, model: DEFAULT_GENERATION_MODEL.into() })
    }

    /// Set the model name. A bare name gets the `models/` prefix.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = if model.starts_with("models/") { model } else { format!("models/{model}") };
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "Gemini", model = %self.model, prompt_len = prompt.len(), "generating");

        let request = GenerateContentRequest {
            contents: vec![Content { role: Some("user"), parts: vec![Part { text: prompt }] }],
        };
        let url = self.client.endpoint(&self.model, "generateContent");

        let response: GenerateContentResponse = self
            .client
            .post(&url, &request, |message| RagError::GenerationError {
                provider: "Gemini".into(),
                message,
            })
            .await
            .inspect_err(|e| error!(provider = "Gemini", error = %e, "generation request failed"))?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_api_key_is_a_config_error() {
        assert!(matches!(GeminiEmbeddingProvider::new(" "), Err(RagError::ConfigError(_))));
        assert!(matches!(GeminiGenerator::new(""), Err(RagError::ConfigError(_))));
    }

    #[tokio::test]
    async fn embeds_through_embed_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/text-embedding-004:embedContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "taskType": "RETRIEVAL_DOCUMENT",
                "content": {"parts": [{"text": "hello"}]}
            })))
            .with_status(200)
            .with_body(r#"{"embedding":{"values":[0.1,0.2,0.3]}}"#)
            .create_async()
            .await;

        let provider = GeminiEmbeddingProvider::new("test-key").unwrap().with_base_url(server.url());
        let vector = provider.embed("hello").await.unwrap();

        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn embedding_api_error_carries_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/text-embedding-004:embedContent")
            .with_status(429)
            .with_body(r#"{"error":{"message":"quota exhausted"}}"#)
            .create_async()
            .await;

        let provider = GeminiEmbeddingProvider::new("k").unwrap().with_base_url(server.url());
        let err = provider.embed("hello").await.unwrap_err();

        assert!(matches!(err, RagError::EmbeddingError { .. }));
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[tokio::test]
    async fn generates_from_first_candidate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.5-flash-lite:generateContent")
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"It is "},{"text":"a test."}]}}]}"#,
            )
            .create_async()
            .await;

        let generator = GeminiGenerator::new("k").unwrap().with_base_url(server.url());
        assert_eq!(generator.generate("prompt").await.unwrap(), "It is a test.");
    }

    #[tokio::test]
    async fn no_candidates_is_empty_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.5-flash-lite:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let generator = GeminiGenerator::new("k").unwrap().with_base_url(server.url());
        assert_eq!(generator.generate("prompt").await.unwrap(), "");
    }
}
