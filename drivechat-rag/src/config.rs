//! Configuration for the DriveChat pipeline.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// Content types that are eligible for indexing.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "application/vnd.google-apps.document",
    "application/vnd.google-apps.spreadsheet",
    "application/vnd.google-apps.presentation",
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Configuration parameters for indexing and answering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Name of the vector store collection.
    pub collection: String,
    /// Dimensionality of every stored and query vector.
    pub vector_size: usize,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Documents with fewer characters than this are skipped.
    pub min_content_chars: usize,
    /// Number of characters of a document kept in the stored payload.
    pub snippet_chars: usize,
    /// Maximum number of context characters inserted into the prompt.
    pub max_context_chars: usize,
    /// Optional cap on the characters of a document that get embedded.
    pub max_content_chars: Option<usize>,
    /// Number of results returned by a query.
    pub top_k: usize,
    /// Number of files indexed concurrently.
    pub index_concurrency: usize,
    /// Content types eligible for indexing.
    pub allowed_mime_types: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection: "drive_docs".to_string(),
            vector_size: 768,
            chunk_size: 30_000,
            min_content_chars: 20,
            snippet_chars: 3_000,
            max_context_chars: 8_000,
            max_content_chars: None,
            top_k: 3,
            index_concurrency: 1,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from defaults overlaid with environment variables.
    ///
    /// Reads `VECTOR_SIZE`, `TOP_K_RESULTS`, `DRIVECHAT_COLLECTION`,
    /// `DRIVECHAT_CHUNK_SIZE` and `DRIVECHAT_INDEX_CONCURRENCY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable is not a number or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(collection) = lookup("DRIVECHAT_COLLECTION") {
            builder = builder.collection(collection);
        }
        if let Some(size) = parse_var(&lookup, "VECTOR_SIZE")? {
            builder = builder.vector_size(size);
        }
        if let Some(k) = parse_var(&lookup, "TOP_K_RESULTS")? {
            builder = builder.top_k(k);
        }
        if let Some(size) = parse_var(&lookup, "DRIVECHAT_CHUNK_SIZE")? {
            builder = builder.chunk_size(size);
        }
        if let Some(workers) = parse_var(&lookup, "DRIVECHAT_INDEX_CONCURRENCY")? {
            builder = builder.index_concurrency(workers);
        }
        if let Some(metric) = lookup("DISTANCE_METRIC") {
            if !metric.eq_ignore_ascii_case("cosine") {
                warn!(metric, "only cosine distance is supported, ignoring DISTANCE_METRIC");
            }
        }
        builder.build()
    }

    /// Whether a content type is eligible for indexing.
    pub fn is_allowed(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime_type)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| RagError::ConfigError(format!("{key}={raw:?} is not a valid number: {e}"))),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the vector store collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the embedding dimensionality.
    pub fn vector_size(mut self, size: usize) -> Self {
        self.config.vector_size = size;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the minimum number of characters a document needs to be indexed.
    pub fn min_content_chars(mut self, chars: usize) -> Self {
        self.config.min_content_chars = chars;
        self
    }

    /// Set the number of characters stored as the document snippet.
    pub fn snippet_chars(mut self, chars: usize) -> Self {
        self.config.snippet_chars = chars;
        self
    }

    /// Set the maximum prompt context length in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Cap the number of characters of each document that get embedded.
    pub fn max_content_chars(mut self, chars: Option<usize>) -> Self {
        self.config.max_content_chars = chars;
        self
    }

    /// Set the number of results returned by a query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of files indexed concurrently.
    pub fn index_concurrency(mut self, workers: usize) -> Self {
        self.config.index_concurrency = workers;
        self
    }

    /// Replace the content-type allow-list.
    pub fn allowed_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_mime_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the collection name is empty or
    /// any size, limit or worker count is zero.
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection name must not be empty".to_string()));
        }
        for (name, value) in [
            ("vector_size", c.vector_size),
            ("chunk_size", c.chunk_size),
            ("snippet_chars", c.snippet_chars),
            ("max_context_chars", c.max_context_chars),
            ("top_k", c.top_k),
            ("index_concurrency", c.index_concurrency),
        ] {
            if value == 0 {
                return Err(RagError::ConfigError(format!("{name} must be greater than zero")));
            }
        }
        if c.max_content_chars == Some(0) {
            return Err(RagError::ConfigError(
                "max_content_chars must be greater than zero when set".to_string(),
            ));
        }
        Ok(self.config)
    }
}
