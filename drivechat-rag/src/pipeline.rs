//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] wires a [`DocumentIndexer`], a [`QueryEngine`] and an
//! [`AnswerSynthesizer`] over a shared [`VectorStore`] and embedding
//! provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use drivechat_rag::{RagPipeline, RagConfig, InMemoryVectorStore, FixedSizeChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .text_generator(Arc::new(my_model))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.initialize().await?;
//! pipeline.index(drive).await?;
//! if let Some(answer) = pipeline.ask("What is in my notes?").await {
//!     println!("{}", answer.text);
//! }
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::answer::{AnswerSynthesizer, build_context};
use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::{Answer, SearchResult};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;
use crate::indexer::{DocumentIndexer, IndexReport, ProgressFn};
use crate::query::QueryEngine;
use crate::storage::FileStorage;
use crate::vectorstore::VectorStore;

/// Message shown when a question matches no stored document.
pub const NO_RESULTS: &str = "No relevant information found.";

/// The RAG pipeline orchestrator.
///
/// Coordinates indexing (list → fetch → chunk → embed → average → store) and
/// question answering (embed → search → synthesize). Construct one via
/// [`RagPipeline::builder()`].
#[derive(Clone)]
pub struct RagPipeline {
    config: RagConfig,
    vector_store: Arc<dyn VectorStore>,
    indexer: DocumentIndexer,
    query_engine: QueryEngine,
    synthesizer: AnswerSynthesizer,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Create the configured collection if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the vector store operation fails.
    pub async fn initialize(&self) -> Result<()> {
        let name = self.config.collection.as_str();
        self.vector_store.create_collection(name, self.config.vector_size).await.map_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
            RagError::PipelineError(format!("failed to create collection '{name}': {e}"))
        })
    }

    /// Index every file in `storage`.
    ///
    /// # Errors
    ///
    /// Only a failed file listing is returned; per-file problems are
    /// recorded in the [`IndexReport`].
    pub async fn index(&self, storage: Arc<dyn FileStorage>) -> Result<IndexReport> {
        self.indexer.index_all(storage).await
    }

    /// Index every file in `storage`, reporting progress as each file starts.
    pub async fn index_with_progress(
        &self,
        storage: Arc<dyn FileStorage>,
        progress: ProgressFn,
    ) -> Result<IndexReport> {
        self.indexer.clone().with_progress(progress).index_all(storage).await
    }

    /// Retrieve the top-K documents for `query`. Failures yield an empty list.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.query_engine.search(query, self.config.top_k).await
    }

    /// Answer `query` from the indexed documents.
    ///
    /// Returns `None` when no document matched, in which case callers show
    /// [`NO_RESULTS`].
    pub async fn ask(&self, query: &str) -> Option<Answer> {
        let sources = self.search(query).await;
        if sources.is_empty() {
            info!("no relevant documents for query");
            return None;
        }

        let context = build_context(&sources);
        let text = self.synthesizer.synthesize(query, &context).await;
        Some(Answer { text, sources })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider, text generator and vector store are required. The
/// config defaults to [`RagConfig::default()`] and the chunker to a
/// [`FixedSizeChunker`] of `config.chunk_size` characters.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    query_embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for documents (and queries, unless
    /// [`query_embedding_provider`](Self::query_embedding_provider) is set).
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Use a separate embedding provider for queries.
    pub fn query_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.query_embedding_provider = Some(provider);
        self
    }

    /// Set the generative model.
    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or a
    /// provider's dimensionality disagrees with `config.vector_size`.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let text_generator = self
            .text_generator
            .ok_or_else(|| RagError::ConfigError("text_generator is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| Arc::new(FixedSizeChunker::new(config.chunk_size)));
        let query_provider = self.query_embedding_provider.unwrap_or_else(|| embedding_provider.clone());

        for provider in [&embedding_provider, &query_provider] {
            if provider.dimensions() != config.vector_size {
                return Err(RagError::ConfigError(format!(
                    "embedding provider produces {} dimensions but vector_size is {}",
                    provider.dimensions(),
                    config.vector_size
                )));
            }
        }

        let embedder = Embedder::new(embedding_provider, config.vector_size);
        let query_embedder = Embedder::new(query_provider, config.vector_size);
        let indexer =
            DocumentIndexer::new(config.clone(), embedder, chunker, vector_store.clone());
        let query_engine =
            QueryEngine::new(query_embedder, vector_store.clone(), config.collection.clone());
        let synthesizer = AnswerSynthesizer::new(text_generator, config.max_context_chars);

        Ok(RagPipeline { config, vector_store, indexer, query_engine, synthesizer })
    }
}
