//! Query engine: embed a question and retrieve the closest documents.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::document::SearchResult;
use crate::embedding::{Embedder, is_sentinel};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Embeds a query and searches one collection for the top-K documents.
#[derive(Clone)]
pub struct QueryEngine {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl QueryEngine {
    /// Create an engine searching `collection` in `store`.
    pub fn new(embedder: Embedder, store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self { embedder, store, collection: collection.into() }
    }

    /// Search for the `top_k` documents most similar to `query`.
    ///
    /// An empty query, or one whose embedding failed, yields no results
    /// rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the store search fails.
    pub async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await;
        if is_sentinel(&vector) {
            warn!("invalid query embedding");
            return Ok(Vec::new());
        }

        let mut results = self.store.search(&self.collection, &vector, top_k).await.map_err(|e| {
            match e {
                RagError::VectorStoreError { .. } => e,
                other => RagError::VectorStoreError {
                    backend: "search".into(),
                    message: other.to_string(),
                },
            }
        })?;

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        debug!(query_len = query.len(), result_count = results.len(), "query completed");
        Ok(results)
    }

    /// Like [`try_search`](Self::try_search) but logs failures and returns
    /// an empty list.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        match self.try_search(query, top_k).await {
            Ok(results) => {
                info!(result_count = results.len(), "search completed");
                results
            }
            Err(e) => {
                error!(collection = %self.collection, error = %e, "search error");
                Vec::new()
            }
        }
    }
}
