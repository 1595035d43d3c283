//! Vector store trait for storing and searching document vectors.

use async_trait::async_trait;

use crate::document::{SearchResult, VectorPoint};
use crate::error::Result;

/// A storage backend for document vectors with cosine similarity search.
///
/// # Example
///
/// ```rust,ignore
/// use drivechat_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("drive_docs", 768).await?;
/// store.upsert("drive_docs", &points).await?;
/// let results = store.search("drive_docs", &query_vector, 3).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection using cosine distance. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()>;

    /// Search for the `limit` most similar points to `vector`.
    ///
    /// Returns results ordered by descending similarity score.
    async fn search(&self, collection: &str, vector: &[f32], limit: usize)
    -> Result<Vec<SearchResult>>;

    /// Number of points stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}
