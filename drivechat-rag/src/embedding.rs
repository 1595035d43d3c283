//! Embedding provider trait and the sentinel-producing [`Embedder`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Wraps an [`EmbeddingProvider`] and converts every failure into the
/// all-zero sentinel vector of the configured dimensionality.
///
/// Callers must treat the sentinel as "no usable signal"; see [`is_sentinel`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
}

impl Embedder {
    /// Create an embedder producing vectors of `dimensions` components.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimensions: usize) -> Self {
        Self { provider, dimensions }
    }

    /// The configured dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed `text`, returning an error on provider failure or a vector of
    /// the wrong length.
    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await?;
        if vector.len() != self.dimensions {
            return Err(RagError::EmbeddingError {
                provider: "Embedder".into(),
                message: format!(
                    "expected {} dimensions, provider returned {}",
                    self.dimensions,
                    vector.len()
                ),
            });
        }
        Ok(vector)
    }

    /// Embed `text`, returning the zero sentinel on any failure.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.try_embed(text).await {
            Ok(vector) => {
                debug!(text_len = text.len(), "embedded text");
                vector
            }
            Err(e) => {
                warn!(error = %e, "embedding failed, returning zero vector");
                self.sentinel()
            }
        }
    }

    /// The all-zero sentinel vector.
    pub fn sentinel(&self) -> Vec<f32> {
        vec![0.0; self.dimensions]
    }
}

/// Whether `vector` is the failure sentinel (empty or all components zero).
pub fn is_sentinel(vector: &[f32]) -> bool {
    vector.iter().all(|x| *x == 0.0)
}

/// Element-wise mean of equally sized vectors.
///
/// Returns `None` when `vectors` is empty or the lengths differ.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dims = first.len();
    if vectors.iter().any(|v| v.len() != dims) {
        return None;
    }

    let mut sum = vec![0.0f32; dims];
    for vector in vectors {
        for (acc, x) in sum.iter_mut().zip(vector) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|x| x / n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::EmbeddingError { provider: "mock".into(), message: "down".into() })
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 2.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn failure_returns_zero_sentinel_of_configured_size() {
        let embedder = Embedder::new(Arc::new(FailingProvider), 4);
        let vector = embedder.embed("anything").await;
        assert_eq!(vector, vec![0.0; 4]);
        assert!(is_sentinel(&vector));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_failure() {
        let embedder = Embedder::new(Arc::new(ShortProvider), 3);
        assert!(embedder.try_embed("x").await.is_err());
        assert_eq!(embedder.embed("x").await, vec![0.0; 3]);
    }

    #[test]
    fn mean_is_element_wise() {
        let mean = mean_vector(&[vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 5.0]]).unwrap();
        assert_eq!(mean, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert!(mean_vector(&[]).is_none());
        assert!(mean_vector(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn non_zero_vector_is_not_sentinel() {
        assert!(!is_sentinel(&[0.0, 0.1]));
    }
}
