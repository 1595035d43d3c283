//! Document indexing: fetch → chunk → embed → average → upsert.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, truncate_chars};
use crate::config::RagConfig;
use crate::document::{Document, DriveFile, PointPayload, VectorPoint};
use crate::embedding::{Embedder, is_sentinel, mean_vector};
use crate::error::Result;
use crate::fetcher::ContentFetcher;
use crate::storage::FileStorage;
use crate::vectorstore::VectorStore;

/// Upper bound (exclusive) of derived point ids.
pub const POINT_ID_MODULUS: u64 = 1_000_000_000_000_000_000;

/// Derive the stable store id of a file from its external id.
///
/// The first eight bytes of the SHA-256 digest, read big-endian, reduced
/// modulo 10^18. Identical ids always map to the same point, across runs.
pub fn point_id(file_id: &str) -> u64 {
    let digest = Sha256::digest(file_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % POINT_ID_MODULUS
}

/// Why a file was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The content type is not on the allow-list.
    UnsupportedType,
    /// The listing entry had no id.
    MissingId,
    /// The fetched content was shorter than the minimum.
    TooShort {
        /// Number of characters fetched.
        chars: usize,
    },
    /// No chunk produced a usable embedding.
    NoEmbeddings,
    /// The vector store rejected the upsert.
    StoreFailed {
        /// The store error message.
        message: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedType => write!(f, "unsupported content type"),
            SkipReason::MissingId => write!(f, "file has no id"),
            SkipReason::TooShort { chars } => write!(f, "content too short ({chars} chars)"),
            SkipReason::NoEmbeddings => write!(f, "no valid embeddings generated"),
            SkipReason::StoreFailed { message } => write!(f, "upsert failed: {message}"),
        }
    }
}

/// The result of indexing one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The document was stored under `point_id`.
    Indexed {
        /// Id of the stored point.
        point_id: u64,
        /// Number of chunks the content was split into.
        chunks: usize,
    },
    /// The file was skipped.
    Skipped(SkipReason),
}

/// Per-file record in an [`IndexReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    /// The listed file.
    pub file: DriveFile,
    /// What happened to it.
    pub outcome: IndexOutcome,
}

/// Summary of an indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    /// Number of files returned by the listing.
    pub listed: usize,
    /// Per-file outcomes, in listing order.
    pub files: Vec<FileOutcome>,
}

impl IndexReport {
    /// Number of documents stored.
    pub fn indexed(&self) -> usize {
        self.files.iter().filter(|f| matches!(f.outcome, IndexOutcome::Indexed { .. })).count()
    }

    /// Number of files skipped for any reason.
    pub fn skipped(&self) -> usize {
        self.files.len() - self.indexed()
    }
}

/// Callback receiving `(position, total, file name)` as each file starts.
pub type ProgressFn = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Turns listed files into one averaged vector per document in the store.
#[derive(Clone)]
pub struct DocumentIndexer {
    config: RagConfig,
    embedder: Embedder,
    chunker: Arc<dyn Chunker>,
    store: Arc<dyn VectorStore>,
    progress: Option<ProgressFn>,
}

impl DocumentIndexer {
    /// Create an indexer writing into `store`.
    pub fn new(
        config: RagConfig,
        embedder: Embedder,
        chunker: Arc<dyn Chunker>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self { config, embedder, chunker, store, progress: None }
    }

    /// Report per-file progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// List every file in `storage` and index each one.
    ///
    /// Individual file failures are recorded in the report and never abort
    /// the pass.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ListingError`](crate::RagError::ListingError) if
    /// the file list cannot be enumerated.
    pub async fn index_all(&self, storage: Arc<dyn FileStorage>) -> Result<IndexReport> {
        let files = storage.list_files().await.inspect_err(|e| {
            error!(error = %e, "error listing files");
        })?;
        let total = files.len();
        info!(total, "indexing drive files");

        let fetcher = ContentFetcher::new(storage);
        let fetcher = &fetcher;
        let mut outcomes: Vec<(usize, FileOutcome)> = stream::iter(files.into_iter().enumerate())
            .map(|(idx, file)| async move {
                let outcome = self.index_file(fetcher, &file, idx + 1, total).await;
                (idx, FileOutcome { file, outcome })
            })
            .buffer_unordered(self.config.index_concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        let report =
            IndexReport { listed: total, files: outcomes.into_iter().map(|(_, f)| f).collect() };
        info!(indexed = report.indexed(), skipped = report.skipped(), "indexing finished");
        Ok(report)
    }

    /// Index a single file. Never fails: every problem becomes a [`SkipReason`].
    pub async fn index_file(
        &self,
        fetcher: &ContentFetcher,
        file: &DriveFile,
        position: usize,
        total: usize,
    ) -> IndexOutcome {
        if !self.config.is_allowed(&file.mime_type) {
            debug!(file.name = %file.name, mime_type = %file.mime_type, "skipping unsupported type");
            return IndexOutcome::Skipped(SkipReason::UnsupportedType);
        }

        info!("Processing {position}/{total}: {}", file.name);
        if let Some(progress) = &self.progress {
            progress(position, total, &file.name);
        }

        if file.id.is_empty() {
            warn!(file.name = %file.name, "skipping file with no id");
            return IndexOutcome::Skipped(SkipReason::MissingId);
        }

        let content = fetcher.fetch(file).await;
        let chars = content.chars().count();
        if chars < self.config.min_content_chars {
            info!(file.name = %file.name, chars, "skipping small file");
            return IndexOutcome::Skipped(SkipReason::TooShort { chars });
        }

        let Some((document, chunks)) = self.embed_document(file, content).await else {
            warn!(file.name = %file.name, "no valid embeddings generated");
            return IndexOutcome::Skipped(SkipReason::NoEmbeddings);
        };

        let point = VectorPoint {
            id: point_id(&document.id),
            vector: document.embedding,
            payload: PointPayload {
                name: document.name,
                content: truncate_chars(&document.text, self.config.snippet_chars).to_string(),
            },
        };
        let id = point.id;

        match self.store.upsert(&self.config.collection, std::slice::from_ref(&point)).await {
            Ok(()) => {
                info!(file.name = %file.name, point_id = id, chunks, "processed file");
                IndexOutcome::Indexed { point_id: id, chunks }
            }
            Err(e) => {
                error!(file.name = %file.name, error = %e, "upsert failed");
                IndexOutcome::Skipped(SkipReason::StoreFailed { message: e.to_string() })
            }
        }
    }

    fn indexed_text<'a>(&self, text: &'a str) -> &'a str {
        match self.config.max_content_chars {
            Some(max) => truncate_chars(text, max),
            None => text,
        }
    }

    /// Embed every chunk of `content` and average the usable vectors.
    ///
    /// Sentinel vectors from failed chunk embeddings are left out of the
    /// mean. Returns the document with the number of chunks it was split
    /// into, or `None` when no chunk embedded successfully.
    pub async fn embed_document(
        &self,
        file: &DriveFile,
        content: String,
    ) -> Option<(Document, usize)> {
        let chunks = self.chunker.chunk(self.indexed_text(&content));
        let chunk_count = chunks.len();
        let mut vectors = Vec::with_capacity(chunk_count);
        for chunk in chunks {
            let vector = self.embedder.embed(chunk).await;
            if is_sentinel(&vector) {
                debug!(file.id = %file.id, "dropping failed chunk embedding");
                continue;
            }
            vectors.push(vector);
        }

        let embedding = mean_vector(&vectors)?;
        let document = Document {
            id: file.id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            text: content,
            embedding,
        };
        Some((document, chunk_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_stable_and_bounded() {
        let id = point_id("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms");
        assert_eq!(id, point_id("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms"));
        assert!(id < POINT_ID_MODULUS);
        assert_ne!(id, point_id("another-file"));
    }

    #[test]
    fn point_id_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(point_id("abc"), 0xba78_16bf_8f01_cfea % POINT_ID_MODULUS);
    }

    #[test]
    fn report_counts_outcomes() {
        let report = IndexReport {
            listed: 3,
            files: vec![
                FileOutcome {
                    file: DriveFile::new("1", "a", "text/plain"),
                    outcome: IndexOutcome::Indexed { point_id: 1, chunks: 1 },
                },
                FileOutcome {
                    file: DriveFile::new("2", "b", "image/png"),
                    outcome: IndexOutcome::Skipped(SkipReason::UnsupportedType),
                },
            ],
        };
        assert_eq!(report.indexed(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn skip_reason_reads_naturally() {
        assert_eq!(SkipReason::TooShort { chars: 4 }.to_string(), "content too short (4 chars)");
    }
}
