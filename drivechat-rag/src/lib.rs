//! # drivechat-rag
//!
//! Retrieval-augmented question answering over the documents in a Google
//! Drive account.
//!
//! Each document is fetched, split into character chunks, embedded chunk by
//! chunk, and stored as a single averaged vector keyed by a stable id derived
//! from its Drive file id. Questions are embedded, matched against the stored
//! vectors by cosine similarity, and answered by a generative model from the
//! retrieved snippets.
//!
//! ## Feature flags
//!
//! | Feature  | Enables |
//! |----------|---------|
//! | `gemini` | [`GeminiEmbeddingProvider`](gemini::GeminiEmbeddingProvider) and [`GeminiGenerator`](gemini::GeminiGenerator) |
//! | `drive`  | [`OAuthAuthenticator`](auth::OAuthAuthenticator) and [`GoogleDriveClient`](drive::GoogleDriveClient) |
//! | `qdrant` | [`QdrantVectorStore`](qdrant::QdrantVectorStore) |
//! | `full`   | all of the above |
//!
//! Without features the crate still provides the full pipeline with the
//! [`InMemoryVectorStore`] and any user-supplied trait implementations.

pub mod answer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod fetcher;
pub mod generation;
pub mod indexer;
pub mod inmemory;
pub mod pipeline;
pub mod query;
pub mod session;
pub mod storage;
pub mod vectorstore;

#[cfg(feature = "drive")]
pub mod auth;
#[cfg(feature = "drive")]
pub mod drive;
#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use answer::{AnswerSynthesizer, GENERATION_FAILED, NO_ANSWER, build_context};
pub use chunking::{Chunker, FixedSizeChunker, chunk_text};
pub use config::{DEFAULT_ALLOWED_MIME_TYPES, RagConfig, RagConfigBuilder};
pub use document::{Answer, Document, DriveFile, PointPayload, SearchResult, VectorPoint};
pub use embedding::{Embedder, EmbeddingProvider, is_sentinel, mean_vector};
pub use error::{RagError, Result};
pub use fetcher::ContentFetcher;
pub use generation::TextGenerator;
pub use indexer::{DocumentIndexer, FileOutcome, IndexOutcome, IndexReport, SkipReason, point_id};
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{NO_RESULTS, RagPipeline, RagPipelineBuilder};
pub use query::QueryEngine;
pub use session::{IndexStatus, Session, SessionId, SessionManager};
pub use storage::FileStorage;
pub use vectorstore::VectorStore;
