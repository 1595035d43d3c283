//! Explicit per-user session state.
//!
//! A [`Session`] owns everything a logged-in user needs: the authenticated
//! file storage, the pipeline and its indexing status. Sessions live in a
//! [`SessionManager`] from login until logout.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::document::Answer;
use crate::error::Result;
use crate::indexer::IndexReport;
use crate::pipeline::RagPipeline;
use crate::storage::FileStorage;

/// Identifier of a session.
pub type SessionId = String;

/// Indexing progress of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum IndexStatus {
    /// No indexing pass has started.
    NotIndexed,
    /// An indexing pass is running.
    Indexing,
    /// The last pass completed.
    Indexed(IndexReport),
    /// The last pass could not list files.
    Failed(String),
}

impl IndexStatus {
    /// Whether the session has a completed index to search.
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexStatus::Indexed(_))
    }
}

/// State of one logged-in user.
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    pipeline: RagPipeline,
    storage: Arc<dyn FileStorage>,
    status: RwLock<IndexStatus>,
}

impl Session {
    fn new(pipeline: RagPipeline, storage: Arc<dyn FileStorage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            pipeline,
            storage,
            status: RwLock::new(IndexStatus::NotIndexed),
        }
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The session's pipeline.
    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Current indexing status.
    pub async fn status(&self) -> IndexStatus {
        self.status.read().await.clone()
    }

    /// Create the collection and index the session's storage, tracking status.
    ///
    /// # Errors
    ///
    /// Returns the initialization or listing error; the status becomes
    /// [`IndexStatus::Failed`].
    pub async fn index(&self) -> Result<IndexReport> {
        *self.status.write().await = IndexStatus::Indexing;

        let outcome = match self.pipeline.initialize().await {
            Ok(()) => self.pipeline.index(self.storage.clone()).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                info!(session = %self.id, indexed = report.indexed(), "session indexed");
                *self.status.write().await = IndexStatus::Indexed(report.clone());
                Ok(report)
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(session = %self.id, error = %e, "error indexing files");
                } else {
                    warn!(session = %self.id, error = %e, "indexing stopped early");
                }
                *self.status.write().await = IndexStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Answer a question with the session's pipeline.
    pub async fn ask(&self, query: &str) -> Option<Answer> {
        self.pipeline.ask(query).await
    }
}

/// Registry of live sessions keyed by id.
#[derive(Default, Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for an authenticated user.
    pub async fn login(&self, pipeline: RagPipeline, storage: Arc<dyn FileStorage>) -> Arc<Session> {
        let session = Arc::new(Session::new(pipeline, storage));
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        info!(session = %session.id, "session created");
        session
    }

    /// Look up a session.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Drop all state held for `session_id`. Returns whether it existed.
    pub async fn logout(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session = session_id, "session cleared");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::DriveFile;
    use crate::embedding::EmbeddingProvider;
    use crate::error::RagError;
    use crate::generation::TextGenerator;
    use crate::inmemory::InMemoryVectorStore;
    use crate::config::RagConfig;

    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("answer".into())
        }
    }

    struct Storage {
        fail: bool,
    }

    #[async_trait]
    impl FileStorage for Storage {
        async fn list_files(&self) -> Result<Vec<DriveFile>> {
            if self.fail {
                return Err(RagError::ListingError("403".into()));
            }
            Ok(vec![DriveFile::new("f1", "notes.txt", "text/plain")])
        }

        async fn export_text(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(b"meeting notes about the quarterly roadmap".to_vec())
        }
    }

    fn pipeline() -> RagPipeline {
        RagPipeline::builder()
            .config(RagConfig::builder().vector_size(2).build().unwrap())
            .embedding_provider(Arc::new(UnitProvider))
            .text_generator(Arc::new(Echo))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn login_index_logout_lifecycle() {
        let manager = SessionManager::new();
        let session = manager.login(pipeline(), Arc::new(Storage { fail: false })).await;
        assert_eq!(session.status().await, IndexStatus::NotIndexed);

        let report = session.index().await.unwrap();
        assert_eq!(report.indexed(), 1);
        assert!(session.status().await.is_ready());
        assert_eq!(session.ask("roadmap?").await.unwrap().text, "answer");

        let id = session.id().to_string();
        assert!(manager.get(&id).await.is_some());
        assert!(manager.logout(&id).await);
        assert!(manager.get(&id).await.is_none());
        assert!(!manager.logout(&id).await);
    }

    #[tokio::test]
    async fn listing_failure_marks_session_failed() {
        let manager = SessionManager::new();
        let session = manager.login(pipeline(), Arc::new(Storage { fail: true })).await;

        assert!(session.index().await.is_err());
        assert!(matches!(session.status().await, IndexStatus::Failed(_)));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let manager = SessionManager::new();
        let a = manager.login(pipeline(), Arc::new(Storage { fail: false })).await;
        let b = manager.login(pipeline(), Arc::new(Storage { fail: false })).await;
        assert_ne!(a.id(), b.id());

        manager.logout(a.id()).await;
        assert_eq!(manager.len().await, 1);
        assert!(manager.get(b.id()).await.is_some());
    }
}
