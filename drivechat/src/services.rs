//! Construction of the external-service clients.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use drivechat_rag::auth::{ClientSecrets, CredentialStatus, OAuthAuthenticator};
use drivechat_rag::drive::GoogleDriveClient;
use drivechat_rag::gemini::{GeminiEmbeddingProvider, GeminiGenerator, TaskType, api_key_from_env};
use drivechat_rag::qdrant::QdrantVectorStore;
use drivechat_rag::{FileStorage, InMemoryVectorStore, RagConfig, RagPipeline, VectorStore};
use tracing::info;

use crate::config::AppArgs;

/// Authenticate with Google Drive and return a storage client.
///
/// Runs the consent flow when no usable token is stored.
pub async fn connect_drive(args: &AppArgs) -> anyhow::Result<Arc<dyn FileStorage>> {
    let secrets = ClientSecrets::from_file(&args.credentials).await?;
    let authenticator = OAuthAuthenticator::new(secrets, args.token.clone())
        .with_redirect_port(args.redirect_port)
        .with_open_browser(!args.no_browser);
    if authenticator.status().await == CredentialStatus::NeedsReauth {
        info!(token = %args.token.display(), "no usable Google Drive token, starting consent flow");
    }
    authenticator.authorize().await?;
    let mut drive = GoogleDriveClient::new(Arc::new(authenticator)).with_page_size(args.page_size);
    if let Some(pages) = args.max_pages {
        drive = drive.with_max_pages(pages);
    }
    Ok(Arc::new(drive))
}

/// Open the configured vector store.
pub fn open_store(args: &AppArgs) -> anyhow::Result<Arc<dyn VectorStore>> {
    if args.uses_in_memory_store() {
        info!("using in-memory vector store");
        return Ok(Arc::new(InMemoryVectorStore::new()));
    }
    info!(url = %args.qdrant_url, "connecting to Qdrant");
    Ok(Arc::new(QdrantVectorStore::new(&args.qdrant_url)?))
}

/// The Gemini API key from `--api-key`/`GOOGLE_API_KEY`, or `GEMINI_API_KEY`.
pub fn api_key(args: &AppArgs) -> anyhow::Result<String> {
    match &args.api_key {
        Some(key) if !key.trim().is_empty() => Ok(key.clone()),
        _ => Ok(api_key_from_env()?),
    }
}

/// Build a pipeline over `store` using Gemini for embeddings and answers.
///
/// Fails when no API key is configured.
pub fn build_pipeline(args: &AppArgs, store: Arc<dyn VectorStore>) -> anyhow::Result<RagPipeline> {
    let api_key = api_key(args)?;
    let config = RagConfig::from_env()?;

    let embedder = |task_type: TaskType| -> anyhow::Result<GeminiEmbeddingProvider> {
        let mut provider = GeminiEmbeddingProvider::new(api_key.as_str())?
            .with_task_type(task_type)
            .with_output_dimensionality(config.vector_size);
        if let Some(model) = &args.embedding_model {
            provider = provider.with_model(model.as_str());
        }
        Ok(provider)
    };
    let documents = embedder(TaskType::RetrievalDocument)?;
    let queries = embedder(TaskType::RetrievalQuery)?;

    let mut generator = GeminiGenerator::new(api_key.as_str())?;
    if let Some(model) = &args.generation_model {
        generator = generator.with_model(model.as_str());
    }

    RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(documents))
        .query_embedding_provider(Arc::new(queries))
        .text_generator(Arc::new(generator))
        .vector_store(store)
        .build()
        .context("failed to assemble the pipeline")
}

/// Creates the per-user pieces of a session: authenticated storage and a pipeline.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<(RagPipeline, Arc<dyn FileStorage>)>;
}

/// Connects to Google Drive, Gemini and the configured vector store.
pub struct GoogleConnector {
    args: AppArgs,
}

impl GoogleConnector {
    pub fn new(args: AppArgs) -> Self {
        Self { args }
    }
}

#[async_trait]
impl Connector for GoogleConnector {
    async fn connect(&self) -> anyhow::Result<(RagPipeline, Arc<dyn FileStorage>)> {
        let storage = connect_drive(&self.args).await.context("Login failed")?;
        let store = open_store(&self.args)?;
        let pipeline = build_pipeline(&self.args, store)?;
        Ok((pipeline, storage))
    }
}
