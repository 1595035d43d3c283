//! Google Drive v3 file-storage backend.
//!
//! This module is only available when the `drive` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use crate::auth::TokenSource;
use crate::document::DriveFile;
use crate::error::{RagError, Result};
use crate::storage::FileStorage;

/// The default Drive v3 REST endpoint.
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Files requested per listing page.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// A [`FileStorage`] backed by the Google Drive v3 REST API.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use drivechat_rag::drive::GoogleDriveClient;
///
/// let drive = GoogleDriveClient::new(Arc::new(authenticator));
/// let files = drive.list_files().await?;
/// ```
pub struct GoogleDriveClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
    page_size: u32,
    max_pages: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

impl GoogleDriveClient {
    /// Create a client authenticating with `tokens`.
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            base_url: DEFAULT_BASE_URL.into(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the number of files requested per page.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Stop listing after `pages` pages.
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn get_bytes(&self, file_id: &str, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>> {
        let storage_err = |message: String| RagError::StorageError { file_id: file_id.into(), message };
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| storage_err(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(storage_err(format!("API returned {status}: {}", body.trim())));
        }

        let bytes =
            response.bytes().await.map_err(|e| storage_err(format!("failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FileStorage for GoogleDriveClient {
    async fn list_files(&self) -> Result<Vec<DriveFile>> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| RagError::ListingError(format!("no credentials: {e}")))?;

        let page_size = self.page_size.to_string();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let mut query = vec![
                ("q", "trashed=false"),
                ("pageSize", page_size.as_str()),
                ("fields", "nextPageToken, files(id, name, mimeType)"),
            ];
            if let Some(page_token) = page_token.as_deref() {
                query.push(("pageToken", page_token));
            }

            let response = self
                .http
                .get(self.url("files"))
                .bearer_auth(&token)
                .query(&query)
                .send()
                .await
                .map_err(|e| {
                    error!(error = %e, "drive listing request failed");
                    RagError::ListingError(format!("request failed: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!(%status, "drive listing rejected");
                return Err(RagError::ListingError(format!("API returned {status}: {}", body.trim())));
            }

            let page: FileList = response
                .json()
                .await
                .map_err(|e| RagError::ListingError(format!("failed to parse file list: {e}")))?;

            pages += 1;
            debug!(page = pages, count = page.files.len(), "listed drive page");
            files.extend(page.files);

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() || self.max_pages.is_some_and(|max| pages >= max) {
                break;
            }
        }

        Ok(files)
    }

    async fn export_text(&self, file_id: &str) -> Result<Vec<u8>> {
        self.get_bytes(file_id, &format!("files/{file_id}/export"), &[("mimeType", "text/plain")])
            .await
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.get_bytes(file_id, &format!("files/{file_id}"), &[("alt", "media")]).await
    }
}
