//! File-storage provider trait.

use async_trait::async_trait;

use crate::document::DriveFile;
use crate::error::Result;

/// A cloud file-storage account that documents are pulled from.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// List all non-trashed files.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ListingError`](crate::RagError::ListingError) if
    /// the listing cannot be completed.
    async fn list_files(&self) -> Result<Vec<DriveFile>>;

    /// Export a provider-native document as plain text.
    async fn export_text(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Download the raw bytes of a file.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}
