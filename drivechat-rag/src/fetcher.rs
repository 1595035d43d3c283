//! Content fetching: turns a listed file into decoded text.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::DriveFile;
use crate::error::{RagError, Result};
use crate::storage::FileStorage;

/// Fetches and decodes file content from a [`FileStorage`].
///
/// Provider-native documents are exported as plain text, everything else is
/// downloaded as-is. Bytes that are not valid UTF-8 are dropped and the result
/// is trimmed.
#[derive(Clone)]
pub struct ContentFetcher {
    storage: Arc<dyn FileStorage>,
}

impl ContentFetcher {
    /// Create a fetcher reading from `storage`.
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }

    /// Fetch and decode the content of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageError`] if the file id is empty or the
    /// export/download fails.
    pub async fn try_fetch(&self, file: &DriveFile) -> Result<String> {
        if file.id.is_empty() {
            return Err(RagError::StorageError {
                file_id: String::new(),
                message: format!("file '{}' has no id", file.name),
            });
        }

        let bytes = if file.is_native() {
            self.storage.export_text(&file.id).await?
        } else {
            self.storage.download(&file.id).await?
        };

        let text = decode_text(&bytes);
        debug!(file.id = %file.id, bytes = bytes.len(), chars = text.chars().count(), "fetched file");
        Ok(text)
    }

    /// Fetch and decode the content of `file`, returning an empty string on failure.
    pub async fn fetch(&self, file: &DriveFile) -> String {
        match self.try_fetch(file).await {
            Ok(text) => text,
            Err(e) => {
                warn!(file.id = %file.id, file.name = %file.name, error = %e, "error reading file");
                String::new()
            }
        }
    }
}

/// Decode `bytes` as UTF-8, dropping invalid sequences, and trim whitespace.
pub fn decode_text(bytes: &[u8]) -> String {
    let decoded: String = bytes.utf8_chunks().map(|chunk| chunk.valid()).collect();
    decoded.trim().to_string()
}
