//! Data types for files, documents, stored points, and search results.

use serde::{Deserialize, Serialize};

/// Content-type prefix of provider-native editable formats (Docs, Sheets, Slides).
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps";

/// A file entry as listed by the file-storage provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriveFile {
    /// External identifier of the file. May be empty if the provider omitted it.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default = "unnamed")]
    pub name: String,
    /// Declared content type.
    #[serde(default, rename = "mimeType")]
    pub mime_type: String,
}

fn unnamed() -> String {
    "unnamed".to_string()
}

impl DriveFile {
    /// Create a file entry.
    pub fn new(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), mime_type: mime_type.into() }
    }

    /// Whether the file is stored in a provider-native format that must be exported.
    pub fn is_native(&self) -> bool {
        self.mime_type.starts_with(NATIVE_MIME_PREFIX)
    }
}

/// A fetched document with its averaged embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// External identifier of the source file.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Declared content type.
    pub mime_type: String,
    /// Decoded text content.
    pub text: String,
    /// Element-wise mean of the chunk embeddings.
    pub embedding: Vec<f32>,
}

/// Payload stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    /// Display name of the source document.
    pub name: String,
    /// Leading snippet of the document text.
    pub content: String,
}

/// One stored point: a document vector keyed by a stable numeric id.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    /// Stable identifier derived from the file id.
    pub id: u64,
    /// The document vector.
    pub vector: Vec<f32>,
    /// Name and snippet of the document.
    pub payload: PointPayload,
}

/// A retrieved document paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Identifier of the stored point.
    pub id: u64,
    /// Display name of the document.
    pub name: String,
    /// Stored content snippet.
    pub content: String,
    /// Cosine similarity (higher is more relevant).
    pub score: f32,
}

/// A generated answer with the results it was built from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Answer {
    /// The model's answer text, or a fixed fallback message.
    pub text: String,
    /// The retrieved documents used as context.
    pub sources: Vec<SearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_drive_listing_entry() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"1a","name":"Plan","mimeType":"application/vnd.google-apps.document"}"#,
        )
        .unwrap();
        assert_eq!(file.id, "1a");
        assert!(file.is_native());
    }

    #[test]
    fn missing_name_defaults_to_unnamed() {
        let file: DriveFile = serde_json::from_str(r#"{"id":"1a","mimeType":"text/plain"}"#).unwrap();
        assert_eq!(file.name, "unnamed");
        assert!(!file.is_native());
    }
}
