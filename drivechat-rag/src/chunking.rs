//! Document chunking.
//!
//! Chunks only exist while a document is being embedded, so splitting is
//! purely by character count with no regard for word or sentence boundaries.

/// A strategy for splitting document text into embedding-sized pieces.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered, non-overlapping pieces.
    ///
    /// Returns an empty `Vec` if the text is empty.
    fn chunk<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Splits text into fixed-size chunks by character count.
///
/// # Example
///
/// ```rust
/// use drivechat_rag::{Chunker, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(4);
/// assert_eq!(chunker.chunk("abcdefghij"), vec!["abcd", "efgh", "ij"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker` producing chunks of at most `chunk_size` characters.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk<'a>(&self, text: &'a str) -> Vec<&'a str> {
        chunk_text(text, self.chunk_size)
    }
}

/// Split `text` into consecutive slices of at most `max_chars` characters.
///
/// Concatenating the result reproduces `text`, and the number of chunks is
/// `ceil(chars / max_chars)`. Slices always end on `char` boundaries. A
/// `max_chars` of zero yields the whole text as a single chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);

    chunks
}

/// Return the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}
