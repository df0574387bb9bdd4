//! # Documents, chunks and loading
//!
//! A [`Document`] is the immutable source text the retrieval pipeline starts from; a [`Chunk`]
//! is a bounded slice of one document produced by the [`splitter`](crate::splitter).
//!
//! [`load_source`] turns a file path or an `http(s)://` URL into a document. Project
//! Gutenberg texts carry a license header and footer around the actual book; the
//! `*** START OF ...` / `*** END OF ...` markers are used to cut them away so they never end up
//! in the index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::Path};

use tracing::info;

use crate::agent::scrape::HttpFetcher;
use crate::error::{Error, Result};

/// A contiguous passage of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier used to derive chunk ids. Defaults to the source.
    pub id: String,
    pub text: String,
    /// File path or URL the text came from.
    pub source: String,
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: source.clone(),
            text: text.into(),
            source,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded slice of a document's text.
///
/// Offsets are **byte** offsets into the parent document's UTF-8 text; `overlap` is how many
/// leading bytes of `text` repeat the end of the previous chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub document_id: String,
    pub start_offset: usize,
    pub overlap: usize,
}

impl Chunk {
    /// The part of this chunk not already covered by the previous one.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }
}

/// Load a document from a local file or an `http(s)://` URL.
///
/// # Errors
/// I/O errors for files, [`Error::Http`] for failed fetches, and [`Error::EmptyCorpus`] when the
/// loaded text is empty after trimming the Gutenberg boilerplate.
pub async fn load_source(fetcher: &HttpFetcher, source: &str) -> Result<Document> {
    let raw = if source.starts_with("http://") || source.starts_with("https://") {
        fetcher.fetch(source).await.map_err(|e| match e {
            crate::agent::ToolError::Http(err) => Error::Http(err),
            other => Error::Io(std::io::Error::other(other.to_string())),
        })?
    } else {
        fs::read_to_string(Path::new(source))?
    };

    let text = strip_gutenberg_boilerplate(&raw);
    if text.trim().is_empty() {
        return Err(Error::EmptyCorpus);
    }

    info!(
        "Loaded {} ({} chars, {} bytes)",
        source,
        text.chars().count(),
        text.len()
    );
    Ok(Document::new(source, text).with_metadata("source", source))
}

const START_MARKER: &str = "*** START OF";
const END_MARKER: &str = "*** END OF";

/// Cut the Project Gutenberg license header and footer if both markers are present.
///
/// Text without the markers is returned unchanged.
pub fn strip_gutenberg_boilerplate(text: &str) -> String {
    // The body starts after the closing `***` of the start marker, or after its line.
    let start = text.find(START_MARKER).map(|pos| {
        let after = pos + START_MARKER.len();
        let line_end = text[after..]
            .find('\n')
            .map_or(text.len(), |newline| after + newline);
        match text[after..line_end].find("***") {
            Some(close) => after + close + 3,
            None => line_end,
        }
    });
    let end = text.find(END_MARKER);

    match (start, end) {
        (Some(start), Some(end)) if start <= end => text[start..end].trim().to_string(),
        (Some(start), None) => text[start..].trim().to_string(),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BOOK: &str = "The Project Gutenberg eBook of Example\n\
        Release date: 1901\n\
        *** START OF THE PROJECT GUTENBERG EBOOK EXAMPLE ***\n\
        Chapter I.\n\nIt was a bright cold day.\n\
        *** END OF THE PROJECT GUTENBERG EBOOK EXAMPLE ***\n\
        License text follows.";

    #[test]
    fn test_strip_gutenberg_boilerplate() {
        let body = strip_gutenberg_boilerplate(BOOK);
        assert_eq!(body, "Chapter I.\n\nIt was a bright cold day.");
    }

    #[test]
    fn test_strip_markers_without_line_breaks() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK X *** Call me Ishmael. \
                    *** END OF THE PROJECT GUTENBERG EBOOK X *** license";
        assert_eq!(strip_gutenberg_boilerplate(text), "Call me Ishmael.");

        let text = "Header\n*** START OF THE PROJECT GUTENBERG EBOOK X";
        assert_eq!(strip_gutenberg_boilerplate(text), "");
    }

    #[test]
    fn test_strip_leaves_plain_text_alone() {
        let text = "No markers here.\n";
        assert_eq!(strip_gutenberg_boilerplate(text), text);
    }

    #[tokio::test]
    async fn test_load_source_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{BOOK}").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let fetcher = HttpFetcher::new("groundwork-test", 5).unwrap();
        let doc = load_source(&fetcher, &path).await.unwrap();

        assert_eq!(doc.id, path);
        assert!(doc.text.starts_with("Chapter I."));
        assert_eq!(doc.metadata.get("source"), Some(&path));
    }

    #[tokio::test]
    async fn test_load_source_from_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/book.txt");
                then.status(200).body(BOOK);
            })
            .await;

        let fetcher = HttpFetcher::new("groundwork-test", 5).unwrap();
        let doc = load_source(&fetcher, &server.url("/book.txt")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(doc.text, "Chapter I.\n\nIt was a bright cold day.");
    }

    #[tokio::test]
    async fn test_load_source_rejects_empty_text() {
        let file = NamedTempFile::new().unwrap();
        let fetcher = HttpFetcher::new("groundwork-test", 5).unwrap();
        let result = load_source(&fetcher, file.path().to_str().unwrap()).await;
        assert!(matches!(result, Err(Error::EmptyCorpus)));
    }
}
