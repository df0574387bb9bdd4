//! # Splitter
//!
//! Recursive character splitting with overlap.
//!
//! The splitter walks the text left to right. For each chunk it looks at the next
//! `chunk_size` characters and breaks at the largest natural boundary available inside that
//! window, counting a separator that starts right where the window ends:
//!
//! 1. paragraph (`\n\n`)
//! 2. line (`\n`)
//! 3. sentence (`.`, `!` or `?` followed by whitespace)
//! 4. word (any whitespace)
//! 5. a raw character cut when none of the above exists (e.g. one very long token)
//!
//! The next chunk then starts `chunk_overlap` characters before the previous chunk ended.
//! A boundary is only taken if the chunk stays longer than the overlap, which guarantees the
//! walk always advances.
//!
//! Chunk texts are exact slices of the source: nothing is trimmed, so dropping each chunk's
//! overlap prefix and concatenating gives back the original text (see [`reconstruct`]).
//!
//! ```rust
//! use groundwork::document::Document;
//! use groundwork::splitter::{TextSplitter, reconstruct};
//!
//! let doc = Document::new("inline", "One. Two. Three. Four.");
//! let chunks = TextSplitter::new(10, 3).unwrap().split(&doc);
//! assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
//! assert_eq!(reconstruct(&chunks), doc.text);
//! ```

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::document::{Chunk, Document};
use crate::error::{Error, Result};

/// Splits documents into overlapping chunks of at most `chunk_size` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// # Errors
    /// [`Error::Config`] if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a document into ordered chunks covering the whole text.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .spans(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, span)| Chunk {
                id: format!("{}#{index}", document.id),
                text: document.text[span.start..span.end].to_string(),
                document_id: document.id.clone(),
                start_offset: span.start,
                overlap: span.overlap,
            })
            .collect();

        debug!(
            "Split {} into {} chunks (size {}, overlap {})",
            document.id,
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );
        chunks
    }

    fn spans(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut start = 0;
        let mut overlap = 0;

        while start < text.len() {
            let limit = advance(text, start, self.chunk_size);
            if limit >= text.len() {
                spans.push(Span {
                    start,
                    end: text.len(),
                    overlap,
                });
                break;
            }

            // The chunk must hold more than `chunk_overlap` chars or the next start would not move.
            let mut min_end = advance(text, start, self.chunk_overlap + 1) - start;
            // ...and something besides whitespace when the window has it.
            if let Some((pos, c)) = text[start..limit]
                .char_indices()
                .find(|(_, c)| !c.is_whitespace())
            {
                min_end = min_end.max(pos + c.len_utf8());
            }
            let end = start + find_break(text, start, limit, min_end).unwrap_or(limit - start);
            spans.push(Span {
                start,
                end,
                overlap,
            });

            let next = retreat(text, end, self.chunk_overlap);
            overlap = end - next;
            start = next;
        }

        spans
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    overlap: usize,
}

/// Rebuild the source text from its chunks by dropping every overlap.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(chunk.fresh_text());
    }
    text
}

/// Byte offset `chars` characters after `from`, capped at the end of `text`.
fn advance(text: &str, from: usize, chars: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(chars)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte offset `chars` characters before `to`.
fn retreat(text: &str, to: usize, chars: usize) -> usize {
    if chars == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// End offset (relative to `start`) of the best boundary in `text[start..limit]` that is at
/// least `min_end`.
///
/// Every separator offers two places to cut: just before it and just after it. A separator
/// that begins exactly at `limit` therefore still counts, with the cut landing on `limit`.
fn find_break(text: &str, start: usize, limit: usize, min_end: usize) -> Option<usize> {
    let region = &text[start..advance(text, limit, 2)];
    let window = limit - start;
    let levels = [
        separators(region.match_indices("\n\n")),
        separators(region.match_indices('\n')),
        sentence_ends(region),
        region
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(pos, c)| (pos, pos + c.len_utf8()))
            .collect(),
    ];

    levels.iter().find_map(|found| {
        found
            .iter()
            .flat_map(|&(before, after)| [before, after])
            .filter(|&end| end >= min_end && end <= window)
            .max()
    })
}

fn separators<'a>(matches: impl Iterator<Item = (usize, &'a str)>) -> Vec<(usize, usize)> {
    matches.map(|(pos, sep)| (pos, pos + sep.len())).collect()
}

/// `(after punctuation, after the following whitespace)` for every sentence end in `region`.
fn sentence_ends(region: &str) -> Vec<(usize, usize)> {
    let mut ends = Vec::new();
    let mut chars = region.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_pos, next)) = chars.peek() {
            if next.is_whitespace() {
                ends.push((next_pos, next_pos + next.len_utf8()));
            }
        }
    }
    ends
}
