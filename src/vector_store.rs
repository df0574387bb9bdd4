//! # VectorStore
//!
//! In-process embedding index for the retrieval pipeline.
//!
//! A [`VectorIndex`] is built once from the full chunk set and then only queried. Queries are
//! exact: every stored vector is scored, so results never depend on index construction
//! order or on approximate-search parameters, and ties are broken by chunk order.
//!
//! ## Responsibilities
//! - **Embedding**: delegates to an [`Embedder`]; identical chunk texts are embedded once
//!   (blake3 de-duplication), so they always receive identical vectors.
//! - **Ranking**: cosine similarity (default) or negative Euclidean distance.
//! - **Guarding the vector space**: the index remembers the embedder's `model_id` and refuses
//!   queries from another model.
//! - **Persistence**: a built index can be written to and read from a bincode snapshot.
//!
//! ## Quick Example
//! ```no_run
//! use groundwork::document::Document;
//! use groundwork::embedding::SentenceEmbedder;
//! use groundwork::splitter::TextSplitter;
//! use groundwork::vector_store::{Metric, VectorIndex};
//!
//! # async fn demo() -> groundwork::error::Result<()> {
//! let embedder = SentenceEmbedder::load("sentence-transformers/all-MiniLM-L6-v2")?;
//! let doc = Document::new("inline", "Rust is great! I love programming.");
//! let chunks = TextSplitter::new(20, 5)?.split(&doc);
//! let index = VectorIndex::build(chunks, &embedder, Metric::Cosine).await?;
//! let hits = index.query("I love Rust!", 1, &embedder).await?;
//! println!("Top match: {}", hits[0].chunk.text);
//! # Ok(()) }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::Path};

use tracing::{debug, info};

use crate::document::Chunk;
use crate::embedding::Embedder;
use crate::error::{Error, Result};

/// Snapshot layout version written by [`VectorIndex::save`].
const SNAPSHOT_VERSION: u32 = 1;

/// Similarity used to rank stored vectors against a query.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    /// Scored as the negated distance so that higher is always better.
    Euclidean,
}

impl Metric {
    /// Similarity of two equal-length vectors; higher means more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Euclidean => -euclidean_distance(a, b),
        }
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Euclidean distance: `sqrt(Σ (a[i] - b[i])^2)`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// A retrieved chunk with its similarity and 0-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Exact nearest-neighbour index over embedded chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    model_id: String,
    metric: Metric,
    dimension: usize,
    entries: Vec<Entry>,
}

impl VectorIndex {
    /// Embed every chunk and store it.
    ///
    /// # Errors
    /// - [`Error::EmptyCorpus`] when `chunks` is empty.
    /// - Any embedder error; no partial index is returned.
    /// - [`Error::DimensionMismatch`] if the embedder returns vectors of different lengths.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder, metric: Metric) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        // One embedding per distinct text.
        let mut slots: HashMap<blake3::Hash, usize> = HashMap::new();
        let mut distinct: Vec<String> = Vec::new();
        let slot_of: Vec<usize> = chunks
            .iter()
            .map(|chunk| {
                *slots
                    .entry(blake3::hash(chunk.text.as_bytes()))
                    .or_insert_with(|| {
                        distinct.push(chunk.text.clone());
                        distinct.len() - 1
                    })
            })
            .collect();

        info!(
            "Embedding {} chunks ({} distinct) with {}",
            chunks.len(),
            distinct.len(),
            embedder.model_id()
        );
        let vectors = embedder.embed_batch(&distinct).await?;
        if vectors.len() != distinct.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                distinct.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(Error::Embedding("embedder returned an empty vector".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(slot_of)
            .map(|(chunk, slot)| Entry {
                chunk,
                vector: vectors[slot].clone(),
            })
            .collect();

        Ok(Self {
            version: SNAPSHOT_VERSION,
            model_id: embedder.model_id().to_string(),
            metric,
            dimension,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stored chunks in their original order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Embed `text` with `embedder` and return the `k` most similar chunks.
    ///
    /// # Errors
    /// [`Error::InvalidTopK`] for `k == 0`, [`Error::EmbedderMismatch`] when `embedder` is not
    /// the model the index was built with, plus embedding and [`search`](Self::search) errors.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(Error::InvalidTopK);
        }
        if embedder.model_id() != self.model_id {
            return Err(Error::EmbedderMismatch {
                indexed: self.model_id.clone(),
                queried: embedder.model_id().to_string(),
            });
        }
        let vector = embedder.embed(text).await?;
        self.search(&vector, k)
    }

    /// Rank every stored chunk against `vector` and keep the best `min(k, len)`.
    ///
    /// Results are in descending score order; equal scores keep chunk order.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(Error::InvalidTopK);
        }
        if self.entries.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let score = self.metric.score(&entry.vector, vector);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();
        // stable sort: ties stay in chunk order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let results: Vec<ScoredChunk> = scored
            .into_iter()
            .enumerate()
            .map(|(rank, (i, score))| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
                rank,
            })
            .collect();

        for hit in &results {
            debug!("#{} {} score={:.4}", hit.rank, hit.chunk.id, hit.score);
        }
        Ok(results)
    }

    /// Write the index to a bincode snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::Index(e.to_string()))?;
        fs::write(path.as_ref(), bytes)?;
        info!(
            "Saved index of {} chunks to {}",
            self.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Read an index written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let (index, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| Error::Index(e.to_string()))?;
        if index.version != SNAPSHOT_VERSION {
            return Err(Error::Index(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                index.version
            )));
        }
        info!(
            "Loaded index of {} chunks ({}) from {}",
            index.len(),
            index.model_id,
            path.as_ref().display()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedEmbedder, chunk};
    use tempfile::NamedTempFile;

    const WEDDING: &str = "The wedding feast had dancing and a band playing until dawn.";
    const COOKING: &str = "Simmer the onions slowly before adding the rice and stock.";
    const WAR: &str = "The war left the northern villages burned and empty.";
    const QUERY: &str = "celebration with music";

    fn embedder() -> FixedEmbedder {
        FixedEmbedder::new(
            "stub",
            &[
                (WEDDING, vec![1.0, 0.0, 0.0]),
                (COOKING, vec![0.0, 1.0, 0.0]),
                (WAR, vec![0.0, 0.0, 1.0]),
                (QUERY, vec![0.9, 0.3, 0.1]),
            ],
        )
    }

    async fn corpus(metric: Metric) -> VectorIndex {
        let chunks = vec![chunk(0, COOKING), chunk(1, WAR), chunk(2, WEDDING)];
        VectorIndex::build(chunks, &embedder(), metric).await.unwrap()
    }

    #[tokio::test]
    async fn test_celebration_query_finds_wedding() {
        for metric in [Metric::Cosine, Metric::Euclidean] {
            let index = corpus(metric).await;
            let hits = index.query(QUERY, 1, &embedder()).await.unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].chunk.text, WEDDING);
            assert_eq!(hits[0].rank, 0);
        }
    }

    #[tokio::test]
    async fn test_query_returns_min_of_k_and_corpus_size() {
        let index = corpus(Metric::Cosine).await;
        let embedder = embedder();
        assert_eq!(index.query(QUERY, 2, &embedder).await.unwrap().len(), 2);
        let all = index.query(QUERY, 10, &embedder).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(all[0].chunk.text, WEDDING);
        assert_eq!(all[1].chunk.text, COOKING);
    }

    #[tokio::test]
    async fn test_ties_keep_chunk_order() {
        let embedder = FixedEmbedder::new(
            "stub",
            &[("a", vec![1.0, 0.0]), ("b", vec![1.0, 0.0]), ("c", vec![0.0, 1.0])],
        );
        let chunks = vec![chunk(0, "c"), chunk(1, "b"), chunk(2, "a")];
        let index = VectorIndex::build(chunks, &embedder, Metric::Cosine)
            .await
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, ["doc#1", "doc#2", "doc#0"]);
    }

    #[tokio::test]
    async fn test_identical_texts_get_identical_embeddings() {
        let embedder = embedder();
        let chunks = vec![chunk(0, WAR), chunk(1, COOKING), chunk(2, WAR)];
        let index = VectorIndex::build(chunks, &embedder, Metric::Cosine)
            .await
            .unwrap();

        assert_eq!(embedder.calls(), 2);
        assert_eq!(index.entries[0].vector, index.entries[2].vector);
    }

    #[tokio::test]
    async fn test_rejects_zero_k_and_empty_corpus() {
        let index = corpus(Metric::Cosine).await;
        assert!(matches!(
            index.query(QUERY, 0, &embedder()).await,
            Err(Error::InvalidTopK)
        ));

        let empty = VectorIndex::build(Vec::new(), &embedder(), Metric::Cosine).await;
        assert!(matches!(empty, Err(Error::EmptyCorpus)));
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_the_build() {
        let chunks = vec![chunk(0, WAR), chunk(1, "text the stub does not know")];
        let result = VectorIndex::build(chunks, &embedder(), Metric::Cosine).await;
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn test_query_with_other_model_is_rejected() {
        let index = corpus(Metric::Cosine).await;
        let other = FixedEmbedder::new("another-model", &[(QUERY, vec![1.0, 0.0, 0.0])]);
        let result = index.query(QUERY, 1, &other).await;
        assert!(matches!(result, Err(Error::EmbedderMismatch { .. })));
    }

    #[tokio::test]
    async fn test_search_checks_dimension() {
        let index = corpus(Metric::Cosine).await;
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let index = corpus(Metric::Euclidean).await;
        let file = NamedTempFile::new().unwrap();
        index.save(file.path()).unwrap();

        let loaded = VectorIndex::load(file.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model_id(), "stub");
        assert_eq!(loaded.metric(), Metric::Euclidean);
        let hits = loaded.query(QUERY, 1, &embedder()).await.unwrap();
        assert_eq!(hits[0].chunk.text, WEDDING);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), b"not an index").unwrap();
        assert!(VectorIndex::load(file.path()).is_err());
    }

    #[test]
    fn test_metrics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert!(Metric::Euclidean.score(&[0.0], &[1.0]) < Metric::Euclidean.score(&[0.0], &[0.5]));
    }
}
