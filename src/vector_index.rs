//! # VectorIndex
//!
//! Exact nearest-neighbor index over catalog embeddings.
//!
//! Catalogs are small (hundreds to low thousands of products), so the index
//! compares a query against every stored vector. There is no approximation:
//! the answer is always the true k nearest under squared Euclidean distance,
//! with ties going to the lowest position.
//!
//! ## Responsibilities
//! - **Building**: fixes the dimension from the first vector and rejects any
//!   vector that disagrees.
//! - **Searching**: brute-force scan (split across threads with `rayon`),
//!   sorted by `(distance, position)`.
//! - **Persistence**: a bincode file with a small header (`magic`, version,
//!   dimension, count, build time, and the digest of the paired text store).
//!
//! Positions are the contract with [`crate::text_store::TextStore`]: vector
//! `i` is the embedding of store entry `i`.
//!
//! ## Quick Example
//! ```
//! use vetrina::vector_index::VectorIndex;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = VectorIndex::build(vec![vec![0.0, 0.0], vec![1.0, 1.0]])?;
//! let hits = index.search(&[0.9, 0.9], 1)?;
//! assert_eq!(hits[0].position, 1);
//! # Ok(()) }
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::error::{RecommendError, Result};
use crate::persist;

const MAGIC: [u8; 4] = *b"VIDX";
const FORMAT_VERSION: u16 = 1;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the stored vector (and of its text store entry).
    pub position: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Immutable flat L2 index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Dimensionality of every stored vector; 0 only for an empty index.
    dimension: usize,
    /// Row-major `count × dimension` values.
    vectors: Vec<f32>,
    /// Digest of the text store this index was built alongside, if any.
    paired_store: Option<String>,
    /// Unix timestamp of the build.
    built_at: i64,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    magic: [u8; 4],
    version: u16,
    dimension: u64,
    count: u64,
    store_digest: Option<String>,
    built_at: i64,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Store `vectors` in order; position `i` is `vectors[i]`.
    ///
    /// An empty input yields an empty index, which refuses every search with
    /// [`RecommendError::EmptyIndex`].
    ///
    /// # Errors
    /// [`RecommendError::DimensionMismatch`] if any vector's length differs
    /// from the first one's, or the first one is empty.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map_or(0, Vec::len);
        if !vectors.is_empty() && dimension == 0 {
            return Err(RecommendError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut flat = Vec::with_capacity(dimension * vectors.len());
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(RecommendError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            flat.extend_from_slice(vector);
        }

        debug!("Built index of {} vectors ({} dims)", vectors.len(), dimension);

        Ok(Self {
            dimension,
            vectors: flat,
            paired_store: None,
            built_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Record the digest of the text store persisted alongside this index.
    pub fn with_paired_store(mut self, digest: impl Into<String>) -> Self {
        self.paired_store = Some(digest.into());
        self
    }

    pub fn paired_store(&self) -> Option<&str> {
        self.paired_store.as_deref()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn built_at(&self) -> i64 {
        self.built_at
    }

    /// The stored vector at `position`.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.vectors[start..start + self.dimension])
    }

    /// The `min(k, len)` nearest stored vectors, nearest first.
    ///
    /// # Errors
    /// - [`RecommendError::EmptyIndex`] on an index with no vectors.
    /// - [`RecommendError::DimensionMismatch`] if `query` has the wrong length
    ///   (for example, the catalog was embedded with a different model).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() {
            return Err(RecommendError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(RecommendError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .vectors
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| Neighbor {
                position,
                distance: squared_l2(stored, query),
            })
            .collect();

        scored.sort_unstable_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(k);

        Ok(scored)
    }

    fn to_file(&self) -> IndexFile {
        IndexFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dimension: self.dimension as u64,
            count: self.len() as u64,
            store_digest: self.paired_store.clone(),
            built_at: self.built_at,
            vectors: self.vectors.clone(),
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        persist::encode(&self.to_file())
    }

    /// Write the index to `path`, replacing any previous file atomically.
    pub fn persist(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, &self.encode()?)?;
        info!("Persisted {} vectors to {}", self.len(), path.display());
        Ok(())
    }

    /// Read an index written by [`VectorIndex::persist`].
    ///
    /// # Errors
    /// [`RecommendError::CorruptStore`] when the file is not an index, was
    /// written by an incompatible version, or its header disagrees with its
    /// payload.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let file: IndexFile = persist::decode(&bytes, path)?;

        if file.magic != MAGIC {
            return Err(RecommendError::corrupt(path, "not a vector index file"));
        }
        if file.version != FORMAT_VERSION {
            return Err(RecommendError::corrupt(
                path,
                format!("unsupported format version {}", file.version),
            ));
        }
        let expected = file.dimension.checked_mul(file.count);
        if expected != Some(file.vectors.len() as u64) {
            return Err(RecommendError::corrupt(
                path,
                format!(
                    "header promises {} × {} values, found {}",
                    file.count,
                    file.dimension,
                    file.vectors.len()
                ),
            ));
        }
        if file.count > 0 && file.dimension == 0 {
            return Err(RecommendError::corrupt(path, "zero-dimensional vectors"));
        }

        let index = Self {
            dimension: file.dimension as usize,
            vectors: file.vectors,
            paired_store: file.store_digest,
            built_at: file.built_at,
        };
        info!(
            "Loaded {} vectors ({} dims) from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
