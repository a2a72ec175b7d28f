//! Positional store of catalog texts, persisted next to the vector index.
//!
//! Entry `i` is the product whose embedding sits at position `i` of the
//! [`VectorIndex`]. The store's [`digest`](TextStore::digest) is written into
//! the index header so a mismatched pair is caught on load instead of
//! silently returning the wrong products.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::info;

use crate::catalog::CatalogEntry;
use crate::error::{RecommendError, Result};
use crate::persist;
use crate::vector_index::VectorIndex;

const MAGIC: [u8; 4] = *b"VTXT";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextStore {
    entries: Vec<CatalogEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    magic: [u8; 4],
    version: u16,
    count: u64,
    entries: Vec<CatalogEntry>,
}

impl TextStore {
    /// Take ownership of `entries`, renumbering them to match their order.
    pub fn new(mut entries: Vec<CatalogEntry>) -> Self {
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.position = position;
        }
        Self { entries }
    }

    /// Wrap plain texts (for example a store recovered from an older export)
    /// with no structured category or price.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .enumerate()
                .map(|(position, text)| CatalogEntry::legacy(position, text))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&CatalogEntry> {
        self.entries.get(position)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.text.as_str())
    }

    /// blake3 hex digest of the encoded entries.
    pub fn digest(&self) -> Result<String> {
        let bytes = persist::encode(&self.entries)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        persist::encode(&StoreFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            count: self.entries.len() as u64,
            entries: self.entries.clone(),
        })
    }

    /// Write the store to `path`, replacing any previous file atomically.
    pub fn persist(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, &self.encode()?)?;
        info!("Persisted {} texts to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a store written by [`TextStore::persist`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let file: StoreFile = persist::decode(&bytes, path)?;

        if file.magic != MAGIC {
            return Err(RecommendError::corrupt(path, "not a text store file"));
        }
        if file.version != FORMAT_VERSION {
            return Err(RecommendError::corrupt(
                path,
                format!("unsupported format version {}", file.version),
            ));
        }
        if file.count != file.entries.len() as u64 {
            return Err(RecommendError::corrupt(
                path,
                format!(
                    "header promises {} entries, found {}",
                    file.count,
                    file.entries.len()
                ),
            ));
        }
        if let Some((i, _)) = file
            .entries
            .iter()
            .enumerate()
            .find(|(i, e)| e.position != *i)
        {
            return Err(RecommendError::corrupt(
                path,
                format!("entry {i} is out of order"),
            ));
        }

        info!("Loaded {} texts from {}", file.entries.len(), path.display());
        Ok(Self {
            entries: file.entries,
        })
    }

    /// Load the store and check it belongs with `index`.
    ///
    /// # Errors
    /// [`RecommendError::CorruptStore`] when the entry count differs from the
    /// index's vector count, or the index was built alongside a different
    /// store.
    pub fn load_paired(path: &Path, index: &VectorIndex) -> Result<Self> {
        let store = Self::load(path)?;

        if store.len() != index.len() {
            return Err(RecommendError::corrupt(
                path,
                format!(
                    "store holds {} entries but the index holds {} vectors",
                    store.len(),
                    index.len()
                ),
            ));
        }
        if let Some(expected) = index.paired_store() {
            let actual = store.digest()?;
            if actual != expected {
                return Err(RecommendError::corrupt(
                    path,
                    "store does not match the index it is paired with",
                ));
            }
        }

        Ok(store)
    }
}
