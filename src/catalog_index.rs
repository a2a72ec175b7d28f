//! # CatalogIndex
//!
//! The matched pair of [`VectorIndex`] and [`TextStore`] that answers queries.
//!
//! ## Build
//! [`CatalogIndex::build`] renders nothing itself: it takes finished
//! [`CatalogEntry`] values, embeds their texts through an [`Embedder`] with
//! bounded concurrency, and assembles the pair only once every entry has a
//! vector. A failure anywhere aborts the build and leaves the disk untouched.
//!
//! ## Persistence
//! Both files are staged as temporary siblings first and renamed into place
//! only after both are fully written. The index header records the store's
//! digest, so [`CatalogIndex::load`] refuses a pair that did not come from the
//! same build.
//!
//! ## Publication
//! [`CatalogHandle`] lets a long-running process swap in a rebuilt pair while
//! readers keep using the snapshot they already hold.

use std::{
    path::Path,
    sync::{Arc, RwLock},
};

use indicatif::ProgressBar;
use tracing::info;

use crate::catalog::{self, CatalogEntry, ProductRecord};
use crate::embedding::{Embedder, embed_all};
use crate::error::{RecommendError, Result};
use crate::persist;
use crate::retry::RetryPolicy;
use crate::text_store::TextStore;
use crate::vector_index::VectorIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogIndex {
    index: VectorIndex,
    store: TextStore,
}

impl CatalogIndex {
    /// Pair an index with its store.
    ///
    /// # Errors
    /// [`RecommendError::CorruptStore`] if the two disagree on length.
    pub fn from_parts(index: VectorIndex, store: TextStore) -> Result<Self> {
        if index.len() != store.len() {
            return Err(RecommendError::corrupt(
                "<memory>",
                format!(
                    "index holds {} vectors but store holds {} entries",
                    index.len(),
                    store.len()
                ),
            ));
        }
        Ok(Self { index, store })
    }

    /// Render, embed and pair a catalog of product records.
    pub async fn from_records<E>(
        records: &[ProductRecord],
        embedder: &E,
        concurrency: usize,
        retry: &RetryPolicy,
        progress: &ProgressBar,
    ) -> Result<Self>
    where
        E: Embedder + ?Sized,
    {
        let entries = catalog::entries(records)?;
        Self::build(entries, embedder, concurrency, retry, progress).await
    }

    /// Embed `entries` and pair the vectors with their texts, position for
    /// position.
    ///
    /// # Errors
    /// - [`RecommendError::Validation`] for an empty catalog.
    /// - Any embedding failure that survives `retry`.
    /// - [`RecommendError::DimensionMismatch`] if the service returns vectors
    ///   of differing lengths.
    pub async fn build<E>(
        entries: Vec<CatalogEntry>,
        embedder: &E,
        concurrency: usize,
        retry: &RetryPolicy,
        progress: &ProgressBar,
    ) -> Result<Self>
    where
        E: Embedder + ?Sized,
    {
        if entries.is_empty() {
            return Err(RecommendError::validation(0, "catalog is empty"));
        }

        let store = TextStore::new(entries);
        let texts: Vec<String> = store.texts().map(str::to_string).collect();

        progress.set_length(texts.len() as u64);
        let vectors = embed_all(embedder, &texts, concurrency, retry, progress).await?;
        progress.finish();

        let index = VectorIndex::build(vectors)?.with_paired_store(store.digest()?);
        info!(
            "Built catalog index: {} entries, {} dims, model {}",
            index.len(),
            index.dimension(),
            embedder.model()
        );

        Self::from_parts(index, store)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn store(&self) -> &TextStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Write both files; neither destination changes unless both are staged.
    pub fn persist(&self, index_path: &Path, store_path: &Path) -> Result<()> {
        let index_bytes = self.index.encode()?;
        let store_bytes = self.store.encode()?;

        let staged_store = persist::stage(store_path, &store_bytes)?;
        let staged_index = persist::stage(index_path, &index_bytes)?;

        staged_store.publish()?;
        staged_index.publish()?;

        info!(
            "Persisted catalog index to {} and {}",
            index_path.display(),
            store_path.display()
        );
        Ok(())
    }

    /// Load a pair written by [`CatalogIndex::persist`].
    ///
    /// # Errors
    /// [`RecommendError::CorruptStore`] when either file is damaged or they
    /// were not built together.
    pub fn load(index_path: &Path, store_path: &Path) -> Result<Self> {
        let index = VectorIndex::load(index_path)?;
        let store = TextStore::load_paired(store_path, &index)?;
        Ok(Self { index, store })
    }
}

/// Shared, swappable reference to the live [`CatalogIndex`].
///
/// Readers call [`snapshot`](Self::snapshot) once per query and keep the
/// `Arc` for its duration; [`publish`](Self::publish) never disturbs them.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<CatalogIndex>>,
}

impl CatalogHandle {
    pub fn new(catalog: CatalogIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the live pair, returning the one it supersedes.
    pub fn publish(&self, catalog: CatalogIndex) -> Arc<CatalogIndex> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        info!("Publishing catalog index with {} entries", catalog.len());
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FlakyEmbedder, VocabularyEmbedder};
    use std::fs;

    fn record(name: &str, brand: &str, description: &str, price: f64) -> ProductRecord {
        ProductRecord {
            name: Some(name.into()),
            brand: Some(brand.into()),
            description: Some(description.into()),
            unit_price: Some(price),
            category: Some("Cancelleria".into()),
        }
    }

    fn catalog() -> Vec<ProductRecord> {
        vec![
            record("Etichette adesive", "Navigator", "confezione da 25", 27.71),
            record("Evidenziatore giallo", "Pilot", "confezione da 50", 19.35),
            record("Gessetti colorati", "Navigator", "confezione da 20", 617.0),
        ]
    }

    async fn build(records: &[ProductRecord]) -> Result<CatalogIndex> {
        CatalogIndex::from_records(
            records,
            &VocabularyEmbedder::default(),
            2,
            &RetryPolicy::none(),
            &ProgressBar::hidden(),
        )
        .await
    }

    #[tokio::test]
    async fn lengths_agree_with_catalog() {
        let records = catalog();
        let built = build(&records).await.unwrap();
        assert_eq!(built.len(), records.len());
        assert_eq!(built.index().len(), built.store().len());
        assert_eq!(
            built.store().get(1).unwrap().text,
            "Evidenziatore giallo Pilot confezione da 50 Prezzo: 19.35"
        );
    }

    #[tokio::test]
    async fn empty_catalog_is_rejected_before_embedding() {
        // an embedder that always fails proves no request was made
        let embedder = FlakyEmbedder::new(VocabularyEmbedder::default(), usize::MAX);
        let err = CatalogIndex::build(
            Vec::new(),
            &embedder,
            2,
            &RetryPolicy::none(),
            &ProgressBar::hidden(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RecommendError::Validation { .. }));
        assert!(matches!(build(&[]).await, Err(RecommendError::Validation { .. })));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_build() {
        let embedder = FlakyEmbedder::new(VocabularyEmbedder::default(), usize::MAX);
        let err = CatalogIndex::from_records(
            &catalog(),
            &embedder,
            2,
            &RetryPolicy::none(),
            &ProgressBar::hidden(),
        )
        .await
        .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn persisted_pair_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("catalog.vidx");
        let store_path = dir.path().join("catalog.vtxt");

        let built = build(&catalog()).await.unwrap();
        built.persist(&index_path, &store_path).unwrap();

        let loaded = CatalogIndex::load(&index_path, &store_path).unwrap();
        assert_eq!(loaded, built);
        // only the two artifacts, no leftover temporaries
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn mismatched_pair_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = (dir.path().join("a.vidx"), dir.path().join("a.vtxt"));
        let second = (dir.path().join("b.vidx"), dir.path().join("b.vtxt"));

        build(&catalog()).await.unwrap().persist(&first.0, &first.1).unwrap();
        let mut other = catalog();
        other[0].unit_price = Some(1.0);
        build(&other).await.unwrap().persist(&second.0, &second.1).unwrap();

        assert!(matches!(
            CatalogIndex::load(&first.0, &second.1),
            Err(RecommendError::CorruptStore { .. })
        ));
    }

    #[tokio::test]
    async fn handle_swaps_without_disturbing_readers() {
        let first = build(&catalog()).await.unwrap();
        let handle = CatalogHandle::new(first.clone());
        let held = handle.snapshot();

        let smaller = build(&catalog()[..1]).await.unwrap();
        let previous = handle.publish(smaller);

        assert_eq!(*previous, first);
        assert_eq!(held.len(), 3);
        assert_eq!(handle.snapshot().len(), 1);
    }

    #[test]
    fn from_parts_checks_lengths() {
        let index = VectorIndex::build(vec![vec![1.0]]).unwrap();
        let store = TextStore::from_texts(["a", "b"]);
        assert!(matches!(
            CatalogIndex::from_parts(index, store),
            Err(RecommendError::CorruptStore { .. })
        ));
    }
}
