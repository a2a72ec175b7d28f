//! In-crate test doubles for the embedding service.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embedding::Embedder;
use crate::error::{RecommendError, Result};

const VOCABULARY: &[&str] = &[
    "etichette",
    "adesive",
    "evidenziatore",
    "giallo",
    "gessetti",
    "colorati",
    "cartucce",
    "stampante",
    "trapano",
    "avvitatore",
    "legno",
    "chiave",
    "inglese",
    "regolabile",
    "navigator",
    "pilot",
    "confezione",
];

/// Deterministic embedder: one dimension per vocabulary word, valued by how
/// often the word occurs in the lowercased text.
#[derive(Debug, Default, Clone)]
pub struct VocabularyEmbedder;

impl VocabularyEmbedder {
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        VOCABULARY
            .iter()
            .map(|word| tokens.iter().filter(|t| *t == word).count() as f32)
            .collect()
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn model(&self) -> &str {
        "vocabulary"
    }
}

/// Fails transiently for the first `failures` calls, then delegates.
#[derive(Debug)]
pub struct FlakyEmbedder<E> {
    inner: E,
    failures: usize,
    calls: AtomicUsize,
}

impl<E> FlakyEmbedder<E> {
    pub fn new(inner: E, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for FlakyEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(RecommendError::Transient {
                service: "embeddings",
                message: "scripted failure".into(),
            });
        }
        self.inner.embed(text).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
