//! # Retrieval
//!
//! Query-time half of the pipeline: embed the query, search the index, map
//! positions back to catalog entries and narrow them with the optional
//! category and price filters.
//!
//! ## Filters
//! Filters only ever remove entries from the `k` nearest; they never pull in
//! entries from further away, so a narrow filter can legitimately leave
//! nothing. An empty result is an `Ok`, a failed embedding call is an `Err`.
//!
//! | Filter   | Entry with structured field             | Legacy entry (text only)                        |
//! |----------|-----------------------------------------|-------------------------------------------------|
//! | category | case-insensitive equality               | case-insensitive substring of the text          |
//! | price    | `min <= unit_price <= max`              | text contains some integer in `[min, max]`      |
//!
//! The legacy price check is a heuristic: any number in the text counts, so
//! "confezione da 25" matches a `20..=30` range regardless of the price.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::catalog::CatalogEntry;
use crate::catalog_index::CatalogHandle;
use crate::embedding::Embedder;
use crate::error::{RecommendError, Result};
use crate::retry::RetryPolicy;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("static regex"));

/// One retrieved product with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedProduct {
    pub entry: CatalogEntry,
    /// Squared Euclidean distance; smaller is closer.
    pub distance: f32,
}

/// Retrieved products, nearest first.
pub type RetrievalResult = Vec<RetrievedProduct>;

/// Inclusive price bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(RecommendError::Config(format!(
                "invalid price range {min}..={max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Build a range from optional CLI-style bounds; `None` when both are unset.
    pub fn from_bounds(min: Option<f64>, max: Option<f64>) -> Result<Option<Self>> {
        match (min, max) {
            (None, None) => Ok(None),
            (min, max) => Self::new(min.unwrap_or(0.0), max.unwrap_or(f64::INFINITY)).map(Some),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        self.min <= price && price <= self.max
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        match entry.unit_price {
            Some(price) => self.contains(price),
            None => self.text_mentions_integer_in_range(&entry.text),
        }
    }

    // Every canonical integer written inside a digit run is a candidate.
    // Extending a candidate only grows it, so each start stops at the first
    // value past `hi` and the scan stays linear in the run length.
    fn text_mentions_integer_in_range(&self, text: &str) -> bool {
        let lo = self.min.ceil();
        let hi = self.max.floor();
        if lo > hi {
            return false;
        }

        DIGIT_RUN.find_iter(text).any(|run| {
            let digits = run.as_str().as_bytes();
            (0..digits.len()).any(|start| {
                if digits[start] == b'0' {
                    return lo <= 0.0 && 0.0 <= hi;
                }
                let mut value: u128 = 0;
                for &digit in &digits[start..] {
                    value = match value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(u128::from(digit - b'0')))
                    {
                        Some(v) => v,
                        None => return false,
                    };
                    let candidate = value as f64;
                    if candidate > hi {
                        return false;
                    }
                    if candidate >= lo {
                        return true;
                    }
                }
                false
            })
        })
    }
}

/// Whether `entry` passes the category filter.
///
/// `None`, a blank string and `"all"` (any case) accept everything.
pub fn category_matches(filter: Option<&str>, entry: &CatalogEntry) -> bool {
    let Some(wanted) = active_category(filter) else {
        return true;
    };
    let wanted = wanted.to_lowercase();

    match entry.category.as_deref() {
        Some(category) => category.trim().to_lowercase() == wanted,
        None => entry.text.to_lowercase().contains(&wanted),
    }
}

fn active_category(filter: Option<&str>) -> Option<&str> {
    filter
        .map(str::trim)
        .filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("all"))
}

/// Embeds queries and answers them against the live catalog.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    catalog: Arc<CatalogHandle>,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, catalog: Arc<CatalogHandle>, retry: RetryPolicy) -> Self {
        Self {
            embedder,
            catalog,
            retry,
        }
    }

    /// Up to `k` products nearest to `query` that pass both filters.
    ///
    /// # Errors
    /// - [`RecommendError::Unavailable`] when the embedding service kept
    ///   failing transiently; [`RecommendError::Fatal`] when it refused.
    /// - [`RecommendError::EmptyIndex`] / [`RecommendError::DimensionMismatch`]
    ///   from the index.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        category: Option<&str>,
        price: Option<PriceRange>,
    ) -> Result<RetrievalResult> {
        let embedder = self.embedder.as_ref();
        let vector = self.retry.run(move || embedder.embed(query)).await?;

        let catalog = self.catalog.snapshot();
        let neighbors = catalog.index().search(&vector, k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let entry = catalog.store().get(neighbor.position).ok_or_else(|| {
                RecommendError::corrupt(
                    "<memory>",
                    format!("no text for index position {}", neighbor.position),
                )
            })?;
            results.push(RetrievedProduct {
                entry: entry.clone(),
                distance: neighbor.distance,
            });
        }

        let found = results.len();
        results.retain(|r| {
            category_matches(category, &r.entry) && price.is_none_or(|p| p.matches(&r.entry))
        });

        debug!(
            "Retrieved {} of {} nearest products for {:?}",
            results.len(),
            found,
            query
        );
        Ok(results)
    }
}
