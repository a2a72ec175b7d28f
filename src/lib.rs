//! # Vetrina (library root)
//!
//! Retrieval-augmented product recommendations for a hardware and stationery
//! catalog.
//!
//! Offline, a catalog is rendered to text ([`catalog`]), embedded through an
//! external service ([`embedding`]) and persisted as a matched pair of files:
//! an exact vector index ([`vector_index`]) and a parallel text store
//! ([`text_store`]), tied together by [`catalog_index`].
//!
//! Online, a query is embedded, the nearest products are retrieved and
//! filtered ([`retrieval`]), combined with curated few-shot exemplars
//! ([`template`]) into one prompt ([`prompt`]) and sent to a chat model
//! ([`api`]).
//!
//! ## Configuration layout
//! Config and templates live under the per-platform directory returned by
//! [`config_dir`]:
//!
//! ```text
//! <config_dir>/config.yaml
//! <config_dir>/templates/product_recommendation.yaml
//! <config_dir>/templates/usage_advice.yaml
//! ```
//!
//! ## Modules
//! - [`api`], [`catalog`], [`catalog_index`], [`commands`], [`config`],
//!   [`embedding`], [`error`], [`prompt`], [`retrieval`], [`retry`],
//!   [`template`], [`text_store`], [`vector_index`]

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod api;
pub mod catalog;
pub mod catalog_index;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
mod persist;
pub mod prompt;
pub mod retrieval;
pub mod retry;
pub mod template;
pub mod text_store;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod test_support;

use error::{RecommendError, Result};

/// Return the per-platform configuration directory.
///
/// Uses [`directories::ProjectDirs`] with `("com", "vetrina", "vetrina")`.
/// The directory is **not** created here.
///
/// # Errors
/// [`RecommendError::Config`] if the platform has no home directory to speak of.
///
/// # Examples
/// ```rust
/// let cfg = vetrina::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "vetrina", "vetrina")
        .ok_or_else(|| RecommendError::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
