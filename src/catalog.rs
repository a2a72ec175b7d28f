//! # Catalog records and their canonical text
//!
//! A [`ProductRecord`] is one row of the product catalog as it arrives from
//! the merchandising export. [`render`] turns it into the single descriptive
//! string that is both embedded and shown verbatim to users, so the rendering
//! must never depend on anything but the record itself.
//!
//! ```text
//! {name} {brand} {description} Prezzo: {unit_price:.2}
//! ```
//!
//! Catalog files may be JSON (array of objects), YAML (sequence) or CSV
//! (header row). The Italian column names of the merchandising export
//! (`Nome_prodotto`, `Marca`, `Descrizione`, `Prezzo_unitario`, `Categoria`)
//! are accepted as aliases.

use std::{fs, path::Path};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{RecommendError, Result};

/// One structured catalog row.
///
/// Every field is optional at the serde level so a missing column surfaces as
/// a [`RecommendError::Validation`] naming the row, rather than as an opaque
/// parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default, alias = "Nome_prodotto")]
    pub name: Option<String>,

    #[serde(default, alias = "Marca")]
    pub brand: Option<String>,

    #[serde(default, alias = "Descrizione")]
    pub description: Option<String>,

    #[serde(
        default,
        alias = "Prezzo_unitario",
        deserialize_with = "deserialize_price"
    )]
    pub unit_price: Option<f64>,

    #[serde(default, alias = "Categoria")]
    pub category: Option<String>,
}

/// A rendered catalog row, addressed by its position in the index.
///
/// `category` and `unit_price` are the structured fields the filters compare
/// against. Entries recovered from text alone carry `None` for both and fall
/// back to the substring heuristics in [`crate::retrieval`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub position: usize,
    pub text: String,
    pub category: Option<String>,
    pub unit_price: Option<f64>,
}

impl CatalogEntry {
    /// Build an entry from a record, validating it.
    pub fn from_record(position: usize, record: &ProductRecord) -> Result<Self> {
        let text = render_at(record, position)?;
        let category = record
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self {
            position,
            text,
            category,
            unit_price: record.unit_price,
        })
    }

    /// Wrap pre-rendered text with no structured fields.
    pub fn legacy(position: usize, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
            category: None,
            unit_price: None,
        }
    }
}

/// Render a record into its canonical descriptive text.
///
/// # Errors
/// [`RecommendError::Validation`] when `name`, `brand`, `description` or
/// `unit_price` is missing or blank, or the price is negative or not finite.
///
/// # Examples
/// ```
/// use vetrina::catalog::{ProductRecord, render};
///
/// let record = ProductRecord {
///     name: Some("Etichette adesive".into()),
///     brand: Some("Navigator".into()),
///     description: Some("confezione da 25".into()),
///     unit_price: Some(27.71),
///     category: None,
/// };
/// assert_eq!(
///     render(&record).unwrap(),
///     "Etichette adesive Navigator confezione da 25 Prezzo: 27.71"
/// );
/// ```
pub fn render(record: &ProductRecord) -> Result<String> {
    render_at(record, 0)
}

fn render_at(record: &ProductRecord, position: usize) -> Result<String> {
    let name = required_text(record.name.as_deref(), "name", position)?;
    let brand = required_text(record.brand.as_deref(), "brand", position)?;
    let description = required_text(record.description.as_deref(), "description", position)?;

    let price = record
        .unit_price
        .ok_or_else(|| RecommendError::validation(position, "missing field `unit_price`"))?;
    if !price.is_finite() || price < 0.0 {
        return Err(RecommendError::validation(
            position,
            format!("unit_price must be a non-negative number, got {price}"),
        ));
    }

    Ok(format!("{name} {brand} {description} Prezzo: {price:.2}"))
}

fn required_text<'a>(value: Option<&'a str>, field: &str, position: usize) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RecommendError::validation(
            position,
            format!("missing field `{field}`"),
        )),
    }
}

/// Render every record and number the results `0..N-1` in input order.
///
/// # Errors
/// Fails on the first invalid record, and on an empty catalog: an index with
/// no entries can't answer any query, so it is never built.
pub fn entries(records: &[ProductRecord]) -> Result<Vec<CatalogEntry>> {
    if records.is_empty() {
        return Err(RecommendError::validation(0, "catalog is empty"));
    }

    records
        .iter()
        .enumerate()
        .map(|(position, record)| CatalogEntry::from_record(position, record))
        .collect()
}

/// Read product records from a `.json`, `.yaml`/`.yml` or `.csv` file.
pub fn load_catalog(path: &Path) -> Result<Vec<ProductRecord>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    info!("Loading catalog: {}", path.display());

    let records = match extension.as_str() {
        "json" => {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<Vec<ProductRecord>>(&content)
                .map_err(|e| RecommendError::validation(0, format!("invalid JSON catalog: {e}")))?
        }
        "yaml" | "yml" => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str::<Vec<ProductRecord>>(&content)
                .map_err(|e| RecommendError::validation(0, format!("invalid YAML catalog: {e}")))?
        }
        "csv" => read_csv(path)?,
        other => {
            return Err(RecommendError::validation(
                0,
                format!("unsupported catalog format `{other}` for {}", path.display()),
            ));
        }
    };

    debug!("Loaded {} catalog records", records.len());
    Ok(records)
}

fn read_csv(path: &Path) -> Result<Vec<ProductRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| RecommendError::validation(0, format!("failed to open CSV: {e}")))?;

    reader
        .deserialize::<ProductRecord>()
        .enumerate()
        .map(|(position, row)| {
            row.map_err(|e| RecommendError::validation(position, format!("bad CSV row: {e}")))
        })
        .collect()
}

/// Accept prices as numbers or as strings like `"27,71"` / `"27.71€"`.
fn deserialize_price<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    match Option::<Price>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Price::Number(n)) => Ok(Some(n)),
        Some(Price::Text(s)) => {
            let cleaned = s.trim().trim_end_matches('€').trim().replace(',', ".");
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid price `{s}`")))
        }
    }
}
