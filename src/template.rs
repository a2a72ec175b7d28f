//! # Template loading and structure
//!
//! A template is the curated, deploy-time half of every prompt: the
//! instruction line, an ordered list of few-shot exemplars, and the speaker
//! labels used when the prompt is flattened to text.
//!
//! Templates live under the application's configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! Two flavors ship built in and are written there by `vetrina init`:
//! - `product_recommendation`: points the user at the best-fitting product.
//! - `usage_advice`: explains how to use or choose between products.
//!
//! ## YAML example
//!
//! ```yaml
//! instruction: "Sei un assistente vendita di ferramenta e cancelleria. Rispondi consigliando il prodotto più adatto."
//! exemplars:
//!   - user: "Ho bisogno di etichette adesive"
//!     assistant: "Ti consiglio le etichette adesive Navigator, confezione da 25 pezzi, Prezzo: 27.71€"
//! # Optional, shown with their defaults:
//! # user_label: "Utente"
//! # assistant_label: "Assistente"
//! # context_header: "Prodotti disponibili nel catalogo:"
//! ```
//!
//! ## Behavior notes
//! - [`load_template`] reads the config directory first and falls back to the
//!   built-in flavor of the same name when no file exists.
//! - Exemplar order is preserved exactly; it is part of the prompt.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::info;

use crate::error::{RecommendError, Result};

pub const PRODUCT_RECOMMENDATION: &str = "product_recommendation";
pub const USAGE_ADVICE: &str = "usage_advice";

/// One curated user/assistant exchange.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FewShotExample {
    pub user: String,
    pub assistant: String,
}

impl FewShotExample {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Instruction, exemplars and labels for one prompt flavor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecommendationTemplate {
    /// Opening line that conditions the model.
    pub instruction: String,

    /// Exemplars rendered, in order, before the live query.
    #[serde(default)]
    pub exemplars: Vec<FewShotExample>,

    #[serde(default = "default_user_label")]
    pub user_label: String,

    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,

    /// Line introducing the retrieved products.
    #[serde(default = "default_context_header")]
    pub context_header: String,
}

fn default_user_label() -> String {
    "Utente".to_string()
}

fn default_assistant_label() -> String {
    "Assistente".to_string()
}

fn default_context_header() -> String {
    "Prodotti disponibili nel catalogo:".to_string()
}

impl RecommendationTemplate {
    pub fn new(instruction: impl Into<String>, exemplars: Vec<FewShotExample>) -> Self {
        Self {
            instruction: instruction.into(),
            exemplars,
            user_label: default_user_label(),
            assistant_label: default_assistant_label(),
            context_header: default_context_header(),
        }
    }

    /// The sales-assistant flavor: recommend the most suitable product.
    pub fn product_recommendation() -> Self {
        Self::new(
            "Sei un assistente vendita di ferramenta e cancelleria. Rispondi consigliando il prodotto più adatto.",
            vec![
                FewShotExample::new(
                    "Voglio un trapano",
                    "Ti consiglio un avvitatore XYZ, perfetto per legno, Marca ABC, Prezzo: 39.99",
                ),
                FewShotExample::new(
                    "Mi serve una chiave inglese",
                    "Ti suggerisco la chiave inglese LMN, regolabile da 8 a 24 mm, Marca OPQ, Prezzo: 12.50",
                ),
                FewShotExample::new(
                    "Ho bisogno di etichette adesive",
                    "Ti consiglio le etichette adesive Navigator, confezione da 25 pezzi, Prezzo: 27.71€, made in Spagna, codice 602EF",
                ),
                FewShotExample::new(
                    "Mi serve un evidenziatore giallo",
                    "Ti suggerisco l'evidenziatore giallo Pilot, confezione da 50 pezzi, Prezzo: 19.35€, provenienza UK, codice 715EF",
                ),
                FewShotExample::new(
                    "Vorrei dei gessetti colorati",
                    "Ti consiglio i gessetti colorati Navigator, confezione da 20 pezzi, Prezzo: 617.00€, provenienza Germania, codice 204CD",
                ),
                FewShotExample::new(
                    "Cerco cartucce per stampante",
                    "Ti suggerisco le cartucce per stampante Navigator, confezione da 100 pezzi, Prezzo: 37.54€, provenienza Cina, codice 152MN",
                ),
            ],
        )
    }

    /// The advice flavor: explain how to use or pick between products.
    pub fn usage_advice() -> Self {
        Self::new(
            "Sei un esperto di ferramenta e cancelleria. Spiega in modo pratico come usare i prodotti o come scegliere tra quelli disponibili.",
            vec![
                FewShotExample::new(
                    "Come scelgo la punta per forare il legno?",
                    "Usa una punta elicoidale per legno con centratore, dello stesso diametro del tassello. Con l'avvitatore XYZ di ABC lavora a velocità media senza percussione.",
                ),
                FewShotExample::new(
                    "La chiave inglese scivola sul dado, cosa sbaglio?",
                    "Stringi la ganascia fino a toccare entrambi i lati del dado e tira verso la parte fissa. La chiave inglese LMN di OPQ si regola da 8 a 24 mm.",
                ),
                FewShotExample::new(
                    "Le etichette si staccano dalle buste, perché?",
                    "Applicale su superfici pulite e asciutte e premi per qualche secondo. Le etichette adesive Navigator aderiscono meglio a temperatura ambiente.",
                ),
            ],
        )
    }

    /// A built-in flavor by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            PRODUCT_RECOMMENDATION => Some(Self::product_recommendation()),
            USAGE_ADVICE => Some(Self::usage_advice()),
            _ => None,
        }
    }

    /// Every built-in flavor with its file name stem.
    pub fn builtins() -> [(&'static str, Self); 2] {
        [
            (PRODUCT_RECOMMENDATION, Self::product_recommendation()),
            (USAGE_ADVICE, Self::usage_advice()),
        ]
    }
}

/// Read a template from an explicit YAML file.
pub fn load_template_file(path: &Path) -> Result<RecommendationTemplate> {
    info!("Loading template: {}", path.display());
    let content = fs::read_to_string(path)?;
    let template: RecommendationTemplate = serde_yaml::from_str(&content)
        .map_err(|e| RecommendError::Template(format!("{}: {e}", path.display())))?;

    if template.instruction.trim().is_empty() {
        return Err(RecommendError::Template(format!(
            "{}: instruction is empty",
            path.display()
        )));
    }
    Ok(template)
}

/// Load a template by name from the user's config directory.
///
/// Resolves `<config_dir>/templates/<name>.yaml`. When that file is absent and
/// `name` is a built-in flavor, the built-in is returned.
///
/// # Errors
/// [`RecommendError::Template`] for unknown names and malformed YAML.
pub fn load_template(name: &str) -> Result<RecommendationTemplate> {
    let path = crate::config_dir()?.join(format!("templates/{name}.yaml"));
    if path.exists() {
        return load_template_file(&path);
    }

    RecommendationTemplate::builtin(name)
        .inspect(|_| info!("Using built-in template: {}", name))
        .ok_or_else(|| RecommendError::Template(format!("no template named `{name}`")))
}

/// Write `template` as YAML to `path`, creating parent directories.
pub fn write_template(path: &Path, template: &RecommendationTemplate) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(template)
        .map_err(|e| RecommendError::Template(format!("{}: {e}", path.display())))?;
    fs::write(path, yaml)?;
    Ok(())
}
