//! Prompt assembly.
//!
//! A [`Prompt`] is an ordered list of [`Turn`]s that flattens to a single text
//! blob:
//!
//! ```text
//! {instruction}
//! Utente: {exemplar user}
//! Assistente: {exemplar assistant}
//! ...
//! Prodotti disponibili nel catalogo:
//! 1. {retrieved text}
//! ...
//! Utente: {query}
//! Assistente:
//! ```
//!
//! Assembly is pure: the same inputs always give byte-identical output.
//! Nothing is truncated; [`Prompt::token_count`] lets callers decide what to
//! do with an oversized prompt.

use once_cell::sync::OnceCell;
use tiktoken_rs::{CoreBPE, cl100k_base};

use crate::error::{RecommendError, Result};
use crate::template::{FewShotExample, RecommendationTemplate};

static BPE: OnceCell<CoreBPE> = OnceCell::new();

#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    Instruction(String),
    Exemplar { user: String, assistant: String },
    /// Retrieved catalog texts, in retrieval order.
    Context(Vec<String>),
    /// The live, unanswered user message.
    Query(String),
}

/// Speaker labels and the context heading.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    pub user: String,
    pub assistant: String,
    pub context_header: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            user: "Utente".to_string(),
            assistant: "Assistente".to_string(),
            context_header: "Prodotti disponibili nel catalogo:".to_string(),
        }
    }
}

impl From<&RecommendationTemplate> for Labels {
    fn from(template: &RecommendationTemplate) -> Self {
        Self {
            user: template.user_label.clone(),
            assistant: template.assistant_label.clone(),
            context_header: template.context_header.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    turns: Vec<Turn>,
    labels: Labels,
}

/// Instruction, exemplars in order, then the live query.
pub fn assemble(instruction: &str, exemplars: &[FewShotExample], query: &str) -> Prompt {
    assemble_with_context::<&str>(instruction, exemplars, &[], query)
}

/// Like [`assemble`], with one context turn before the query.
///
/// An empty `context` adds no turn, so the result equals [`assemble`]'s.
pub fn assemble_with_context<S: AsRef<str>>(
    instruction: &str,
    exemplars: &[FewShotExample],
    context: &[S],
    query: &str,
) -> Prompt {
    let mut turns = Vec::with_capacity(exemplars.len() + 3);
    turns.push(Turn::Instruction(instruction.to_string()));
    turns.extend(exemplars.iter().map(|e| Turn::Exemplar {
        user: e.user.clone(),
        assistant: e.assistant.clone(),
    }));
    if !context.is_empty() {
        turns.push(Turn::Context(
            context.iter().map(|c| c.as_ref().to_string()).collect(),
        ));
    }
    turns.push(Turn::Query(query.to_string()));

    Prompt {
        turns,
        labels: Labels::default(),
    }
}

impl Prompt {
    /// Assemble from a template, using its labels.
    pub fn from_template<S: AsRef<str>>(
        template: &RecommendationTemplate,
        context: &[S],
        query: &str,
    ) -> Self {
        assemble_with_context(&template.instruction, &template.exemplars, context, query)
            .with_labels(Labels::from(template))
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Flatten to the text sent to the model.
    pub fn render(&self) -> String {
        let Labels {
            user,
            assistant,
            context_header,
        } = &self.labels;
        let mut out = String::new();

        for turn in &self.turns {
            match turn {
                Turn::Instruction(text) => out.push_str(&format!("{text}\n")),
                Turn::Exemplar {
                    user: u,
                    assistant: a,
                } => out.push_str(&format!("{user}: {u}\n{assistant}: {a}\n")),
                Turn::Context(items) => {
                    out.push_str(&format!("{context_header}\n"));
                    for (i, item) in items.iter().enumerate() {
                        out.push_str(&format!("{}. {item}\n", i + 1));
                    }
                }
                Turn::Query(query) => out.push_str(&format!("{user}: {query}\n{assistant}:")),
            }
        }
        out
    }

    /// Size of the rendered prompt in `cl100k_base` tokens.
    pub fn token_count(&self) -> Result<usize> {
        let bpe = BPE
            .get_or_try_init(cl100k_base)
            .map_err(|e| RecommendError::Template(format!("tokenizer unavailable: {e}")))?;
        Ok(bpe.encode_with_special_tokens(&self.render()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTRUCTION: &str =
        "Sei un assistente vendita di ferramenta e cancelleria. Rispondi consigliando il prodotto più adatto.";

    fn exemplars() -> Vec<FewShotExample> {
        vec![
            FewShotExample::new("Voglio un trapano", "Ti consiglio un avvitatore XYZ"),
            FewShotExample::new("Mi serve una chiave inglese", "Ti suggerisco la chiave LMN"),
        ]
    }

    #[test]
    fn two_exemplars_make_four_turns() {
        let prompt = assemble(INSTRUCTION, &exemplars(), "Cerco un martello");

        assert_eq!(prompt.turns().len(), 4);
        assert!(matches!(prompt.turns()[0], Turn::Instruction(_)));
        assert!(matches!(prompt.turns()[3], Turn::Query(_)));
        assert_eq!(
            prompt.render(),
            format!(
                "{INSTRUCTION}\n\
                 Utente: Voglio un trapano\nAssistente: Ti consiglio un avvitatore XYZ\n\
                 Utente: Mi serve una chiave inglese\nAssistente: Ti suggerisco la chiave LMN\n\
                 Utente: Cerco un martello\nAssistente:"
            )
        );
    }

    #[test]
    fn assembly_is_deterministic() {
        let a = assemble(INSTRUCTION, &exemplars(), "etichette").render();
        let b = assemble(INSTRUCTION, &exemplars(), "etichette").render();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_context_matches_plain_assembly() {
        let none: [&str; 0] = [];
        assert_eq!(
            assemble_with_context(INSTRUCTION, &exemplars(), &none, "q"),
            assemble(INSTRUCTION, &exemplars(), "q")
        );
    }

    #[test]
    fn plain_assembly_has_no_context_turn() {
        let prompt = assemble("Istruzione", &[], "etichette");
        assert!(!prompt.turns().iter().any(|t| matches!(t, Turn::Context(_))));
        assert_eq!(prompt.render(), "Istruzione\nUtente: etichette\nAssistente:");
    }

    #[test]
    fn context_is_numbered_before_query() {
        let context = [
            "Etichette adesive Navigator confezione da 25 Prezzo: 27.71",
            "Evidenziatore giallo Pilot confezione da 50 Prezzo: 19.35",
        ];
        let rendered = assemble_with_context("Istruzione", &[], &context, "etichette").render();
        assert_eq!(
            rendered,
            "Istruzione\n\
             Prodotti disponibili nel catalogo:\n\
             1. Etichette adesive Navigator confezione da 25 Prezzo: 27.71\n\
             2. Evidenziatore giallo Pilot confezione da 50 Prezzo: 19.35\n\
             Utente: etichette\nAssistente:"
        );
    }

    #[test]
    fn template_labels_are_used() {
        let mut template = RecommendationTemplate::new("Be brief.", exemplars()[..1].to_vec());
        template.user_label = "User".into();
        template.assistant_label = "Assistant".into();

        let rendered = Prompt::from_template(&template, &[] as &[String], "hammer").render();
        assert!(rendered.starts_with("Be brief.\nUser: Voglio un trapano\nAssistant:"));
        assert!(rendered.ends_with("User: hammer\nAssistant:"));
    }

    #[test]
    fn token_count_grows_with_prompt() {
        let short = assemble("Ciao", &[], "x");
        let long = assemble(INSTRUCTION, &exemplars(), "Cerco cartucce per stampante");
        let (s, l) = (short.token_count().unwrap(), long.token_count().unwrap());
        assert!(s > 0);
        assert!(l > s);
    }
}
