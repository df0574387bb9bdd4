//! # Prompt assembly
//!
//! Turns a question and its ranked passages into the two messages sent to the chat model.
//!
//! The context is budgeted either in characters or in `cl100k_base` tokens. Passages are
//! taken in rank order and joined with [`CONTEXT_SEPARATOR`]; the budget covers that whole
//! joined string, separators included. The longest rank-order prefix that fits is kept:
//! passages are never cut in half, so the lowest-ranked ones are dropped first.

use serde::{Deserialize, Serialize};
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::error::{Error, Result};
use crate::template::PromptTemplate;
use crate::vector_store::ScoredChunk;

/// Placed between two passages in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Size limit for the context block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    Chars(usize),
    /// Counted with the `cl100k_base` BPE.
    Tokens(usize),
}

impl Budget {
    pub fn limit(&self) -> usize {
        match self {
            Budget::Chars(n) | Budget::Tokens(n) => *n,
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Budget::Chars(_) => "chars",
            Budget::Tokens(_) => "tokens",
        }
    }
}

/// The messages for one grounded question, plus what went into them.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: String,
    pub user: String,
    /// Passages included in the context, in rank order.
    pub used: Vec<ScoredChunk>,
    /// How many ranked passages were left out to respect the budget.
    pub dropped: usize,
}

impl AssembledPrompt {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

pub struct PromptAssembler {
    template: PromptTemplate,
    budget: Budget,
    bpe: Option<CoreBPE>,
}

impl PromptAssembler {
    /// # Errors
    /// [`Error::Budget`] for a zero budget or when the tokenizer cannot be loaded.
    pub fn new(template: PromptTemplate, budget: Budget) -> Result<Self> {
        if budget.limit() == 0 {
            return Err(Error::Budget("context budget must be greater than zero".into()));
        }
        let bpe = match budget {
            Budget::Tokens(_) => Some(cl100k_base().map_err(|e| Error::Budget(e.to_string()))?),
            Budget::Chars(_) => None,
        };
        Ok(Self {
            template,
            budget,
            bpe,
        })
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Size of `text` in budget units.
    pub fn measure(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.chars().count(),
        }
    }

    /// Build the prompt for `question` from passages given in rank order.
    ///
    /// # Errors
    /// [`Error::EmptyCorpus`] with no passages, [`Error::Budget`] when even the top passage
    /// does not fit.
    pub fn assemble(&self, question: &str, ranked: &[ScoredChunk]) -> Result<AssembledPrompt> {
        let Some(top) = ranked.first() else {
            return Err(Error::EmptyCorpus);
        };

        let limit = self.budget.limit();
        let mut context = String::new();
        let mut used = Vec::new();
        for hit in ranked {
            let candidate = if used.is_empty() {
                hit.chunk.text.clone()
            } else {
                format!("{context}{CONTEXT_SEPARATOR}{}", hit.chunk.text)
            };
            if self.measure(&candidate) > limit {
                break;
            }
            context = candidate;
            used.push(hit.clone());
        }

        if used.is_empty() {
            return Err(Error::Budget(format!(
                "top passage {} is {} {} but the context budget is {limit}",
                top.chunk.id,
                self.measure(&top.chunk.text),
                self.budget.unit()
            )));
        }

        let dropped = ranked.len() - used.len();
        if dropped > 0 {
            warn!(
                "Context budget of {limit} {} kept {} of {} passages",
                self.budget.unit(),
                used.len(),
                ranked.len()
            );
        }
        debug!(
            "Context is {} {}",
            self.measure(&context),
            self.budget.unit()
        );

        let user = format!(
            "{}\n\nContext:\n{context}\n\nQuestion: {}",
            self.template.instructions,
            self.template.decorate(question)
        );

        Ok(AssembledPrompt {
            system: self.template.system_prompt.clone(),
            user,
            used,
            dropped,
        })
    }
}
