//! # Template loading and structure
//!
//! A template is a small YAML document that decides how a prompt reads:
//! - a `system_prompt` to steer the model,
//! - `instructions` placed at the top of the user message (for Q&A: answer only from the
//!   supplied context; for the agent: the ReAct reply format),
//! - optional `pre_question` / `post_question` strings wrapped around the question or goal.
//!
//! Templates live per user under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! `gw init` writes [`PromptTemplate::qa`] as `qa.yaml` and [`PromptTemplate::agent`] as
//! `agent.yaml`. When no file exists the built-in default is used.
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "You answer questions about 19th century novels."
//! instructions: "Answer only from the context below."
//! post_question: "Quote the passage you relied on."
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use tracing::{debug, info};

use crate::error::Result;

/// Name of the built-in retrieval template.
pub const QA_TEMPLATE: &str = "qa";
/// Name of the built-in agent template.
pub const AGENT_TEMPLATE: &str = "agent";

/// A reusable prompt template.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Sent as the system message.
    pub system_prompt: String,

    /// Leads the user message.
    pub instructions: String,

    /// Extra text placed right before the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_question: Option<String>,

    /// Extra text placed right after the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_question: Option<String>,
}

impl PromptTemplate {
    /// Grounded question answering.
    pub fn qa() -> Self {
        Self {
            system_prompt: "You are a careful research assistant. You answer questions using \
                only the passages you are given."
                .to_string(),
            instructions: "Answer the question using only the context below. If the context \
                does not contain the answer, say that you don't know."
                .to_string(),
            pre_question: None,
            post_question: None,
        }
    }

    /// ReAct style tool use.
    pub fn agent() -> Self {
        Self {
            system_prompt: "You are an assistant that completes goals by calling tools. \
                You never invent tool results."
                .to_string(),
            instructions: "Work step by step. Every reply must use exactly one of these forms:\n\
                \n\
                Thought: <your reasoning>\n\
                Action: <tool name>\n\
                Action Input: <input for the tool>\n\
                \n\
                or, once you know the answer:\n\
                \n\
                Thought: <your reasoning>\n\
                Final Answer: <the answer>\n\
                \n\
                Do not write the Observation yourself; it is filled in with the tool output."
                .to_string(),
            pre_question: None,
            post_question: None,
        }
    }

    /// Built-in template for `name`, if there is one.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            QA_TEMPLATE => Some(Self::qa()),
            AGENT_TEMPLATE => Some(Self::agent()),
            _ => None,
        }
    }

    /// `text` wrapped in the optional pre/post question strings.
    pub fn decorate(&self, text: &str) -> String {
        let mut out = String::new();
        if let Some(pre) = &self.pre_question {
            out.push_str(pre);
            out.push('\n');
        }
        out.push_str(text);
        if let Some(post) = &self.post_question {
            out.push('\n');
            out.push_str(post);
        }
        out
    }
}

/// Load a template by name from the user's config directory, falling back to the built-in one.
///
/// # Errors
/// I/O or YAML errors for a template file that exists but cannot be read, and a config error
/// when neither a file nor a built-in template named `name` exists.
pub fn load_template(name: &str) -> Result<PromptTemplate> {
    load_template_from(&crate::config_dir()?.join("templates"), name)
}

/// Load `<dir>/<name>.yaml`, falling back to the built-in template.
pub fn load_template_from(dir: &Path, name: &str) -> Result<PromptTemplate> {
    let path = dir.join(format!("{name}.yaml"));
    if path.is_file() {
        info!("Loading template: {}", path.display());
        let content = fs::read_to_string(&path)?;
        return Ok(serde_yaml::from_str(&content)?);
    }

    debug!("No template at {}, using built-in", path.display());
    PromptTemplate::builtin(name).ok_or_else(|| {
        crate::error::Error::Config(format!(
            "template `{name}` not found at {}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_template_valid_file() {
        let dir = tempdir().unwrap();
        let file_content = r#"
system_prompt: "You are a helpful assistant."
instructions: "Use the context."
post_question: "Be brief."
"#;
        fs::write(dir.path().join("short.yaml"), file_content).unwrap();

        let template = load_template_from(dir.path(), "short").unwrap();
        assert_eq!(template.system_prompt, "You are a helpful assistant.");
        assert_eq!(template.pre_question, None);
        assert_eq!(template.decorate("Why?"), "Why?\nBe brief.");
    }

    #[test]
    fn test_file_overrides_builtin() {
        let dir = tempdir().unwrap();
        let custom = PromptTemplate {
            system_prompt: "Custom".into(),
            ..PromptTemplate::qa()
        };
        fs::write(
            dir.path().join("qa.yaml"),
            serde_yaml::to_string(&custom).unwrap(),
        )
        .unwrap();

        assert_eq!(load_template_from(dir.path(), QA_TEMPLATE).unwrap(), custom);
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        let template = load_template_from(dir.path(), AGENT_TEMPLATE).unwrap();
        assert_eq!(template, PromptTemplate::agent());
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_template_from(dir.path(), "nope").is_err());
    }

    #[test]
    fn test_load_template_invalid_format() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.yaml"), "invalid: template: format").unwrap();
        assert!(load_template_from(dir.path(), "broken").is_err());
    }
}
