//! # Agent
//!
//! A bounded, tool-using agent loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//!                ┌──────────── observation ────────────┐
//!                ▼                                     │
//! start ──▶ AwaitingThought ──(Action)──▶ ToolCall ────┘
//!                │    ▲
//!                │    └──(malformed reply: format error observation)
//!                ├──(Final Answer)──▶ Answered
//!                └──(max_steps model calls used)──▶ StepLimitExceeded
//! ```
//!
//! Every model call is one [`AgentStep`]. The model sees the goal, the tool list and all
//! previous steps with their observations, in the ReAct format parsed by [`react`].

pub mod react;
pub mod scrape;
pub mod tool;

pub use tool::{FunctionTool, Tool, ToolError, ToolRegistry, ToolRegistryBuilder};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ChatMessage, ChatModel};
use crate::config::GroundworkConfig;
use crate::error::{Error, Result};
use crate::template::PromptTemplate;
use react::{Reply, parse_reply};
use scrape::{HttpFetcher, PageTextTool, ScrapeTool};

/// A tool call chosen by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: String,
}

/// One model call and what came of it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentStep {
    pub thought: String,
    pub action: Option<ToolInvocation>,
    /// Tool output, or the error the model is told about.
    pub observation: Option<String>,
    pub final_answer: Option<String>,
}

impl AgentStep {
    /// The step as the model would have written it.
    fn as_reply(&self) -> String {
        let mut reply = format!("Thought: {}", self.thought);
        if let Some(action) = &self.action {
            reply.push_str(&format!(
                "\nAction: {}\nAction Input: {}",
                action.tool, action.input
            ));
        }
        if let Some(answer) = &self.final_answer {
            reply.push_str(&format!("\nFinal Answer: {answer}"));
        }
        reply
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    AwaitingThought,
    ToolCall(ToolInvocation),
    Answered(String),
    StepLimitExceeded,
}

/// Outcome of a successful session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRun {
    pub answer: String,
    pub steps: Vec<AgentStep>,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    registry: ToolRegistry,
    template: PromptTemplate,
    max_steps: usize,
}

impl Agent {
    /// # Errors
    /// [`Error::Config`] when `max_steps` is zero.
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        template: PromptTemplate,
        max_steps: usize,
    ) -> Result<Self> {
        if max_steps == 0 {
            return Err(Error::Config("max_steps must be greater than zero".into()));
        }
        Ok(Self {
            model,
            registry,
            template,
            max_steps,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Work on `goal` until the model gives a final answer.
    ///
    /// # Errors
    /// [`Error::StepLimitExceeded`] (carrying the transcript) after `max_steps` model calls
    /// without a final answer, and any error from the chat model.
    pub async fn run(&self, goal: &str) -> Result<AgentRun> {
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut state = AgentState::AwaitingThought;

        loop {
            state = match state {
                AgentState::AwaitingThought if steps.len() >= self.max_steps => {
                    AgentState::StepLimitExceeded
                }
                AgentState::AwaitingThought => {
                    let reply = self.model.complete(&self.messages(goal, &steps)).await?;
                    let (step, next) = self.interpret(&reply);
                    info!("Step {}: {}", steps.len() + 1, step.thought);
                    steps.push(step);
                    next
                }
                AgentState::ToolCall(invocation) => {
                    let observation = self
                        .registry
                        .invoke(&invocation.tool, &invocation.input)
                        .await;
                    debug!("Observation: {}", observation);
                    if let Some(step) = steps.last_mut() {
                        step.observation = Some(observation);
                    }
                    AgentState::AwaitingThought
                }
                AgentState::Answered(answer) => {
                    info!("Answered after {} steps", steps.len());
                    return Ok(AgentRun { answer, steps });
                }
                AgentState::StepLimitExceeded => {
                    warn!("No final answer after {} steps", self.max_steps);
                    return Err(Error::StepLimitExceeded {
                        limit: self.max_steps,
                        steps,
                    });
                }
            };
        }
    }

    fn interpret(&self, reply: &str) -> (AgentStep, AgentState) {
        match parse_reply(reply) {
            Reply::Final { thought, answer } => (
                AgentStep {
                    thought,
                    final_answer: Some(answer.clone()),
                    ..AgentStep::default()
                },
                AgentState::Answered(answer),
            ),
            Reply::Action {
                thought,
                tool,
                input,
            } => {
                let invocation = ToolInvocation { tool, input };
                (
                    AgentStep {
                        thought,
                        action: Some(invocation.clone()),
                        ..AgentStep::default()
                    },
                    AgentState::ToolCall(invocation),
                )
            }
            Reply::Malformed { thought, reason } => {
                warn!("Malformed reply: {}", reason);
                (
                    AgentStep {
                        thought,
                        observation: Some(format!(
                            "Error: {reason}. Reply with `Action:` and `Action Input:` lines, \
                             or with a `Final Answer:` line."
                        )),
                        ..AgentStep::default()
                    },
                    AgentState::AwaitingThought,
                )
            }
        }
    }

    fn messages(&self, goal: &str, steps: &[AgentStep]) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(self.template.system_prompt.clone()),
            ChatMessage::user(format!(
                "{}\n\nYou can use these tools:\n{}\n\nGoal: {}",
                self.template.instructions,
                self.registry.describe(),
                self.template.decorate(goal)
            )),
        ];
        for step in steps {
            messages.push(ChatMessage::assistant(step.as_reply()));
            if let Some(observation) = &step.observation {
                messages.push(ChatMessage::user(format!("Observation: {observation}")));
            }
        }
        messages
    }
}

/// The page-text tool plus every scraping tool declared in the configuration.
pub fn registry_from_config(config: &GroundworkConfig) -> Result<ToolRegistry> {
    let fetcher = HttpFetcher::from_config(&config.http)?;
    let mut builder = ToolRegistry::builder().register(PageTextTool::new(fetcher.clone()))?;
    for tool in &config.tools {
        builder = builder.register(ScrapeTool::new(tool.clone(), fetcher.clone())?)?;
    }
    let registry = builder.build();
    debug!("Registered tools: {}", registry.names().join(", "));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Role;
    use crate::testing::ScriptedModel;
    use std::sync::Mutex;

    /// Registry of three tools; every call to `lookup` is recorded.
    fn registry(calls: Arc<Mutex<Vec<String>>>) -> ToolRegistry {
        ToolRegistry::builder()
            .register(FunctionTool::new("lookup", "Look a show up.", move |input: &str| {
                calls.lock().unwrap().push(input.to_string());
                Ok(format!("{input} premiered in 1990"))
            }))
            .unwrap()
            .register(FunctionTool::new("weather", "Weather for a city.", |_: &str| {
                Ok("sunny".to_string())
            }))
            .unwrap()
            .register(FunctionTool::new("add", "Add two integers.", |input: &str| {
                let sum: i64 = input
                    .split('+')
                    .map(|n| n.trim().parse::<i64>())
                    .sum::<std::result::Result<i64, _>>()
                    .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
                Ok(sum.to_string())
            }))
            .unwrap()
            .build()
    }

    fn agent(model: Arc<ScriptedModel>, registry: ToolRegistry, max_steps: usize) -> Agent {
        Agent::new(model, registry, PromptTemplate::agent(), max_steps).unwrap()
    }

    #[tokio::test]
    async fn test_tool_is_invoked_once_and_answer_returned() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model = Arc::new(ScriptedModel::new([
            "Thought: I should look it up.\nAction: lookup\nAction Input: Twin Peaks",
            "Thought: The observation answers it.\nFinal Answer: 1990",
        ]));
        let agent = agent(model.clone(), registry(calls.clone()), 5);

        let run = agent.run("When did Twin Peaks premiere?").await.unwrap();

        assert_eq!(run.answer, "1990");
        assert_eq!(*calls.lock().unwrap(), vec!["Twin Peaks".to_string()]);
        assert_eq!(run.steps.len(), 2);
        assert_eq!(
            run.steps[0].observation.as_deref(),
            Some("Twin Peaks premiered in 1990")
        );
        assert_eq!(run.steps[1].final_answer.as_deref(), Some("1990"));

        // the second call sees the observation of the first
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        let last = prompts[1].last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "Observation: Twin Peaks premiered in 1990");
        assert!(prompts[0][1].content.contains("- lookup: Look a show up."));
        assert!(prompts[0][1].content.contains("Goal: When did Twin Peaks premiere?"));
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_error_observation_and_continues() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model = Arc::new(ScriptedModel::new([
            "Thought: try search\nAction: search\nAction Input: Twin Peaks",
            "Thought: use the right tool\nAction: lookup\nAction Input: Twin Peaks",
            "Final Answer: 1990",
        ]));
        let agent = agent(model, registry(calls.clone()), 5);

        let run = agent.run("When?").await.unwrap();

        assert_eq!(run.answer, "1990");
        let first = run.steps[0].observation.as_deref().unwrap();
        assert!(first.starts_with("Error: no such tool `search`"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tool_errors_and_malformed_replies_are_observations() {
        let model = Arc::new(ScriptedModel::new([
            "Thought: add them\nAction: add\nAction Input: 2 + two",
            "I am not sure what to do.",
            "Action: add\nAction Input: 2 + 2",
            "Final Answer: 4",
        ]));
        let agent = agent(model, registry(Arc::default()), 6);

        let run = agent.run("What is 2 + 2?").await.unwrap();

        assert_eq!(run.answer, "4");
        assert_eq!(run.steps.len(), 4);
        assert!(run.steps[0].observation.as_deref().unwrap().starts_with("Error: invalid input"));
        assert!(run.steps[1].action.is_none());
        assert!(run.steps[1].observation.as_deref().unwrap().starts_with("Error: "));
        assert_eq!(run.steps[2].observation.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_step_limit_is_reported_with_transcript() {
        let model = Arc::new(ScriptedModel::repeating(
            "Thought: again\nAction: weather\nAction Input: Paris",
        ));
        let agent = agent(model.clone(), registry(Arc::default()), 3);

        match agent.run("Loop forever").await {
            Err(Error::StepLimitExceeded { limit, steps }) => {
                assert_eq!(limit, 3);
                assert_eq!(steps.len(), 3);
                assert!(steps.iter().all(|s| s.observation.as_deref() == Some("sunny")));
            }
            other => panic!("expected a step limit error, got {other:?}"),
        }
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_model_errors_are_propagated() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let agent = agent(model, registry(Arc::default()), 2);
        assert!(matches!(agent.run("x").await, Err(Error::Model(_))));
    }

    #[test]
    fn test_zero_step_bound_is_rejected() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let result = Agent::new(model, ToolRegistry::default(), PromptTemplate::agent(), 0);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_registry_from_config_includes_page_tool() {
        let registry = registry_from_config(&GroundworkConfig::default()).unwrap();
        assert_eq!(registry.names(), vec![PageTextTool::NAME]);
    }
}
