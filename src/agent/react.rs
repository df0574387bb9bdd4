//! Parsing of ReAct style model replies.
//!
//! ```text
//! Thought: I should look the show up.
//! Action: search_shows
//! Action Input: Twin Peaks
//! ```
//!
//! or
//!
//! ```text
//! Thought: I know enough.
//! Final Answer: It premiered in 1990.
//! ```
//!
//! Anything from an `Observation:` line onwards is ignored: observations come from tools, never
//! from the model.

const THOUGHT: &str = "Thought:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";
const FINAL_ANSWER: &str = "Final Answer:";

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Action {
        thought: String,
        tool: String,
        input: String,
    },
    Final {
        thought: String,
        answer: String,
    },
    /// Neither a usable action nor a final answer.
    Malformed { thought: String, reason: String },
}

/// Interpret one model reply.
pub fn parse_reply(text: &str) -> Reply {
    let text = match find_marker(text, OBSERVATION) {
        Some(pos) => &text[..pos],
        None => text,
    };

    let action = find_marker(text, ACTION);
    let answer = find_marker(text, FINAL_ANSWER);
    let first_marker = [action, answer].into_iter().flatten().min();
    let thought = thought(text, first_marker);

    match (action, answer) {
        (Some(a), f) if f.is_none_or(|f| a < f) => parse_action(text, a, answer, thought),
        (_, Some(f)) => {
            // A later `Action:` is a second decision, not part of the answer.
            let end = action.filter(|&a| a > f).unwrap_or(text.len());
            Reply::Final {
                thought,
                answer: text[f + FINAL_ANSWER.len()..end].trim().to_string(),
            }
        }
        _ => Reply::Malformed {
            thought,
            reason: "the reply has neither an `Action:` nor a `Final Answer:` line".into(),
        },
    }
}

fn parse_action(text: &str, at: usize, answer: Option<usize>, thought: String) -> Reply {
    let rest = &text[at + ACTION.len()..];
    let tool = rest
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .to_string();
    if tool.is_empty() {
        return Reply::Malformed {
            thought,
            reason: "`Action:` names no tool".into(),
        };
    }

    let Some(input_at) = find_marker(text, ACTION_INPUT).filter(|&i| i > at) else {
        return Reply::Malformed {
            thought,
            reason: format!("`Action: {tool}` has no `Action Input:` line"),
        };
    };
    let end = answer.filter(|&f| f > input_at).unwrap_or(text.len());
    let input = text[input_at + ACTION_INPUT.len()..end].trim();
    let input = strip_quotes(input).to_string();

    Reply::Action {
        thought,
        tool,
        input,
    }
}

fn thought(text: &str, first_marker: Option<usize>) -> String {
    let head = &text[..first_marker.unwrap_or(text.len())];
    match find_marker(head, THOUGHT) {
        Some(pos) => head[pos + THOUGHT.len()..].trim().to_string(),
        None => head.trim().to_string(),
    }
}

/// Byte offset of `marker` at the start of a line.
fn find_marker(text: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if line.trim_start().starts_with(marker) {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

fn strip_quotes(input: &str) -> &str {
    for quote in ['"', '\''] {
        if input.len() >= 2 && input.starts_with(quote) && input.ends_with(quote) {
            return &input[1..input.len() - 1];
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_action() {
        let reply = parse_reply(
            "Thought: I need the schedule.\nAction: search_shows\nAction Input: \"Twin Peaks\"\n",
        );
        assert_eq!(
            reply,
            Reply::Action {
                thought: "I need the schedule.".into(),
                tool: "search_shows".into(),
                input: "Twin Peaks".into(),
            }
        );
    }

    #[test]
    fn test_parses_final_answer() {
        let reply = parse_reply("Thought: Done.\nFinal Answer: It premiered in 1990.\nTwo lines.");
        assert_eq!(
            reply,
            Reply::Final {
                thought: "Done.".into(),
                answer: "It premiered in 1990.\nTwo lines.".into(),
            }
        );
    }

    #[test]
    fn test_ignores_invented_observations() {
        let reply = parse_reply(
            "Thought: look it up\nAction: lookup\nAction Input: x\nObservation: made up\nFinal Answer: wrong",
        );
        assert!(matches!(reply, Reply::Action { ref tool, ref input, .. } if tool == "lookup" && input == "x"));
    }

    #[test]
    fn test_first_decision_wins() {
        let reply = parse_reply("Final Answer: 42\nAction: lookup\nAction Input: x");
        assert_eq!(
            reply,
            Reply::Final {
                thought: String::new(),
                answer: "42".into(),
            }
        );

        let reply = parse_reply("Thought: sure\nFinal Answer: it ran\nfor two seasons\nAction: lookup");
        assert!(matches!(reply, Reply::Final { ref answer, .. } if answer == "it ran\nfor two seasons"));
    }

    #[test]
    fn test_missing_action_input_is_malformed() {
        let reply = parse_reply("Thought: hmm\nAction: lookup");
        assert!(matches!(reply, Reply::Malformed { .. }));
    }

    #[test]
    fn test_free_text_is_malformed() {
        let reply = parse_reply("I think the answer is probably 42.");
        assert_eq!(
            reply,
            Reply::Malformed {
                thought: "I think the answer is probably 42.".into(),
                reason: "the reply has neither an `Action:` nor a `Final Answer:` line".into(),
            }
        );
    }

    #[test]
    fn test_markers_must_start_a_line() {
        let reply = parse_reply("Thought: the word Action: appears here\nFinal Answer: ok");
        assert!(matches!(reply, Reply::Final { ref answer, .. } if answer == "ok"));
    }
}
