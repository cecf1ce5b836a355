use std::ops::{Add, AddAssign};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::message::Message;
use crate::tool::ToolError;

/// Token accounting for one or more completion calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// How a single tool invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    Output(Value),
    /// Name of the agent control was transferred to.
    Handoff(String),
    Failed(ToolError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    /// Raw argument payload as sent by the model.
    pub arguments: String,
    pub outcome: ToolCallOutcome,
    pub duration: Duration,
}

impl ToolCall {
    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            ToolCallOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Escalates a failed call to a run-level error. The runner itself never does this; tool
    /// failures are fed back to the model instead.
    pub fn to_error(&self) -> Option<AgentError> {
        self.error().map(|err| AgentError::Tool {
            name: self.tool_name.clone(),
            source: err.clone(),
        })
    }

    pub fn is_handoff(&self) -> bool {
        matches!(self.outcome, ToolCallOutcome::Handoff(_))
    }
}

/// One turn of the loop: a single completion call and the tools it requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub agent_name: String,
    /// 1-based and contiguous within a run.
    pub step_number: usize,
    pub duration: Duration,
    pub tool_calls: Vec<ToolCall>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Full history: loaded session messages, the caller's messages and everything produced.
    pub messages: Vec<Message>,
    /// The agent active when the loop ended; differs from the starting agent after a handoff.
    pub agent: Arc<Agent>,
    pub usage: Usage,
    pub steps: Vec<Step>,
    /// Text of the last assistant message, or its refusal, or empty.
    pub final_output: String,
}

impl RunResult {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.steps.iter().flat_map(|step| step.tool_calls.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_field_wise() {
        let mut total = Usage::default();
        total += Usage::new(10, 5, 15);
        total += Usage::new(20, 8, 28);
        assert_eq!(total, Usage::new(30, 13, 43));
    }

    #[test]
    fn tool_call_error_accessor() {
        let failed = ToolCall {
            tool_name: "lookup".into(),
            arguments: "{}".into(),
            outcome: ToolCallOutcome::Failed(ToolError::failed("db offline")),
            duration: Duration::ZERO,
        };
        assert_eq!(failed.error().map(ToString::to_string), Some("db offline".into()));
        assert!(!failed.is_handoff());

        let err = failed.to_error().unwrap();
        assert!(err.is(crate::error::ErrorKind::Tool));
        assert_eq!(err.to_string(), "tool `lookup` failed: db offline");
    }
}
