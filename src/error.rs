use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::guardrails::GuardrailSide;
use crate::result::RunResult;
use crate::session::SessionError;
use crate::tool::ToolError;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type returned by user-supplied callbacks (hooks, guardrails).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fieldless discriminant of [`AgentError`], for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Precondition,
    MaxTurns,
    Timeout,
    Cancelled,
    InputGuardrail,
    OutputGuardrail,
    BeforeHook,
    AfterHook,
    Tool,
    Provider,
    Session,
    Config,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("max turns exceeded ({max_turns})")]
    MaxTurnsExceeded { max_turns: usize },

    #[error("agent execution timeout after {timeout:?}")]
    Timeout { timeout: std::time::Duration },

    #[error("run cancelled")]
    Cancelled,

    #[error("{}", tripwire_message("input", .guardrail, .message))]
    InputGuardrailTripwire {
        guardrail: String,
        message: String,
        metadata: Map<String, Value>,
    },

    #[error("{}", tripwire_message("output", .guardrail, .message))]
    OutputGuardrailTripwire {
        guardrail: String,
        message: String,
        metadata: Map<String, Value>,
    },

    #[error("{side} guardrail '{guardrail}' failed: {source}")]
    GuardrailFailed {
        guardrail: String,
        side: GuardrailSide,
        #[source]
        source: BoxError,
    },

    #[error("before-run hook failed for agent `{agent}`: {source}")]
    BeforeHook {
        agent: String,
        #[source]
        source: BoxError,
    },

    #[error("after-run hook failed for agent `{agent}`: {source}")]
    AfterHook {
        agent: String,
        #[source]
        source: BoxError,
    },

    /// Not raised by the runner, which records tool failures on the step instead; see
    /// [`ToolCall::to_error`](crate::ToolCall::to_error).
    #[error("tool `{name}` failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("failed to {stage} session: {source}")]
    Session {
        stage: SessionStage,
        #[source]
        source: SessionError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Which side of the run a session error happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Load,
    Save,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStage::Load => f.write_str("load"),
            SessionStage::Save => f.write_str("save"),
        }
    }
}

fn tripwire_message(side: &str, guardrail: &str, message: &str) -> String {
    if message.is_empty() {
        format!("{side} guardrail '{guardrail}' triggered")
    } else {
        format!("{side} guardrail '{guardrail}' triggered: {message}")
    }
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Precondition(_) => ErrorKind::Precondition,
            AgentError::MaxTurnsExceeded { .. } => ErrorKind::MaxTurns,
            AgentError::Timeout { .. } => ErrorKind::Timeout,
            AgentError::Cancelled => ErrorKind::Cancelled,
            AgentError::InputGuardrailTripwire { .. } => ErrorKind::InputGuardrail,
            AgentError::OutputGuardrailTripwire { .. } => ErrorKind::OutputGuardrail,
            AgentError::GuardrailFailed { side, .. } => match side {
                GuardrailSide::Input => ErrorKind::InputGuardrail,
                GuardrailSide::Output => ErrorKind::OutputGuardrail,
            },
            AgentError::BeforeHook { .. } => ErrorKind::BeforeHook,
            AgentError::AfterHook { .. } => ErrorKind::AfterHook,
            AgentError::Tool { .. } => ErrorKind::Tool,
            AgentError::LanguageModel(_) => ErrorKind::Provider,
            AgentError::Session { .. } => ErrorKind::Session,
            AgentError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

/// Failure of a whole run.
///
/// `result` is present when the loop completed before the failure was detected: output guardrail
/// tripwires, session save failures and after-run hook failures.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    pub error: AgentError,
    pub result: Option<Box<RunResult>>,
}

impl RunError {
    pub(crate) fn new(error: AgentError) -> Self {
        Self {
            error,
            result: None,
        }
    }

    pub(crate) fn with_result(error: AgentError, result: RunResult) -> Self {
        Self {
            error,
            result: Some(Box::new(result)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    pub fn into_parts(self) -> (AgentError, Option<RunResult>) {
        (self.error, self.result.map(|result| *result))
    }
}

impl From<AgentError> for RunError {
    fn from(error: AgentError) -> Self {
        RunError::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            AgentError::MaxTurnsExceeded { max_turns: 3 }.kind(),
            ErrorKind::MaxTurns
        );
        assert_eq!(
            AgentError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert!(AgentError::Cancelled.is(ErrorKind::Cancelled));
        assert!(!AgentError::Cancelled.is(ErrorKind::Timeout));
        assert!(AgentError::LanguageModel("boom".into()).is(ErrorKind::Provider));
    }

    #[test]
    fn tripwire_display_includes_message_when_present() {
        let err = AgentError::InputGuardrailTripwire {
            guardrail: "pii_detection".into(),
            message: "Detected PII: email".into(),
            metadata: Map::new(),
        };
        assert_eq!(
            err.to_string(),
            "input guardrail 'pii_detection' triggered: Detected PII: email"
        );

        let err = AgentError::OutputGuardrailTripwire {
            guardrail: "url_filter".into(),
            message: String::new(),
            metadata: Map::new(),
        };
        assert_eq!(err.to_string(), "output guardrail 'url_filter' triggered");
    }

    #[test]
    fn guardrail_failures_keep_their_side() {
        let err = RunError::new(AgentError::GuardrailFailed {
            guardrail: "custom".into(),
            side: GuardrailSide::Output,
            source: "backend down".into(),
        });
        assert!(err.is(ErrorKind::OutputGuardrail));
        assert!(err.result.is_none());
        assert_eq!(
            err.to_string(),
            "output guardrail 'custom' failed: backend down"
        );
    }
}
