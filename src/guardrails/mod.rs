//! Validation policies applied to a run's input and final output.
//!
//! A guardrail inspects text and reports whether it passed. A failed check with the tripwire set
//! aborts the run; without it the failure is advisory and only logged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BoxError;

mod pattern;
mod pii;
mod url_filter;

pub use pattern::PatternGuardrail;
pub use pii::{PiiDetector, PiiPattern};
pub use url_filter::UrlFilter;

/// Outcome of a single guardrail check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub passed: bool,
    pub tripwire_triggered: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl GuardrailResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            tripwire_triggered: false,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    /// A failed check; `tripwire` decides whether it halts the run.
    pub fn fail(message: impl Into<String>, tripwire: bool) -> Self {
        Self {
            passed: false,
            tripwire_triggered: tripwire,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Which side of a run a guardrail validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardrailSide {
    Input,
    Output,
}

impl fmt::Display for GuardrailSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardrailSide::Input => f.write_str("input"),
            GuardrailSide::Output => f.write_str("output"),
        }
    }
}

#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Err` only when the guardrail itself malfunctions; a policy violation is an
    /// `Ok` result with `passed == false`.
    async fn check(&self, content: &str) -> Result<GuardrailResult, BoxError>;
}

type CheckFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<GuardrailResult, BoxError>> + Send + Sync>;

/// A guardrail backed by a closure.
#[derive(Clone)]
pub struct FnGuardrail {
    name: String,
    check: CheckFn,
}

impl FnGuardrail {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailResult, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |content| Box::pin(check(content))),
        }
    }
}

impl fmt::Debug for FnGuardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGuardrail")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Guardrail for FnGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, content: &str) -> Result<GuardrailResult, BoxError> {
        (self.check)(content.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_guardrail_reports_through_the_closure() {
        let guardrail = FnGuardrail::new("no_shouting", |content: String| async move {
            if content.chars().any(char::is_lowercase) {
                Ok(GuardrailResult::pass("ok"))
            } else {
                Ok(GuardrailResult::fail("Input is all caps", true).with_metadata("length", content.len()))
            }
        });

        assert_eq!(guardrail.name(), "no_shouting");
        assert!(guardrail.check("hello").await.unwrap().passed);

        let result = guardrail.check("HELLO").await.unwrap();
        assert!(!result.passed);
        assert!(result.tripwire_triggered);
        assert_eq!(result.metadata["length"], 5);
    }

    #[tokio::test]
    async fn fn_guardrail_surfaces_malfunctions() {
        let guardrail = FnGuardrail::new("moderation", |_| async {
            Err::<GuardrailResult, BoxError>("moderation endpoint unreachable".into())
        });
        let err = guardrail.check("anything").await.unwrap_err();
        assert_eq!(err.to_string(), "moderation endpoint unreachable");
    }

    #[test]
    fn side_displays_lowercase() {
        assert_eq!(GuardrailSide::Input.to_string(), "input");
        assert_eq!(GuardrailSide::Output.to_string(), "output");
    }
}
