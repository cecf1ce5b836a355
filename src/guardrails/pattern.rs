use async_trait::async_trait;
use regex::Regex;

use super::{Guardrail, GuardrailResult};
use crate::error::BoxError;

/// Validates text against a regular expression.
///
/// By default the pattern is forbidden (the text must not match); `with_must_match(true)` turns it
/// into a required pattern.
#[derive(Debug, Clone)]
pub struct PatternGuardrail {
    pattern: Regex,
    must_match: bool,
    tripwire: bool,
    message: Option<String>,
}

impl PatternGuardrail {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::from_regex(Regex::new(pattern)?))
    }

    pub fn from_regex(pattern: Regex) -> Self {
        Self {
            pattern,
            must_match: false,
            tripwire: true,
            message: None,
        }
    }

    pub fn with_must_match(mut self, must_match: bool) -> Self {
        self.must_match = must_match;
        self
    }

    pub fn with_tripwire(mut self, enabled: bool) -> Self {
        self.tripwire = enabled;
        self
    }

    /// Message reported when validation fails.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn failure_message(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None if self.must_match => "Input does not match required pattern".to_string(),
            None => "Input matches forbidden pattern".to_string(),
        }
    }
}

#[async_trait]
impl Guardrail for PatternGuardrail {
    fn name(&self) -> &str {
        "regex_validation"
    }

    async fn check(&self, content: &str) -> Result<GuardrailResult, BoxError> {
        let matched = self.pattern.is_match(content);
        if matched == self.must_match {
            return Ok(GuardrailResult::pass("Pattern validation passed"));
        }

        Ok(GuardrailResult::fail(self.failure_message(), self.tripwire)
            .with_metadata("pattern", self.pattern.as_str())
            .with_metadata("must_match", self.must_match)
            .with_metadata("input_match", matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forbidden_pattern_trips_on_match() {
        let guardrail = PatternGuardrail::new(r"(?i)drop\s+table").unwrap();
        assert!(guardrail.check("select 1").await.unwrap().passed);

        let result = guardrail.check("please DROP TABLE users").await.unwrap();
        assert!(!result.passed);
        assert!(result.tripwire_triggered);
        assert_eq!(result.message, "Input matches forbidden pattern");
        assert_eq!(result.metadata["input_match"], true);
        assert_eq!(result.metadata["must_match"], false);
    }

    #[tokio::test]
    async fn required_pattern_with_custom_message() {
        let guardrail = PatternGuardrail::new(r"^ORD-\d+$")
            .unwrap()
            .with_must_match(true)
            .with_message("Order ids look like ORD-123");

        assert!(guardrail.check("ORD-991").await.unwrap().passed);
        let result = guardrail.check("order 991").await.unwrap();
        assert_eq!(result.message, "Order ids look like ORD-123");
        assert_eq!(result.metadata["pattern"], r"^ORD-\d+$");
    }

    #[tokio::test]
    async fn default_message_for_required_pattern() {
        let guardrail = PatternGuardrail::new(r"\d").unwrap().with_must_match(true).with_tripwire(false);
        let result = guardrail.check("no digits").await.unwrap();
        assert_eq!(result.message, "Input does not match required pattern");
        assert!(!result.tripwire_triggered);
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(PatternGuardrail::new("(unclosed").is_err());
    }
}
