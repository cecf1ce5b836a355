use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{Guardrail, GuardrailResult};
use crate::error::BoxError;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\+\d{1,2}\s?)?(\(?\d{3}\)?[\s.-]?)?\d{3}[\s.-]?\d{4}\b").expect("valid phone regex")
});
static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid ssn regex"));
static CREDIT_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").expect("valid card regex")
});

/// A named detection pattern.
#[derive(Debug, Clone)]
pub struct PiiPattern {
    pub name: String,
    pub pattern: Regex,
}

impl PiiPattern {
    pub fn new(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            pattern,
        }
    }
}

/// Detects personally identifiable information: email addresses, phone numbers, social security
/// numbers and payment card numbers, plus any custom patterns.
///
/// Every enabled category is checked and all matching categories are reported in the
/// `detected_types` metadata entry.
#[derive(Debug, Clone)]
pub struct PiiDetector {
    tripwire: bool,
    email: bool,
    phone: bool,
    ssn: bool,
    credit_card: bool,
    custom: Vec<PiiPattern>,
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self {
            tripwire: true,
            email: true,
            phone: true,
            ssn: true,
            credit_card: true,
            custom: Vec::new(),
        }
    }
}

impl PiiDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tripwire(mut self, enabled: bool) -> Self {
        self.tripwire = enabled;
        self
    }

    pub fn with_email(mut self, enabled: bool) -> Self {
        self.email = enabled;
        self
    }

    pub fn with_phone(mut self, enabled: bool) -> Self {
        self.phone = enabled;
        self
    }

    pub fn with_ssn(mut self, enabled: bool) -> Self {
        self.ssn = enabled;
        self
    }

    pub fn with_credit_card(mut self, enabled: bool) -> Self {
        self.credit_card = enabled;
        self
    }

    pub fn with_custom_pattern(mut self, name: impl Into<String>, pattern: Regex) -> Self {
        self.custom.push(PiiPattern::new(name, pattern));
        self
    }

    fn detect(&self, content: &str) -> Vec<String> {
        let builtin = [
            (self.email, "email", &*EMAIL),
            (self.phone, "phone", &*PHONE),
            (self.ssn, "ssn", &*SSN),
            (self.credit_card, "credit_card", &*CREDIT_CARD),
        ];

        let mut detected: Vec<String> = builtin
            .into_iter()
            .filter(|(enabled, _, regex)| *enabled && regex.is_match(content))
            .map(|(_, name, _)| name.to_string())
            .collect();
        detected.extend(
            self.custom
                .iter()
                .filter(|custom| custom.pattern.is_match(content))
                .map(|custom| custom.name.clone()),
        );
        detected
    }
}

#[async_trait]
impl Guardrail for PiiDetector {
    fn name(&self) -> &str {
        "pii_detection"
    }

    async fn check(&self, content: &str) -> Result<GuardrailResult, BoxError> {
        let detected = self.detect(content);
        if detected.is_empty() {
            return Ok(GuardrailResult::pass("No PII detected"));
        }

        Ok(
            GuardrailResult::fail(format!("Detected PII: {}", detected.join(", ")), self.tripwire)
                .with_metadata("detected_types", detected),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn detects_email_and_trips() {
        let result = PiiDetector::new()
            .check("My email is test@example.com")
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(result.tripwire_triggered);
        assert_eq!(result.message, "Detected PII: email");
        assert_eq!(result.metadata["detected_types"], json!(["email"]));
    }

    #[tokio::test]
    async fn reports_every_matching_category() {
        let result = PiiDetector::new()
            .check("SSN 123-45-6789, card 4111 1111 1111 1111, mail a.b@corp.io")
            .await
            .unwrap();
        let detected = result.metadata["detected_types"].as_array().unwrap();
        assert!(detected.contains(&json!("email")));
        assert!(detected.contains(&json!("ssn")));
        assert!(detected.contains(&json!("credit_card")));
    }

    #[tokio::test]
    async fn clean_text_passes() {
        let result = PiiDetector::new()
            .check("What's the weather like today?")
            .await
            .unwrap();
        assert!(result.passed);
        assert!(!result.tripwire_triggered);
        assert_eq!(result.message, "No PII detected");
    }

    #[tokio::test]
    async fn disabled_categories_and_advisory_mode() {
        let detector = PiiDetector::new().with_email(false);
        assert!(detector.check("ping me at x@y.com").await.unwrap().passed);

        let advisory = PiiDetector::new().with_tripwire(false);
        let result = advisory.check("call 555-123-4567").await.unwrap();
        assert!(!result.passed);
        assert!(!result.tripwire_triggered);
        assert_eq!(result.metadata["detected_types"], json!(["phone"]));
    }

    #[tokio::test]
    async fn custom_patterns_are_appended_after_builtins() {
        let detector = PiiDetector::new()
            .with_custom_pattern("employee_id", Regex::new(r"\bEMP-\d{5}\b").unwrap());
        let result = detector
            .check("EMP-00042 can be reached at emp@corp.com")
            .await
            .unwrap();
        assert_eq!(
            result.metadata["detected_types"],
            json!(["email", "employee_id"])
        );
    }
}
