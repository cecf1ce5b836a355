use async_trait::async_trait;
use url::Url;

use super::{Guardrail, GuardrailResult};
use crate::error::BoxError;

/// Top-level domains recognised on scheme-less tokens such as `evil.com/path`.
const BARE_HOST_TLDS: &[&str] = &[
    "com", "org", "net", "io", "dev", "ai", "co", "edu", "gov", "info", "app",
];

/// Filters URLs found in text against an allowlist or a blocklist.
///
/// Patterns are host names; `*.example.com` matches `example.com` and every subdomain of it. When an
/// allowlist is configured every host must match it and the blocklist is ignored.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    tripwire: bool,
    blocklist: Vec<String>,
    allowlist: Vec<String>,
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self {
            tripwire: true,
            blocklist: Vec::new(),
            allowlist: Vec::new(),
        }
    }
}

impl UrlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tripwire(mut self, enabled: bool) -> Self {
        self.tripwire = enabled;
        self
    }

    pub fn with_blocklist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocklist
            .extend(patterns.into_iter().map(|p| normalize_pattern(p.into())));
        self
    }

    pub fn with_allowlist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist
            .extend(patterns.into_iter().map(|p| normalize_pattern(p.into())));
        self
    }

    fn violation(&self, host: &str) -> Option<&'static str> {
        if !self.allowlist.is_empty() {
            return (!matches_any(host, &self.allowlist)).then_some("not in allowlist");
        }
        matches_any(host, &self.blocklist).then_some("blocked")
    }
}

#[async_trait]
impl Guardrail for UrlFilter {
    fn name(&self) -> &str {
        "url_filter"
    }

    async fn check(&self, content: &str) -> Result<GuardrailResult, BoxError> {
        let hosts = extract_hosts(content);
        if hosts.is_empty() {
            return Ok(GuardrailResult::pass("No URLs found"));
        }

        let mut blocked = Vec::new();
        let mut violations = Vec::new();
        for host in &hosts {
            if let Some(reason) = self.violation(host) {
                violations.push(format!("{host} ({reason})"));
                blocked.push(host.clone());
            }
        }

        if blocked.is_empty() {
            return Ok(GuardrailResult::pass("All URLs passed validation"));
        }

        Ok(
            GuardrailResult::fail(format!("Blocked URLs: {}", violations.join(", ")), self.tripwire)
                .with_metadata("blocked_urls", blocked)
                .with_metadata("total_urls", hosts.len()),
        )
    }
}

/// Host names of URL-like tokens, lowercased and deduplicated in order of appearance.
fn extract_hosts(text: &str) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let token = token
            .trim_start_matches(is_wrapping_punctuation)
            .trim_end_matches(|c: char| is_wrapping_punctuation(c) || matches!(c, '.' | ':'));
        if let Some(host) = host_of(token) {
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
    }
    hosts
}

fn normalize_pattern(pattern: String) -> String {
    pattern.trim().to_ascii_lowercase()
}

fn is_wrapping_punctuation(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '<' | '>' | '"' | '\'' | ',' | ';' | '!' | '?')
}

fn host_of(token: &str) -> Option<String> {
    if token.contains("://") {
        let url = Url::parse(token).ok()?;
        return url.host_str().map(str::to_ascii_lowercase);
    }

    let host = token.split(['/', '?', '#']).next()?;
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next()?.to_ascii_lowercase();
    let (_, tld) = host.rsplit_once('.')?;
    let labels_ok = host
        .split('.')
        .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    (labels_ok && BARE_HOST_TLDS.contains(&tld)).then_some(host)
}

fn matches_any(host: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| matches_pattern(host, pattern))
}

fn matches_pattern(host: &str, pattern: &str) -> bool {
    if host == pattern {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => host == suffix || host.strip_suffix(suffix).is_some_and(|rest| rest.ends_with('.')),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_hosts_with_and_without_scheme() {
        let hosts = extract_hosts(
            "See https://Docs.Rust-Lang.org/std, evil.com/login and (https://docs.rust-lang.org/book).",
        );
        assert_eq!(hosts, vec!["docs.rust-lang.org".to_string(), "evil.com".to_string()]);
        assert!(extract_hosts("version 1.2.3 and e.g. this").is_empty());
    }

    #[test]
    fn wildcard_matches_domain_and_subdomains_only() {
        assert!(matches_pattern("example.com", "*.example.com"));
        assert!(matches_pattern("a.b.example.com", "*.example.com"));
        assert!(!matches_pattern("badexample.com", "*.example.com"));
        assert!(!matches_pattern("example.com.evil.net", "*.example.com"));
    }

    #[tokio::test]
    async fn blocklist_trips_on_listed_host() {
        let filter = UrlFilter::new().with_blocklist(["evil.com"]);
        let result = filter
            .check("Check out https://evil.com/malware")
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(result.tripwire_triggered);
        assert_eq!(result.message, "Blocked URLs: evil.com (blocked)");
        assert_eq!(result.metadata["blocked_urls"], json!(["evil.com"]));
        assert_eq!(result.metadata["total_urls"], 1);

        let result = filter.check("Read https://docs.rs for more").await.unwrap();
        assert!(result.passed);
        assert_eq!(result.message, "All URLs passed validation");
    }

    #[tokio::test]
    async fn allowlist_takes_precedence() {
        let filter = UrlFilter::new()
            .with_allowlist(["*.example.com"])
            .with_blocklist(["api.example.com"]);

        assert!(filter.check("call https://api.example.com/v1").await.unwrap().passed);
        let result = filter
            .check("mirror at https://example.com and https://other.org")
            .await
            .unwrap();
        assert_eq!(result.message, "Blocked URLs: other.org (not in allowlist)");
        assert_eq!(result.metadata["total_urls"], 2);
    }

    #[tokio::test]
    async fn text_without_urls_passes() {
        let result = UrlFilter::new()
            .with_blocklist(["evil.com"])
            .check("nothing to see here")
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.message, "No URLs found");
    }
}
