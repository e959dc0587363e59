//! Bucket key generation.

use serde::Serialize;

use super::rules::{GroupBy, RateLimitRule};

/// A key that uniquely identifies a throttling bucket.
///
/// The key is composed of the owning rule's description and a group: the
/// description again for rule-wide buckets, or the request host for per-host
/// buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RateLimiterKey {
    /// Description of the rule that owns the bucket
    pub rule: String,
    /// Rule description or request host, depending on the rule's grouping
    pub group: String,
}

impl RateLimiterKey {
    /// Create a key from its parts.
    pub fn new(rule: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            group: group.into(),
        }
    }

    /// Derive the bucket key for a request to `host` matched by `rule`.
    pub fn for_rule(rule: &RateLimitRule, host: &str) -> Self {
        let group = match rule.group_by() {
            GroupBy::Rule => rule.description(),
            GroupBy::Host => host,
        };
        Self::new(rule.description(), group)
    }
}

impl std::fmt::Display for RateLimiterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.rule, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::rules::RateLimitRuleConfig;

    fn rule(group_by: GroupBy) -> RateLimitRule {
        RateLimitRule::new(RateLimitRuleConfig {
            description: "scan".to_string(),
            match_string: "example.com".to_string(),
            match_regex: false,
            requests_per_second: 2,
            group_by,
            enabled: true,
        })
        .unwrap()
    }

    #[test]
    fn test_rule_grouping_shares_key() {
        let rule = rule(GroupBy::Rule);

        let a = RateLimiterKey::for_rule(&rule, "a.example.com");
        let b = RateLimiterKey::for_rule(&rule, "b.example.com");

        assert_eq!(a, b);
        assert_eq!(a.group, "scan");
    }

    #[test]
    fn test_host_grouping_splits_key() {
        let rule = rule(GroupBy::Host);

        let a = RateLimiterKey::for_rule(&rule, "a.example.com");
        let b = RateLimiterKey::for_rule(&rule, "b.example.com");

        assert_ne!(a, b);
        assert_eq!(a, RateLimiterKey::new("scan", "a.example.com"));
    }

    #[test]
    fn test_key_display() {
        let key = RateLimiterKey::new("scan", "www.example.com");
        assert_eq!(key.to_string(), "scan:www.example.com");
    }
}
