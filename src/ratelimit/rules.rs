//! Rate limit rules and host matching.
//!
//! A rule matches outbound requests by host, either by name (exact, or as a
//! DNS suffix for short match strings) or by a case-insensitive regular
//! expression that must match the whole host.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use url::Url;

use crate::error::{HostpaceError, Result};

/// Match strings with more labels than this only match exactly.
const MAX_SUFFIX_LABELS: usize = 2;

/// How throttling state is shared between requests matched by a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// All matching hosts share a single bucket.
    #[default]
    Rule,
    /// Each matching host gets its own bucket.
    Host,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Rule => "rule",
            GroupBy::Host => "host",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = HostpaceError;

    /// Parse a grouping mode by name, ignoring case. An empty name means `Rule`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "rule" => Ok(GroupBy::Rule),
            "host" => Ok(GroupBy::Host),
            other => Err(HostpaceError::InvalidRule(format!(
                "unknown group_by '{}'",
                other
            ))),
        }
    }
}

/// Serialized form of a rate limit rule, as it appears in rule files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRuleConfig {
    /// Unique name of the rule
    pub description: String,
    /// Host name, or a regular expression when `match_regex` is set
    pub match_string: String,
    /// Treat `match_string` as a regular expression
    #[serde(default)]
    pub match_regex: bool,
    /// Maximum requests per second for the bucket
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// How matching requests are bucketed
    #[serde(default)]
    pub group_by: GroupBy,
    /// Whether the rule is applied
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

/// A validated rate limit rule.
///
/// Rules are cheap to clone; the compiled pattern is shared.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    description: String,
    match_string: String,
    match_regex: bool,
    requests_per_second: u32,
    group_by: GroupBy,
    enabled: bool,
    pattern: Option<Regex>,
}

impl RateLimitRule {
    /// Validate a rule configuration and compile its pattern.
    pub fn new(config: RateLimitRuleConfig) -> Result<Self> {
        if config.description.trim().is_empty() {
            return Err(HostpaceError::InvalidRule(
                "description must not be empty".to_string(),
            ));
        }
        if config.match_string.trim().is_empty() {
            return Err(HostpaceError::InvalidRule(format!(
                "{}: match_string must not be empty",
                config.description
            )));
        }
        if config.requests_per_second == 0 {
            return Err(HostpaceError::InvalidRule(format!(
                "{}: requests_per_second must be at least 1",
                config.description
            )));
        }

        let pattern = if config.match_regex {
            let anchored = format!("^(?:{})$", config.match_string);
            let regex = RegexBuilder::new(&anchored)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    HostpaceError::InvalidRule(format!("{}: {}", config.description, e))
                })?;
            Some(regex)
        } else {
            None
        };

        Ok(Self {
            description: config.description,
            match_string: config.match_string,
            match_regex: config.match_regex,
            requests_per_second: config.requests_per_second,
            group_by: config.group_by,
            enabled: config.enabled,
            pattern,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn match_string(&self) -> &str {
        &self.match_string
    }

    pub fn is_match_regex(&self) -> bool {
        self.match_regex
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    pub fn group_by(&self) -> GroupBy {
        self.group_by
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Minimum spacing between two requests in the same bucket, in milliseconds.
    pub fn interval_millis(&self) -> i64 {
        1000 / i64::from(self.requests_per_second)
    }

    /// The serializable form of this rule.
    pub fn to_config(&self) -> RateLimitRuleConfig {
        RateLimitRuleConfig {
            description: self.description.clone(),
            match_string: self.match_string.clone(),
            match_regex: self.match_regex,
            requests_per_second: self.requests_per_second,
            group_by: self.group_by,
            enabled: self.enabled,
        }
    }

    /// Check whether the host of `uri` is covered by this rule.
    ///
    /// URIs that cannot be parsed or have no host never match.
    pub fn matches(&self, uri: &str) -> bool {
        match request_host(uri) {
            Some(host) => self.matches_host(&host),
            None => false,
        }
    }

    /// Check whether `host` is covered by this rule.
    pub fn matches_host(&self, host: &str) -> bool {
        if let Some(pattern) = &self.pattern {
            return pattern.is_match(host);
        }

        if self.match_string.eq_ignore_ascii_case(host) {
            return true;
        }

        // IP literals only ever match exactly.
        if is_ip_literal(host) || is_ip_literal(&self.match_string) {
            return false;
        }
        if self.match_string.split('.').count() > MAX_SUFFIX_LABELS {
            return false;
        }

        let suffix_len = self.match_string.len() + 1;
        host.len() > suffix_len
            && host.is_char_boundary(host.len() - suffix_len)
            && {
                let tail = &host[host.len() - suffix_len..];
                tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(&self.match_string)
            }
    }
}

/// Extract the lowercased host of a request URI.
pub fn request_host(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

fn is_ip_literal(value: &str) -> bool {
    let trimmed = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    trimmed.parse::<IpAddr>().is_ok()
}

/// Pick the rule that applies to `host`.
///
/// The most restrictive matching rule wins; among rules with the same rate
/// the first one declared is kept.
pub fn select_rule<'a>(rules: &'a [RateLimitRule], host: &str) -> Option<&'a RateLimitRule> {
    let mut selected: Option<&RateLimitRule> = None;
    for rule in rules {
        if !rule.matches_host(host) {
            continue;
        }
        match selected {
            Some(best) if rule.requests_per_second >= best.requests_per_second => {}
            _ => selected = Some(rule),
        }
    }
    selected
}
