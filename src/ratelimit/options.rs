//! Rate limit options: the persisted rule set.
//!
//! This module handles loading, editing and saving rate limit rules. The
//! limiter only ever sees a copy of the enabled rules, taken through
//! [`RateLimiter::config_change`](super::RateLimiter::config_change).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use super::rules::{RateLimitRule, RateLimitRuleConfig};
use crate::error::{HostpaceError, Result};

/// On-disk layout of a rule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RateLimitRuleConfig>,
}

/// The full rule set, enabled and disabled, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RateLimitOptions {
    rules: Vec<RateLimitRule>,
}

impl RateLimitOptions {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    ///
    /// Rules whose description is already taken are skipped; the first
    /// declaration wins.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RuleFile = serde_yaml::from_str(yaml)
            .map_err(|e| HostpaceError::Config(format!("Failed to parse rate limit rules: {}", e)))?;

        let mut options = Self::new();
        for config in file.rules {
            let rule = RateLimitRule::new(config)?;
            if let Err(HostpaceError::RuleExists(description)) = options.add_rule(rule) {
                warn!(description = %description, "Skipping duplicate rate limit rule");
            }
        }
        Ok(options)
    }

    /// Serialize the rule set in the rule file format.
    pub fn to_yaml(&self) -> Result<String> {
        let file = RuleFile {
            rules: self.rules.iter().map(RateLimitRule::to_config).collect(),
        };
        serde_yaml::to_string(&file)
            .map_err(|e| HostpaceError::Config(format!("Failed to serialize rate limit rules: {}", e)))
    }

    /// Write the rule set to a YAML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// All rules, in declaration order.
    pub fn rules(&self) -> &[RateLimitRule] {
        &self.rules
    }

    /// Rules that are currently enabled, in declaration order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &RateLimitRule> {
        self.rules.iter().filter(|rule| rule.is_enabled())
    }

    /// Look up a rule by description.
    pub fn rule(&self, description: &str) -> Option<&RateLimitRule> {
        self.rules.iter().find(|rule| rule.description() == description)
    }

    /// Register a new rule.
    pub fn add_rule(&mut self, rule: RateLimitRule) -> Result<()> {
        if self.rule(rule.description()).is_some() {
            return Err(HostpaceError::RuleExists(rule.description().to_string()));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Remove the rule with the given description.
    pub fn remove_rule(&mut self, description: &str) -> Result<RateLimitRule> {
        let index = self
            .rules
            .iter()
            .position(|rule| rule.description() == description)
            .ok_or_else(|| HostpaceError::RuleNotFound(description.to_string()))?;
        Ok(self.rules.remove(index))
    }

    /// Enable or disable the rule with the given description.
    pub fn set_enabled(&mut self, description: &str, enabled: bool) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|rule| rule.description() == description)
            .ok_or_else(|| HostpaceError::RuleNotFound(description.to_string()))?;
        rule.set_enabled(enabled);
        Ok(())
    }

    /// Descriptions of the enabled rules.
    pub(crate) fn enabled_descriptions(&self) -> HashSet<&str> {
        self.enabled_rules().map(RateLimitRule::description).collect()
    }
}
