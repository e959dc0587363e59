//! Rate limiting rules, state and throttling.

mod entry;
mod initiator;
mod key;
mod limiter;
mod options;
mod rules;

pub use entry::{Clock, RateLimiterEntry, TokioClock};
pub use initiator::Initiator;
pub use key::RateLimiterKey;
pub use limiter::{LimiterObserver, RateLimiter};
pub use options::RateLimitOptions;
pub use rules::{request_host, select_rule, GroupBy, RateLimitRule, RateLimitRuleConfig};
