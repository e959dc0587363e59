//! Hostpace - Host-keyed Outbound Request Throttling
//!
//! This crate paces outbound HTTP requests, such as those issued by a
//! security scanner or crawler, according to per-host rate limit rules.
//! Callers await the limiter before each send; requests that share a bucket
//! are serialized and spaced out, while unrelated hosts proceed
//! independently.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod reload;
