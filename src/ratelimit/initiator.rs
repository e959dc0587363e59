//! Request initiators.

use std::fmt;
use std::str::FromStr;

use crate::error::HostpaceError;

/// The component that originated an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Initiator {
    Proxy,
    ActiveScanner,
    Spider,
    Fuzzer,
    Authentication,
    ManualRequest,
    CheckForUpdates,
    Script,
    AccessControlScanner,
    AjaxSpider,
    ForcedBrowse,
    TokenGenerator,
    WebSocket,
    AuthenticationHelper,
    /// An initiator code with no named variant
    Other(i32),
}

impl Initiator {
    /// Numeric code of the initiator.
    pub fn code(&self) -> i32 {
        match self {
            Initiator::Proxy => 1,
            Initiator::ActiveScanner => 2,
            Initiator::Spider => 3,
            Initiator::Fuzzer => 4,
            Initiator::Authentication => 5,
            Initiator::ManualRequest => 6,
            Initiator::CheckForUpdates => 7,
            Initiator::Script => 8,
            Initiator::AccessControlScanner => 9,
            Initiator::AjaxSpider => 10,
            Initiator::ForcedBrowse => 11,
            Initiator::TokenGenerator => 12,
            Initiator::WebSocket => 13,
            Initiator::AuthenticationHelper => 14,
            Initiator::Other(code) => *code,
        }
    }

    /// Whether requests from this initiator are subject to rate limiting.
    ///
    /// Update checks go to the vendor, never to a scan target.
    pub fn is_throttled(&self) -> bool {
        self.code() != Initiator::CheckForUpdates.code()
    }
}

impl From<i32> for Initiator {
    fn from(code: i32) -> Self {
        match code {
            1 => Initiator::Proxy,
            2 => Initiator::ActiveScanner,
            3 => Initiator::Spider,
            4 => Initiator::Fuzzer,
            5 => Initiator::Authentication,
            6 => Initiator::ManualRequest,
            7 => Initiator::CheckForUpdates,
            8 => Initiator::Script,
            9 => Initiator::AccessControlScanner,
            10 => Initiator::AjaxSpider,
            11 => Initiator::ForcedBrowse,
            12 => Initiator::TokenGenerator,
            13 => Initiator::WebSocket,
            14 => Initiator::AuthenticationHelper,
            other => Initiator::Other(other),
        }
    }
}

impl FromStr for Initiator {
    type Err = HostpaceError;

    /// Parse an initiator from its name (`spider`, `active-scanner`, ...) or numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase().replace('-', "_");
        let initiator = match name.as_str() {
            "proxy" => Initiator::Proxy,
            "active_scanner" | "scanner" => Initiator::ActiveScanner,
            "spider" => Initiator::Spider,
            "fuzzer" => Initiator::Fuzzer,
            "authentication" => Initiator::Authentication,
            "manual_request" | "manual" => Initiator::ManualRequest,
            "check_for_updates" => Initiator::CheckForUpdates,
            "script" => Initiator::Script,
            "access_control_scanner" => Initiator::AccessControlScanner,
            "ajax_spider" => Initiator::AjaxSpider,
            "forced_browse" => Initiator::ForcedBrowse,
            "token_generator" => Initiator::TokenGenerator,
            "web_socket" | "websocket" => Initiator::WebSocket,
            "authentication_helper" => Initiator::AuthenticationHelper,
            other => other
                .parse::<i32>()
                .map(Initiator::from)
                .map_err(|_| HostpaceError::Config(format!("unknown initiator '{}'", s)))?,
        };
        Ok(initiator)
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initiator::Other(code) => write!(f, "other({})", code),
            named => write!(f, "{:?}", named),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_for_named() {
        for code in 1..=14 {
            assert_eq!(Initiator::from(code).code(), code);
            assert!(!matches!(Initiator::from(code), Initiator::Other(_)));
        }
        assert_eq!(Initiator::from(-1234), Initiator::Other(-1234));
    }

    #[test]
    fn test_only_update_checks_bypass_throttling() {
        assert!(!Initiator::CheckForUpdates.is_throttled());
        assert!(Initiator::Spider.is_throttled());
        assert!(Initiator::ActiveScanner.is_throttled());
        assert!(Initiator::Other(-1234).is_throttled());
        assert!(!Initiator::Other(7).is_throttled());
    }

    #[test]
    fn test_parse_names_and_codes() {
        assert_eq!("spider".parse::<Initiator>().unwrap(), Initiator::Spider);
        assert_eq!(
            "Active-Scanner".parse::<Initiator>().unwrap(),
            Initiator::ActiveScanner
        );
        assert_eq!("manual".parse::<Initiator>().unwrap(), Initiator::ManualRequest);
        assert_eq!("7".parse::<Initiator>().unwrap(), Initiator::CheckForUpdates);
        assert_eq!("99".parse::<Initiator>().unwrap(), Initiator::Other(99));
        assert!("crawler".parse::<Initiator>().is_err());
    }
}
