use log::warn;
use std::time::Duration;
use url::Url;

use crate::endpoint::{resolve_endpoint, EndpointError, PageOrigin};

pub const DEFAULT_PAIRING_PORT: u16 = 3001;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

pub const ENV_PAIRING_URL: &str = "QRLINK_PAIRING_URL";
pub const ENV_PAGE_HOST: &str = "QRLINK_PAGE_HOST";
pub const ENV_PAGE_SECURE: &str = "QRLINK_PAGE_SECURE";
pub const ENV_PAIRING_PORT: &str = "QRLINK_PAIRING_PORT";
pub const ENV_TIMEOUT_SECS: &str = "QRLINK_PAIRING_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Explicit backend URL (`ws`, `wss`, `http` or `https`)
    pub endpoint: Option<String>,
    /// Host of the page embedding the pairing flow; used when `endpoint` is unset
    pub page_host: Option<String>,
    pub page_secure: bool,
    pub port: u16,
    /// Longest silence tolerated from the backend while a session is live
    pub idle_timeout: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            page_host: None,
            page_secure: false,
            port: DEFAULT_PAIRING_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl PairingConfig {
    /// Defaults overlaid with the `QRLINK_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup`; unparsable values are logged
    /// and ignored.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_PAIRING_URL).filter(|s| !s.trim().is_empty()) {
            self.endpoint = Some(url);
        }
        if let Some(host) = lookup(ENV_PAGE_HOST).filter(|s| !s.trim().is_empty()) {
            self.page_host = Some(host);
        }
        if let Some(raw) = lookup(ENV_PAGE_SECURE) {
            match parse_flag(&raw) {
                Some(flag) => self.page_secure = flag,
                None => warn!("ignoring {ENV_PAGE_SECURE}={raw:?}: expected a boolean"),
            }
        }
        if let Some(raw) = lookup(ENV_PAIRING_PORT) {
            match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => self.port = port,
                _ => warn!("ignoring {ENV_PAIRING_PORT}={raw:?}: expected a port number"),
            }
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.idle_timeout = Duration::from_secs(secs),
                _ => warn!("ignoring {ENV_TIMEOUT_SECS}={raw:?}: expected a positive number of seconds"),
            }
        }
        self
    }

    pub fn page_origin(&self) -> Option<PageOrigin> {
        self.page_host.as_ref().map(|host| PageOrigin {
            host: host.clone(),
            secure: self.page_secure,
        })
    }

    pub fn resolve_endpoint(&self) -> Result<Url, EndpointError> {
        resolve_endpoint(
            self.endpoint.as_deref(),
            self.page_origin().as_ref(),
            self.port,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = PairingConfig::default().with_env(env(&[]));
        assert_eq!(config, PairingConfig::default());
        assert_eq!(config.resolve_endpoint(), Err(EndpointError::Unconfigured));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PairingConfig::default().with_env(env(&[
            (ENV_PAGE_HOST, "app.example.com"),
            (ENV_PAGE_SECURE, "true"),
            (ENV_PAIRING_PORT, "4100"),
            (ENV_TIMEOUT_SECS, "30"),
        ]));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(
            config.resolve_endpoint().unwrap().as_str(),
            "wss://app.example.com:4100/"
        );
    }

    #[test]
    fn explicit_url_wins_over_page_host() {
        let config = PairingConfig::default().with_env(env(&[
            (ENV_PAIRING_URL, "https://pair.example.com/socket"),
            (ENV_PAGE_HOST, "app.example.com"),
        ]));
        assert_eq!(
            config.resolve_endpoint().unwrap().as_str(),
            "wss://pair.example.com/socket"
        );
    }

    #[test]
    fn bad_values_are_ignored() {
        let config = PairingConfig::default().with_env(env(&[
            (ENV_PAGE_SECURE, "maybe"),
            (ENV_PAIRING_PORT, "0"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]));
        assert_eq!(config, PairingConfig::default());
    }
}
