//! Settings read from the process environment by the composing shell.
//!
//! Nothing in the library reads the environment on its own; the shell builds
//! a [`Config`] once and hands the pieces to the components that need them.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::spike::DEFAULT_SPIKE_THRESHOLD_GB;

pub const DEFAULT_BASE_URL: &str = "https://omniscapp.slt.lk/mobitelint/slt/api/";
pub const DEFAULT_CLIENT_ID: &str = "41aed706-8fdf-4b1e-883e-91e44d7f379b";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 30;
/// Upper bound for `MYSLT_EXPIRY_MARGIN_SECS`.
pub const MAX_EXPIRY_MARGIN_SECS: i64 = 86_400;

/// Transport and session-policy settings for [`crate::AuthenticatedClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub request_timeout: Duration,
    /// Refresh this many seconds before the upstream expiry instant.
    pub expiry_margin_secs: i64,
    /// Fall back to a fresh login when a refresh is rejected.
    pub relogin_on_refresh_failure: bool,
    pub event_log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            request_timeout: REQUEST_TIMEOUT,
            expiry_margin_secs: DEFAULT_EXPIRY_MARGIN_SECS,
            relogin_on_refresh_failure: false,
            event_log_dir: None,
        }
    }
}

impl ClientConfig {
    /// Joins an endpoint path onto the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub subscriber_id: String,
    pub tp_no: String,
    pub account_no: String,
    pub spike_threshold: f64,
    pub client: ClientConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("subscriber_id", &self.subscriber_id)
            .field("tp_no", &self.tp_no)
            .field("account_no", &self.account_no)
            .field("spike_threshold", &self.spike_threshold)
            .field("client", &self.client)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let required = [
            "MYSLT_USERNAME",
            "MYSLT_PASSWORD",
            "MYSLT_SUBSCRIBER_ID",
            "MYSLT_TP_NO",
            "MYSLT_ACCOUNT_NO",
        ];
        let missing = required
            .iter()
            .filter(|key| read(**key).is_none())
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ClientError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        let require = |key: &str| read(key).unwrap_or_default();

        let spike_threshold = match read("MYSLT_SPIKE_THRESHOLD") {
            Some(raw) => parse_number::<f64>("MYSLT_SPIKE_THRESHOLD", &raw)?,
            None => DEFAULT_SPIKE_THRESHOLD_GB,
        };
        if !spike_threshold.is_finite() || spike_threshold < 0.0 {
            return Err(ClientError::Config(
                "MYSLT_SPIKE_THRESHOLD must be a non-negative number".to_string(),
            ));
        }

        let expiry_margin_secs = match read("MYSLT_EXPIRY_MARGIN_SECS") {
            Some(raw) => parse_number::<i64>("MYSLT_EXPIRY_MARGIN_SECS", &raw)?,
            None => DEFAULT_EXPIRY_MARGIN_SECS,
        };
        if !(0..=MAX_EXPIRY_MARGIN_SECS).contains(&expiry_margin_secs) {
            return Err(ClientError::Config(format!(
                "MYSLT_EXPIRY_MARGIN_SECS must be between 0 and {}",
                MAX_EXPIRY_MARGIN_SECS
            )));
        }

        let relogin_on_refresh_failure = match read("MYSLT_RELOGIN_ON_REFRESH_FAILURE") {
            Some(raw) => parse_flag("MYSLT_RELOGIN_ON_REFRESH_FAILURE", &raw)?,
            None => false,
        };

        let client = ClientConfig {
            base_url: read("MYSLT_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client_id: read("MYSLT_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            request_timeout: REQUEST_TIMEOUT,
            expiry_margin_secs,
            relogin_on_refresh_failure,
            event_log_dir: read("MYSLT_EVENT_LOG_DIR").map(PathBuf::from),
        };

        Ok(Self {
            username: require("MYSLT_USERNAME"),
            password: require("MYSLT_PASSWORD"),
            subscriber_id: require("MYSLT_SUBSCRIBER_ID"),
            tp_no: require("MYSLT_TP_NO"),
            account_no: require("MYSLT_ACCOUNT_NO"),
            spike_threshold,
            client,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ClientResult<T> {
    raw.parse::<T>()
        .map_err(|_| ClientError::Config(format!("{} is not a valid number: {}", key, raw)))
}

fn parse_flag(key: &str, raw: &str) -> ClientResult<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ClientError::Config(format!(
            "{} is not a valid flag: {}",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MYSLT_USERNAME", "0112345678"),
            ("MYSLT_PASSWORD", "hunter2"),
            ("MYSLT_SUBSCRIBER_ID", "94112345678"),
            ("MYSLT_TP_NO", "0112345678"),
            ("MYSLT_ACCOUNT_NO", "0031234567"),
        ]
    }

    #[test]
    fn defaults_apply_when_optional_values_absent() {
        let config = Config::from_lookup(lookup_from(&required_pairs())).expect("config");
        assert_eq!(config.client, ClientConfig::default());
        assert_eq!(config.spike_threshold, DEFAULT_SPIKE_THRESHOLD_GB);
        assert_eq!(config.subscriber_id, "94112345678");
    }

    #[test]
    fn missing_required_values_are_listed_together() {
        let err = Config::from_lookup(lookup_from(&[
            ("MYSLT_USERNAME", "u"),
            ("MYSLT_PASSWORD", "   "),
        ]))
        .expect_err("missing values");
        let message = err.to_string();
        assert!(message.contains("MYSLT_PASSWORD"));
        assert!(message.contains("MYSLT_SUBSCRIBER_ID, MYSLT_TP_NO, MYSLT_ACCOUNT_NO"));
        assert!(!message.contains("MYSLT_USERNAME"));
    }

    #[test]
    fn optional_overrides_are_parsed() {
        let mut pairs = required_pairs();
        pairs.extend([
            ("MYSLT_BASE_URL", "http://127.0.0.1:9000/api"),
            ("MYSLT_SPIKE_THRESHOLD", "2.5"),
            ("MYSLT_EXPIRY_MARGIN_SECS", "0"),
            ("MYSLT_RELOGIN_ON_REFRESH_FAILURE", "yes"),
            ("MYSLT_EVENT_LOG_DIR", "/tmp/myslt"),
        ]);
        let config = Config::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(config.spike_threshold, 2.5);
        assert_eq!(config.client.expiry_margin_secs, 0);
        assert!(config.client.relogin_on_refresh_failure);
        assert_eq!(config.client.event_log_dir, Some(PathBuf::from("/tmp/myslt")));
        assert_eq!(
            config.client.endpoint_url("BBVAS/UsageSummary"),
            "http://127.0.0.1:9000/api/BBVAS/UsageSummary"
        );
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let mut pairs = required_pairs();
        pairs.push(("MYSLT_SPIKE_THRESHOLD", "lots"));
        let err = Config::from_lookup(lookup_from(&pairs)).expect_err("bad number");
        assert!(err.to_string().contains("MYSLT_SPIKE_THRESHOLD"));

        let mut pairs = required_pairs();
        pairs.push(("MYSLT_RELOGIN_ON_REFRESH_FAILURE", "maybe"));
        let err = Config::from_lookup(lookup_from(&pairs)).expect_err("bad flag");
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn expiry_margin_must_stay_in_range() {
        for raw in ["-1", "86401", "9223372036854775807"] {
            let mut pairs = required_pairs();
            pairs.push(("MYSLT_EXPIRY_MARGIN_SECS", raw));
            let err = Config::from_lookup(lookup_from(&pairs)).expect_err(raw);
            assert!(err.to_string().contains("MYSLT_EXPIRY_MARGIN_SECS"));
        }

        let mut pairs = required_pairs();
        pairs.push(("MYSLT_EXPIRY_MARGIN_SECS", "86400"));
        let config = Config::from_lookup(lookup_from(&pairs)).expect("max margin");
        assert_eq!(config.client.expiry_margin_secs, MAX_EXPIRY_MARGIN_SECS);
    }

    #[test]
    fn debug_redacts_password() {
        let config = Config::from_lookup(lookup_from(&required_pairs())).expect("config");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn endpoint_url_joins_default_base() {
        let config = ClientConfig::default();
        assert_eq!(
            config.endpoint_url("Account/Login"),
            "https://omniscapp.slt.lk/mobitelint/slt/api/Account/Login"
        );
    }
}
