use std::collections::HashMap;
use std::env;
use std::time::Duration;

use sheetsync_core::config::{parse_in_range, value_or_default, SyncSettings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Core(#[from] sheetsync_core::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Period of the background drain loop; `None` leaves draining to the
    /// HTTP trigger
    pub poll_interval: Option<Duration>,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SHEETSYNC_BIND_ADDR", "127.0.0.1:8080");
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "SHEETSYNC_BIND_ADDR must be a socket address, got `{bind_addr}`"
            )));
        }

        let poll_secs = parse_in_range(&lookup, "SYNC_POLL_INTERVAL_SECS", "0", 0..=86_400)?;
        let poll_interval = (poll_secs > 0).then(|| Duration::from_secs(u64::from(poll_secs)));

        Ok(Self {
            bind_addr,
            poll_interval,
            sync: SyncSettings::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("SHEETS_SPREADSHEET_ID", "sheet-123"),
        ("SHEETS_ACCESS_TOKEN", "ya29.sensitive-token"),
    ];

    #[test]
    fn config_defaults_disable_poller() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.poll_interval, None);
    }

    #[test]
    fn config_reads_poll_interval() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SYNC_POLL_INTERVAL_SECS", "30"));
        let config = config(&pairs).unwrap();
        assert_eq!(config.poll_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn config_rejects_invalid_bind_addr() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SHEETSYNC_BIND_ADDR", "localhost"));
        assert!(matches!(config(&pairs), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn config_requires_sheet_settings() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_SERVICE_ACCOUNT_FILE"));
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let config = config(&REQUIRED).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sensitive-token"));
    }
}
