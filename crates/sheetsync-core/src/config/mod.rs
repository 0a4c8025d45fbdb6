//! Sync configuration.
//!
//! The sheet layout, retry policy, and drain limits are explicit values handed
//! to the dispatcher. `SyncSettings::from_env` builds them from environment
//! variables for the binaries; the parsing itself goes through a lookup
//! closure so it can be exercised without touching the process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sheets::{A1Range, Credentials, GoogleSheetsClient, DEFAULT_SHEETS_API_URL};
use crate::util::{is_http_url, normalize_text_option};

/// Number of synchronized columns: id, name, email
pub const SYNCED_COLUMNS: u32 = 3;

/// Where the synchronized rows live in the spreadsheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// First data row (1-based); rows above it are headers
    pub start_row: u32,
    /// 1-based index of the id column; name and email follow it
    pub first_column: u32,
}

impl SheetTarget {
    pub fn new(spreadsheet_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            start_row: 2,
            first_column: 1,
        }
    }

    #[must_use]
    pub const fn with_start_row(mut self, start_row: u32) -> Self {
        self.start_row = start_row;
        self
    }

    /// The unbounded range scanned when locating rows, e.g. `users!A2:C`.
    pub fn scan_range(&self) -> A1Range {
        A1Range {
            sheet: self.sheet_name.clone(),
            start_column: self.first_column,
            start_row: self.start_row,
            end_column: self.last_column(),
            end_row: None,
        }
    }

    /// The single-row range overwritten for a located row, e.g. `users!A5:C5`.
    pub fn row_range(&self, row: u32) -> A1Range {
        A1Range {
            sheet: self.sheet_name.clone(),
            start_column: self.first_column,
            start_row: row,
            end_column: self.last_column(),
            end_row: Some(row),
        }
    }

    const fn last_column(&self) -> u32 {
        self.first_column + SYNCED_COLUMNS - 1
    }
}

/// Bounded exponential retry with jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random delay added to transient retries
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
        }
    }
}

/// How the row locator finds a target id in the sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocateStrategy {
    /// Re-read the whole id range for every lookup
    #[default]
    Scan,
    /// Read the range once per drain and index it by id
    Snapshot,
}

impl LocateStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Snapshot => "snapshot",
        }
    }
}

impl FromStr for LocateStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(Self::Scan),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(Error::Config(format!(
                "SYNC_LOCATE_STRATEGY must be `scan` or `snapshot`, got `{other}`"
            ))),
        }
    }
}

/// Everything the sync dispatcher needs besides its collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub target: SheetTarget,
    pub retry: RetryPolicy,
    /// Deadline for one whole drain; `None` disables it
    pub drain_timeout: Option<Duration>,
    pub locate: LocateStrategy,
}

impl DispatcherConfig {
    pub fn new(target: SheetTarget) -> Self {
        Self {
            target,
            retry: RetryPolicy::default(),
            drain_timeout: Some(Duration::from_secs(300)),
            locate: LocateStrategy::default(),
        }
    }
}

/// How to authenticate against the Sheets API
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ServiceAccountFile(PathBuf),
    AccessToken(String),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccountFile(path) => formatter
                .debug_tuple("ServiceAccountFile")
                .field(path)
                .finish(),
            Self::AccessToken(_) => formatter
                .debug_tuple("AccessToken")
                .field(&"[REDACTED]")
                .finish(),
        }
    }
}

/// Settings shared by the API server and the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub database_path: PathBuf,
    pub sheets_api_url: String,
    pub credentials: CredentialSource,
    pub dispatcher: DispatcherConfig,
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_path = PathBuf::from(value_or_default(
            &lookup,
            "SHEETSYNC_DATABASE_PATH",
            "sheetsync.db",
        ));

        let sheets_api_url = value_or_default(&lookup, "SHEETS_API_URL", DEFAULT_SHEETS_API_URL);
        if !is_http_url(&sheets_api_url) {
            return Err(Error::Config(
                "SHEETS_API_URL must start with http:// or https://".to_string(),
            ));
        }

        let credentials = match (
            optional_trimmed(&lookup, "GOOGLE_SERVICE_ACCOUNT_FILE"),
            optional_trimmed(&lookup, "SHEETS_ACCESS_TOKEN"),
        ) {
            (Some(path), _) => CredentialSource::ServiceAccountFile(PathBuf::from(path)),
            (None, Some(token)) => CredentialSource::AccessToken(token),
            (None, None) => {
                return Err(Error::Config(
                    "Missing required environment variable: GOOGLE_SERVICE_ACCOUNT_FILE (or SHEETS_ACCESS_TOKEN)"
                        .to_string(),
                ))
            }
        };

        let spreadsheet_id = required_trimmed(&lookup, "SHEETS_SPREADSHEET_ID")?;
        let sheet_name = value_or_default(&lookup, "SHEETS_SHEET_NAME", "users");
        let start_row = parse_in_range(&lookup, "SHEETS_START_ROW", "2", 1..=1_000_000)?;

        let max_retries = parse_in_range(&lookup, "SYNC_MAX_RETRIES", "5", 1..=10)?;
        let base_delay_ms = parse_in_range(&lookup, "SYNC_BASE_DELAY_MS", "1000", 1..=60_000)?;
        let max_jitter_ms = parse_in_range(&lookup, "SYNC_MAX_JITTER_MS", "500", 0..=60_000)?;
        let drain_timeout_secs =
            parse_in_range(&lookup, "SYNC_DRAIN_TIMEOUT_SECS", "300", 0..=3_600)?;
        let locate = value_or_default(&lookup, "SYNC_LOCATE_STRATEGY", "scan").parse()?;

        Ok(Self {
            database_path,
            sheets_api_url,
            credentials,
            dispatcher: DispatcherConfig {
                target: SheetTarget::new(spreadsheet_id, sheet_name).with_start_row(start_row),
                retry: RetryPolicy {
                    max_retries,
                    base_delay: Duration::from_millis(u64::from(base_delay_ms)),
                    max_jitter: Duration::from_millis(u64::from(max_jitter_ms)),
                },
                drain_timeout: (drain_timeout_secs > 0)
                    .then(|| Duration::from_secs(u64::from(drain_timeout_secs))),
                locate,
            },
        })
    }

    /// Build the Sheets client described by these settings.
    pub fn sheets_client(&self) -> Result<GoogleSheetsClient> {
        let credentials = match &self.credentials {
            CredentialSource::ServiceAccountFile(path) => {
                Credentials::from_service_account_file(path)
            }
            CredentialSource::AccessToken(token) => Credentials::static_token(token.clone()),
        }
        .map_err(|error| Error::Config(error.to_string()))?;

        GoogleSheetsClient::new(self.sheets_api_url.clone(), credentials)
            .map_err(|error| Error::Config(error.to_string()))
    }
}

/// Parse an integer setting and check it against an inclusive range.
pub fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    bounds: std::ops::RangeInclusive<u32>,
) -> Result<u32> {
    let describe = || {
        format!(
            "{name} must be an integer in [{}, {}]",
            bounds.start(),
            bounds.end()
        )
    };
    let value = value_or_default(lookup, name, default)
        .parse::<u32>()
        .map_err(|_| Error::Config(describe()))?;
    if bounds.contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(describe()))
    }
}

pub fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

pub fn required_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional_trimmed(lookup, name)
        .ok_or_else(|| Error::Config(format!("Missing required environment variable: {name}")))
}

pub fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
