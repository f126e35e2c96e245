//! Ledger settings loading from config.toml
//!
//! The `[ledger]` table tunes the engine: the local offset used for timestamps,
//! the optimistic retry policy, and the defaults for the two balance policies the
//! engine leaves to the business (overpayment handling and over-collection).

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// How `add_collection` treats an amount larger than the customer's current debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverCollectionPolicy {
    /// Apply the full amount; the balance may go negative (credit owed to the customer)
    #[default]
    Allow,
    /// Fail with a validation error
    Reject,
    /// Reduce the amount so the balance stops at zero
    Clamp,
}

/// Engine behaviour settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Fixed offset (hours east of UTC) for every stored timestamp
    pub utc_offset_hours: i32,
    /// Attempts per atomic unit before a conflict is surfaced
    pub max_attempts: u32,
    /// Base backoff between attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
    /// Whether cash overpayment becomes customer credit when the caller does not say
    pub extra_as_credit_default: bool,
    /// What to do with a collection larger than the customer's debt
    pub over_collection: OverCollectionPolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            utc_offset_hours: 3,
            max_attempts: 5,
            retry_backoff_ms: 10,
            extra_as_credit_default: true,
            over_collection: OverCollectionPolicy::Allow,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
}

/// Parses the `[ledger]` table out of a config.toml document.
pub fn parse_settings(contents: &str) -> Result<LedgerSettings> {
    let file: SettingsFile = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse ledger settings: {e}"),
    })?;
    validate(&file.ledger)?;
    Ok(file.ledger)
}

fn validate(settings: &LedgerSettings) -> Result<()> {
    if !(-23..=23).contains(&settings.utc_offset_hours) {
        return Err(Error::Config {
            message: format!("utc_offset_hours out of range: {}", settings.utc_offset_hours),
        });
    }
    if settings.max_attempts == 0 {
        return Err(Error::Config {
            message: "max_attempts must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Loads ledger settings from a TOML file.
///
/// A missing file yields the defaults; an unreadable or malformed one is an error.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<LedgerSettings> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using default ledger settings");
        return Ok(LedgerSettings::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_settings(&contents)
}

/// Path of the config file: `BAKERY_CONFIG` or ./config.toml
#[must_use]
pub fn config_path() -> String {
    std::env::var("BAKERY_CONFIG").unwrap_or_else(|_| "config.toml".to_string())
}
