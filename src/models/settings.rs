use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Current field values of the settings panel.
///
/// Queries read provider, model and date range from here directly; only the
/// explicit save action pushes a [`ConfigPayload`] to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsForm {
    pub bucket_name: String,
    /// Active provider name. Empty when the registry could not be loaded.
    pub provider: String,
    /// Selected model id. Always one of the active provider's models, or empty.
    pub model: String,
    /// Whatever the user typed into the API-key input. Never rendered back.
    pub api_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SettingsForm {
    /// Empty form whose date range ends on `today` and spans `range_days`.
    pub fn new(today: NaiveDate, range_days: u32) -> Self {
        Self {
            bucket_name: String::new(),
            provider: String::new(),
            model: String::new(),
            api_key: String::new(),
            start_date: today
                .checked_sub_signed(Duration::days(i64::from(range_days)))
                .unwrap_or(NaiveDate::MIN),
            end_date: today,
        }
    }
}

/// Body of `POST /api/config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigPayload {
    pub bucket_name: String,
    pub provider: String,
    pub model: String,
    /// Present only when a key was entered: `{ <provider>: <key> }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<BTreeMap<String, String>>,
}

/// Body of `GET /api/config`. The masked `api_keys` map it also carries is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
}

/// Body of a successful `GET /api/available-dates`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Parse an ISO calendar date (`YYYY-MM-DD`) as sent by date inputs.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
