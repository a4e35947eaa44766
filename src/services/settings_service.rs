use std::collections::BTreeMap;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::models::session::Session;
use crate::models::settings::{parse_iso_date, ConfigPayload};
use crate::services::backend::{AvailableDates, BackendError, TextToSqlBackend};
use crate::services::session_store::SessionHandle;

pub const MSG_BUCKET_REQUIRED: &str = "Please enter an S3 bucket name.";
pub const MSG_SAVED: &str = "Settings saved successfully.";
pub const MSG_SAVE_FAILED: &str = "Error saving settings. Please try again.";
pub const MSG_BAD_DATE: &str = "Invalid date format. Use YYYY-MM-DD";
pub const MSG_DATES_FAILED: &str = "Could not fetch the available date range. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("bucket name is required")]
    MissingBucket,
}

/// Fields posted by the settings panel. Everything is optional so the same
/// shape serves the provider switch, the save and the date-range actions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsInput {
    pub bucket_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Short SHA-256 fingerprint of a secret, safe to log.
pub fn key_fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

/// Switch the active provider and repopulate the model list from the cache.
/// Returns false (and changes nothing) for a provider the registry lacks.
pub fn change_provider(session: &mut Session, name: &str) -> bool {
    let Some(provider) = session.registry.get(name) else {
        return false;
    };
    let model = provider
        .default_model()
        .map(|m| m.id.clone())
        .unwrap_or_default();

    session.form.provider = provider.name.clone();
    session.form.model = model;
    true
}

/// Select a model of the active provider. Ids from other providers are ignored.
pub fn select_model(session: &mut Session, id: &str) -> bool {
    let known = session
        .active_provider()
        .map(|p| p.model(id).is_some())
        .unwrap_or(false);
    if known {
        session.form.model = id.to_string();
    }
    known
}

/// Copy posted field values into the form, the way edits sit in the inputs
/// until the next action. Malformed dates keep their previous value.
pub fn apply_input(session: &mut Session, input: &SettingsInput) {
    if let Some(provider) = input.provider.as_deref() {
        if provider != session.form.provider {
            change_provider(session, provider);
        }
    }
    if let Some(model) = input.model.as_deref() {
        select_model(session, model);
    }
    if let Some(bucket) = &input.bucket_name {
        session.form.bucket_name = bucket.trim().to_string();
    }
    // The key is never rendered back, so an empty field means "unchanged".
    if let Some(key) = input.api_key.as_deref().map(str::trim) {
        if !key.is_empty() {
            session.form.api_key = key.to_string();
        }
    }

    let mut bad_date = false;
    for (raw, slot) in [
        (&input.start_date, &mut session.form.start_date),
        (&input.end_date, &mut session.form.end_date),
    ] {
        if let Some(raw) = raw {
            match parse_iso_date(raw) {
                Some(date) => *slot = date,
                None => bad_date = true,
            }
        }
    }
    if bad_date {
        session.transcript.push_bot(MSG_BAD_DATE);
    }
}

/// Validate the form and build the payload for `POST /api/config`.
/// A validation failure is reported in the transcript.
pub fn prepare_save(session: &mut Session) -> Result<ConfigPayload, ValidationError> {
    let bucket_name = session.form.bucket_name.trim();
    if bucket_name.is_empty() {
        session.transcript.push_bot(MSG_BUCKET_REQUIRED);
        return Err(ValidationError::MissingBucket);
    }

    let api_keys = if session.form.api_key.is_empty() {
        None
    } else {
        let mut keys = BTreeMap::new();
        keys.insert(session.form.provider.clone(), session.form.api_key.clone());
        Some(keys)
    };

    Ok(ConfigPayload {
        bucket_name: bucket_name.to_string(),
        provider: session.form.provider.clone(),
        model: session.form.model.clone(),
        api_keys,
    })
}

pub fn finish_save(session: &mut Session, result: Result<(), BackendError>) {
    match result {
        Ok(()) => session.transcript.push_bot(MSG_SAVED),
        Err(e) => {
            tracing::warn!(session = %session.id, "Saving settings failed: {}", e);
            session.transcript.push_bot(MSG_SAVE_FAILED);
        }
    }
}

/// Apply the posted fields, validate, and persist to the backend.
/// The session lock is released while the backend call is outstanding.
pub async fn save(
    handle: &SessionHandle,
    backend: &dyn TextToSqlBackend,
    input: &SettingsInput,
) -> Result<(), ValidationError> {
    let (session_id, payload) = {
        let mut session = handle.lock().await;
        apply_input(&mut session, input);
        (session.id, prepare_save(&mut session)?)
    };

    if let Some(keys) = &payload.api_keys {
        for (provider, key) in keys {
            tracing::info!(
                session = %session_id,
                provider = %provider,
                key_fingerprint = %key_fingerprint(key),
                "Submitting API key with settings"
            );
        }
    }

    let result = backend.save_config(&payload).await;

    let mut session = handle.lock().await;
    finish_save(&mut session, result);
    Ok(())
}

pub fn finish_available_dates(
    session: &mut Session,
    result: Result<AvailableDates, BackendError>,
) {
    match result {
        Ok(AvailableDates::Range(range)) => {
            session.form.start_date = range.start_date;
            session.form.end_date = range.end_date;
            session.transcript.push_bot(format!(
                "Date range set to the available data: {} to {}.",
                range.start_date.format("%Y-%m-%d"),
                range.end_date.format("%Y-%m-%d")
            ));
        }
        Ok(AvailableDates::Unavailable(message)) => {
            session.transcript.push_bot(format!("Error: {message}"));
        }
        Err(e) => {
            tracing::warn!(session = %session.id, "Available dates lookup failed: {}", e);
            session.transcript.push_bot(MSG_DATES_FAILED);
        }
    }
}

/// Replace the date range with the span of data the backend holds.
pub async fn use_available_dates(
    handle: &SessionHandle,
    backend: &dyn TextToSqlBackend,
    input: &SettingsInput,
) {
    {
        let mut session = handle.lock().await;
        apply_input(&mut session, input);
    }

    let result = backend.available_dates().await;

    let mut session = handle.lock().await;
    finish_available_dates(&mut session, result);
}
