use crate::models::provider::ProviderRegistry;
use crate::models::session::Session;
use crate::services::backend::TextToSqlBackend;
use crate::services::settings_service;

/// Load the provider registry into a fresh session.
///
/// Runs once per session. On failure the transcript explains why and the
/// model selector stays empty; there is no retry.
pub async fn load(session: &mut Session, backend: &dyn TextToSqlBackend) {
    let providers = match backend.list_providers().await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(session = %session.id, "Provider registry load failed: {}", e);
            session
                .transcript
                .push_bot(format!("Failed to load providers: {e}"));
            return;
        }
    };

    tracing::debug!(session = %session.id, "Loaded {} providers", providers.len());
    session.registry = ProviderRegistry::new(providers);
    if session.registry.is_empty() {
        tracing::warn!(session = %session.id, "Backend advertises no providers");
    }

    // Backend defaults are a convenience; the registry alone is enough.
    let config = match backend.get_config().await {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::debug!(session = %session.id, "Backend config unavailable: {}", e);
            None
        }
    };

    let default_provider = config
        .as_ref()
        .and_then(|c| c.default_provider.as_deref())
        .filter(|name| session.registry.get(name).is_some())
        .map(str::to_string)
        .or_else(|| session.registry.first().map(|p| p.name.clone()));

    if let Some(name) = default_provider {
        settings_service::change_provider(session, &name);
    }

    if let Some(config) = config {
        if let Some(model) = config.default_model.as_deref() {
            settings_service::select_model(session, model);
        }
        if let Some(bucket) = config.bucket_name.filter(|b| !b.trim().is_empty()) {
            session.form.bucket_name = bucket;
        }
    }
}
