use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::provider::{ProviderDescriptor, ProviderRegistry};
use crate::models::results::ResultsPanel;
use crate::models::settings::SettingsForm;
use crate::models::transcript::Transcript;

/// The query currently awaiting a backend answer.
#[derive(Debug, Clone)]
pub struct InFlightQuery {
    pub ticket: Uuid,
    pub cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
}

/// Everything one browser session sees: registry cache, settings fields,
/// transcript, results panel and the single in-flight query slot.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub registry: ProviderRegistry,
    pub form: SettingsForm,
    pub transcript: Transcript,
    pub results: ResultsPanel,
    pub in_flight: Option<InFlightQuery>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(today: NaiveDate, range_days: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry: ProviderRegistry::default(),
            form: SettingsForm::new(today, range_days),
            transcript: Transcript::default(),
            results: ResultsPanel::Hidden,
            in_flight: None,
            last_seen: Utc::now(),
        }
    }

    pub fn active_provider(&self) -> Option<&ProviderDescriptor> {
        self.registry.get(&self.form.provider)
    }

    /// Whether the API-key input is shown.
    pub fn api_key_visible(&self) -> bool {
        self.active_provider().map(|p| p.requires_key).unwrap_or(false)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}
