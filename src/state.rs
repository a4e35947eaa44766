use std::sync::Arc;

use crate::config::Config;
use crate::services::backend::TextToSqlBackend;
use crate::services::session_store::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn TextToSqlBackend>,
    pub sessions: Arc<SessionStore>,
}
