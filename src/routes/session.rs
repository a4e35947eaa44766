use axum::{
    extract::State,
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::middleware::session::CurrentSession;
use crate::state::AppState;
use crate::views::page::SessionView;

/// GET /session: JSON snapshot of what the page shows
async fn snapshot(Extension(current): Extension<CurrentSession>) -> Json<SessionView> {
    let session = current.handle.lock().await;
    Json(SessionView::from_session(&session))
}

/// POST /session/reset: forget the session; the next visit starts fresh
async fn reset(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Redirect {
    if state.sessions.remove(&current.id).await {
        tracing::info!(session = %current.id, "Session reset");
    }
    Redirect::to("/")
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(snapshot))
        .route("/session/reset", post(reset))
}
