use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Local;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::session::Session;
use crate::services::registry_service;
use crate::services::session_store::SessionHandle;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sql_chat_session";

/// The caller's session, injected into request extensions.
#[derive(Clone)]
pub struct CurrentSession {
    pub id: Uuid,
    pub handle: SessionHandle,
}

/// Read the session id from the Cookie header(s).
fn extract_session_id(req: &Request) -> Option<Uuid> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name == SESSION_COOKIE {
                Uuid::parse_str(value.trim()).ok()
            } else {
                None
            }
        })
}

fn session_cookie(id: Uuid, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(format!("session cookie: {e}")))
}

/// Create a session and load its provider registry before anyone can see it.
pub async fn create_session(state: &AppState) -> SessionHandle {
    let mut session = Session::new(Local::now().date_naive(), state.config.default_range_days);
    registry_service::load(&mut session, state.backend.as_ref()).await;
    tracing::info!(session = %session.id, "Created session");
    state.sessions.insert(session).await
}

/// Middleware that resolves the session cookie, creating a session (and
/// setting the cookie) for unknown or missing ids.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = match extract_session_id(&req) {
        Some(id) => state.sessions.get(&id).await,
        None => None,
    };

    let (handle, created) = match existing {
        Some(handle) => (handle, false),
        None => (create_session(&state).await, true),
    };

    let id = {
        let mut session = handle.lock().await;
        session.touch();
        session.id
    };

    req.extensions_mut().insert(CurrentSession { id, handle });
    let mut resp = next.run(req).await;

    if created {
        match session_cookie(id, state.config.cookie_secure) {
            Ok(cookie) => {
                resp.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Err(e) => return e.into_response(),
        }
    }
    resp
}
