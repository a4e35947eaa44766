use axum::{
    extract::State,
    response::{Html, Redirect},
    routing::{get, post},
    Extension, Form, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::session::CurrentSession;
use crate::services::conversation_service;
use crate::services::settings_service::{self, SettingsInput};
use crate::state::AppState;
use crate::views::page::{render_page, SessionView};

#[derive(Debug, Deserialize)]
pub struct ChatInput {
    #[serde(default)]
    pub question: String,
}

/// GET /: the chat page
async fn index(Extension(current): Extension<CurrentSession>) -> Html<String> {
    let session = current.handle.lock().await;
    Html(render_page(&SessionView::from_session(&session)))
}

/// POST /settings/provider: switch provider, keep other edited fields
async fn change_provider(
    Extension(current): Extension<CurrentSession>,
    Form(input): Form<SettingsInput>,
) -> Result<Redirect, AppError> {
    let mut session = current.handle.lock().await;
    if let Some(name) = input.provider.as_deref() {
        if session.registry.get(name).is_none() {
            return Err(AppError::BadRequest(format!("Unknown provider: {name}")));
        }
    }
    settings_service::apply_input(&mut session, &input);
    Ok(Redirect::to("/"))
}

/// POST /settings: apply fields and persist them to the backend
async fn save_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Form(input): Form<SettingsInput>,
) -> Redirect {
    if let Err(e) = settings_service::save(&current.handle, state.backend.as_ref(), &input).await {
        tracing::debug!(session = %current.id, "Settings not saved: {}", e);
    }
    Redirect::to("/")
}

/// POST /settings/dates: replace the date range with the backend's available range
async fn available_dates(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Form(input): Form<SettingsInput>,
) -> Redirect {
    settings_service::use_available_dates(&current.handle, state.backend.as_ref(), &input).await;
    Redirect::to("/")
}

/// POST /chat: accept a question and answer it in the background.
/// A second question while one is outstanding is dropped and the page redisplayed.
async fn submit_question(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Form(input): Form<ChatInput>,
) -> Redirect {
    let begun = {
        let mut session = current.handle.lock().await;
        conversation_service::begin(&mut session, &input.question)
    };

    match begun {
        Ok(Some(ticket)) => {
            tracing::info!(session = %current.id, ticket = %ticket.id, "Question submitted");
            tokio::spawn(conversation_service::run(
                current.handle.clone(),
                state.backend.clone(),
                ticket,
                state.config.query_timeout,
            ));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(session = %current.id, "Question rejected: {}", e);
        }
    }
    Redirect::to("/")
}

/// POST /chat/cancel: abandon the in-flight query
async fn cancel_question(Extension(current): Extension<CurrentSession>) -> Redirect {
    let mut session = current.handle.lock().await;
    conversation_service::cancel(&mut session);
    Redirect::to("/")
}

/// Build the page and form-action router (session middleware applied by the caller)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/settings", post(save_settings))
        .route("/settings/provider", post(change_provider))
        .route("/settings/dates", post(available_dates))
        .route("/chat", post(submit_question))
        .route("/chat/cancel", post(cancel_question))
}
