use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::query::{QueryRequest, QueryResult};
use crate::models::session::{InFlightQuery, Session};
use crate::services::backend::{BackendError, TextToSqlBackend};
use crate::services::session_store::SessionHandle;
use crate::views::results::render_results;

pub const MSG_PROCESSING: &str = "Processing your question...";
pub const MSG_TRANSPORT_FAILED: &str =
    "Sorry, there was an error processing your request. Please try again.";
pub const MSG_TIMED_OUT: &str = "The query timed out. Please try again.";
pub const MSG_CANCELLED: &str = "Query cancelled.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("a query is already in progress")]
    Busy,
}

/// A submitted question waiting to be sent.
#[derive(Debug, Clone)]
pub struct QueryTicket {
    pub id: Uuid,
    pub request: QueryRequest,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub enum QueryOutcome {
    Answered(QueryResult),
    Failed(BackendError),
    TimedOut,
    Cancelled,
}

/// Accept a question: append it to the transcript right away and claim the
/// session's single in-flight slot.
///
/// Blank questions are a no-op (`Ok(None)`). A second question while one is
/// outstanding is rejected without touching the transcript.
pub fn begin(session: &mut Session, question: &str) -> Result<Option<QueryTicket>, ConversationError> {
    let question = question.trim();
    if question.is_empty() {
        return Ok(None);
    }
    if session.is_busy() {
        return Err(ConversationError::Busy);
    }

    session.transcript.push_user(question);

    let ticket = QueryTicket {
        id: Uuid::new_v4(),
        request: QueryRequest {
            question: question.to_string(),
            start_date: session.form.start_date,
            end_date: session.form.end_date,
            provider: session.form.provider.clone(),
            model: session.form.model.clone(),
        },
        cancel: CancellationToken::new(),
    };
    session.in_flight = Some(InFlightQuery {
        ticket: ticket.id,
        cancel: ticket.cancel.clone(),
        started_at: Utc::now(),
    });

    Ok(Some(ticket))
}

/// Send the ticket's request, bounded by `timeout` and its cancellation token.
pub async fn execute(
    backend: &dyn TextToSqlBackend,
    ticket: &QueryTicket,
    timeout: Duration,
) -> QueryOutcome {
    tokio::select! {
        biased;
        _ = ticket.cancel.cancelled() => QueryOutcome::Cancelled,
        res = tokio::time::timeout(timeout, backend.query(&ticket.request)) => match res {
            Err(_) => QueryOutcome::TimedOut,
            Ok(Ok(result)) => QueryOutcome::Answered(result),
            Ok(Err(e)) => QueryOutcome::Failed(e),
        },
    }
}

/// Clear the processing indicator and record the outcome.
///
/// Returns false when the ticket is no longer the session's in-flight query
/// (it was cancelled meanwhile); the late outcome is then dropped.
pub fn finish(session: &mut Session, ticket: Uuid, outcome: QueryOutcome) -> bool {
    match &session.in_flight {
        Some(q) if q.ticket == ticket => {}
        _ => {
            tracing::debug!(session = %session.id, %ticket, "Dropping outcome of a stale query");
            return false;
        }
    }
    session.in_flight = None;

    match outcome {
        QueryOutcome::Answered(result) => match result.error.as_deref().filter(|e| !e.is_empty()) {
            Some(error) => {
                session.transcript.push_bot(format!("Error: {error}"));
            }
            None => {
                session.transcript.push_bot(result.explanation.clone());
                session.results.show(render_results(&result));
            }
        },
        QueryOutcome::Failed(e) => {
            tracing::warn!(session = %session.id, %ticket, "Query request failed: {}", e);
            session.transcript.push_bot(MSG_TRANSPORT_FAILED);
        }
        QueryOutcome::TimedOut => {
            tracing::warn!(session = %session.id, %ticket, "Query timed out");
            session.transcript.push_bot(MSG_TIMED_OUT);
        }
        QueryOutcome::Cancelled => {
            session.transcript.push_bot(MSG_CANCELLED);
        }
    }
    true
}

/// Cancel the in-flight query, if any. The indicator goes away immediately;
/// whatever the backend answers later is discarded.
pub fn cancel(session: &mut Session) -> bool {
    let Some(q) = session.in_flight.as_ref() else {
        return false;
    };
    q.cancel.cancel();
    let ticket = q.ticket;
    let waited_ms = (Utc::now() - q.started_at).num_milliseconds();
    tracing::info!(session = %session.id, %ticket, waited_ms, "Query cancelled by user");
    finish(session, ticket, QueryOutcome::Cancelled)
}

/// Run a ticket to completion against the session it came from.
pub async fn run(
    handle: SessionHandle,
    backend: Arc<dyn TextToSqlBackend>,
    ticket: QueryTicket,
    timeout: Duration,
) {
    let started = std::time::Instant::now();
    let outcome = execute(backend.as_ref(), &ticket, timeout).await;
    tracing::info!(
        ticket = %ticket.id,
        provider = %ticket.request.provider,
        model = %ticket.request.model,
        latency_ms = started.elapsed().as_millis() as u64,
        "Query finished: {}",
        match &outcome {
            QueryOutcome::Answered(r) if r.error.as_deref().is_some_and(|e| !e.is_empty()) => {
                "backend error"
            }
            QueryOutcome::Answered(_) => "answered",
            QueryOutcome::Failed(_) => "failed",
            QueryOutcome::TimedOut => "timed out",
            QueryOutcome::Cancelled => "cancelled",
        }
    );

    let mut session = handle.lock().await;
    finish(&mut session, ticket.id, outcome);
}

/// Submit a question and wait for its answer. Returns whether anything was sent.
/// Routes spawn [`run`] instead so the page is not held up.
#[allow(dead_code)]
pub async fn submit(
    handle: &SessionHandle,
    backend: Arc<dyn TextToSqlBackend>,
    question: &str,
    timeout: Duration,
) -> Result<bool, ConversationError> {
    let ticket = {
        let mut session = handle.lock().await;
        begin(&mut session, question)?
    };
    match ticket {
        Some(ticket) => {
            run(handle.clone(), backend, ticket, timeout).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use serde_json::json;
    use tokio::sync::Mutex;

    use crate::models::provider::ProviderRegistry;
    use crate::models::transcript::Role;
    use crate::services::backend::fake::{sample_providers, FakeBackend};
    use crate::services::settings_service;
    use crate::models::results::{ResultsPanel, ResultsTable};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn handle() -> SessionHandle {
        let mut session = Session::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 30);
        session.registry = ProviderRegistry::new(sample_providers());
        settings_service::change_provider(&mut session, "openai");
        Arc::new(Mutex::new(session))
    }

    fn reply(body: serde_json::Value) -> QueryResult {
        serde_json::from_value(body).unwrap()
    }

    fn texts(session: &Session) -> Vec<(Role, String)> {
        session
            .transcript
            .messages()
            .iter()
            .map(|m| (m.role, m.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn blank_question_is_a_no_op() {
        let backend = Arc::new(FakeBackend::new());
        let h = handle();

        for q in ["", "   ", "\n\t"] {
            assert_eq!(submit(&h, backend.clone(), q, TIMEOUT).await, Ok(false));
        }

        assert!(backend.calls().is_empty());
        let session = h.lock().await;
        assert_eq!(session.transcript.len(), 0);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn successful_answer_adds_explanation_and_table() {
        let backend = Arc::new(FakeBackend::new().with_query_reply(reply(json!({
            "explanation": "Top product is Widget",
            "sql_query": "SELECT product, sales FROM sales ORDER BY sales DESC LIMIT 1",
            "results": [{"product": "Widget", "sales": 120}]
        }))));
        let h = handle();

        assert_eq!(
            submit(&h, backend.clone(), "  What sold best?  ", TIMEOUT).await,
            Ok(true)
        );

        let session = h.lock().await;
        assert_eq!(
            texts(&session),
            [
                (Role::User, "What sold best?".to_string()),
                (Role::Bot, "Top product is Widget".to_string()),
            ]
        );
        let shown = session.results.rendered().expect("results panel shown");
        assert_eq!(
            shown.table,
            ResultsTable::Rows {
                headers: vec!["product".into(), "sales".into()],
                rows: vec![vec!["Widget".into(), "120".into()]],
            }
        );
        assert!(!session.is_busy());

        let sent = backend.queries.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].question, "What sold best?");
        assert_eq!(sent[0].provider, "openai");
        assert_eq!(sent[0].model, "gpt-4");
        assert_eq!(sent[0].start_date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(sent[0].end_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[tokio::test]
    async fn server_error_is_prefixed_and_leaves_results_alone() {
        let backend = Arc::new(
            FakeBackend::new().with_query_reply(reply(json!({"error": "Invalid API key"}))),
        );
        let h = handle();

        submit(&h, backend, "total revenue", TIMEOUT).await.unwrap();

        let session = h.lock().await;
        assert_eq!(session.transcript.last().unwrap().text, "Error: Invalid API key");
        assert_eq!(session.results, ResultsPanel::Hidden);
    }

    #[tokio::test]
    async fn empty_error_string_counts_as_an_answer() {
        let backend = Arc::new(FakeBackend::new().with_query_reply(reply(json!({
            "error": "",
            "explanation": "Top product is Widget",
            "sql_query": "SELECT product FROM sales LIMIT 1",
            "results": [{"product": "Widget"}]
        }))));
        let h = handle();

        submit(&h, backend, "What sold best?", TIMEOUT).await.unwrap();

        let session = h.lock().await;
        assert_eq!(session.transcript.last().unwrap().text, "Top product is Widget");
        assert!(session.results.rendered().is_some());
    }

    #[tokio::test]
    async fn server_error_keeps_previous_results_visible() {
        let ok = reply(json!({"explanation": "one row", "sql_query": "SELECT 1", "results": [{"a": 1}]}));
        let backend = Arc::new(FakeBackend::new().with_query_reply(ok));
        let h = handle();
        submit(&h, backend.clone(), "first", TIMEOUT).await.unwrap();
        let before = h.lock().await.results.clone();

        *backend.query_reply.lock().unwrap() = Some(reply(json!({"error": "boom"})));
        submit(&h, backend, "second", TIMEOUT).await.unwrap();

        let session = h.lock().await;
        assert_eq!(session.results, before);
        assert_eq!(session.transcript.len(), 4);
    }

    #[tokio::test]
    async fn transport_failure_keeps_question_and_suggests_retry() {
        let backend = Arc::new(FakeBackend::new());
        let h = handle();

        submit(&h, backend.clone(), "total revenue", TIMEOUT).await.unwrap();

        let session = h.lock().await;
        assert_eq!(
            texts(&session),
            [
                (Role::User, "total revenue".to_string()),
                (Role::Bot, MSG_TRANSPORT_FAILED.to_string()),
            ]
        );
        assert_eq!(backend.call_count("query"), 1);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn empty_results_render_placeholder() {
        let backend = Arc::new(FakeBackend::new().with_query_reply(reply(json!({
            "explanation": "No sales in range",
            "sql_query": "SELECT * FROM sales WHERE 1 = 0",
            "results": []
        }))));
        let h = handle();

        submit(&h, backend, "anything?", TIMEOUT).await.unwrap();

        let session = h.lock().await;
        assert_eq!(session.results.rendered().unwrap().table, ResultsTable::Empty);
    }

    #[tokio::test]
    async fn second_question_while_busy_is_rejected() {
        let h = handle();
        let ticket = {
            let mut session = h.lock().await;
            begin(&mut session, "first").unwrap().unwrap()
        };

        let mut session = h.lock().await;
        assert_eq!(begin(&mut session, "second").unwrap_err(), ConversationError::Busy);
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.in_flight.as_ref().unwrap().ticket, ticket.id);
    }

    #[tokio::test]
    async fn question_is_visible_while_in_flight() {
        let h = handle();
        let mut session = h.lock().await;
        begin(&mut session, "slow question").unwrap();
        assert!(session.is_busy());
        assert_eq!(session.transcript.last().unwrap().text, "slow question");
        assert_eq!(session.transcript.last().unwrap().role, Role::User);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_query_delay(Duration::from_secs(600))
                .with_query_reply(reply(json!({"explanation": "late"}))),
        );
        let h = handle();

        submit(&h, backend, "slow", Duration::from_secs(30)).await.unwrap();

        let session = h.lock().await;
        assert_eq!(session.transcript.last().unwrap().text, MSG_TIMED_OUT);
        assert_eq!(session.results, ResultsPanel::Hidden);
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_late_answer() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_query_delay(Duration::from_secs(10))
                .with_query_reply(reply(json!({"explanation": "late", "results": [{"a": 1}]}))),
        );
        let h = handle();
        let ticket = {
            let mut session = h.lock().await;
            begin(&mut session, "cancel me").unwrap().unwrap()
        };
        let task = tokio::spawn(run(h.clone(), backend, ticket, Duration::from_secs(60)));

        {
            let mut session = h.lock().await;
            assert!(cancel(&mut session));
            assert!(!session.is_busy());
        }
        task.await.unwrap();

        let session = h.lock().await;
        assert_eq!(
            texts(&session),
            [
                (Role::User, "cancel me".to_string()),
                (Role::Bot, MSG_CANCELLED.to_string()),
            ]
        );
        assert_eq!(session.results, ResultsPanel::Hidden);
    }

    #[tokio::test]
    async fn cancel_without_query_does_nothing() {
        let h = handle();
        let mut session = h.lock().await;
        assert!(!cancel(&mut session));
        assert_eq!(session.transcript.len(), 0);
    }

    #[tokio::test]
    async fn messages_keep_submission_order() {
        let backend = Arc::new(FakeBackend::new().with_query_reply(reply(json!({
            "explanation": "answer", "sql_query": "SELECT 1", "results": []
        }))));
        let h = handle();

        for q in ["q1", "q2", "q3"] {
            submit(&h, backend.clone(), q, TIMEOUT).await.unwrap();
        }

        let session = h.lock().await;
        let order: Vec<String> = session.transcript.messages().iter().map(|m| m.text.clone()).collect();
        assert_eq!(order, ["q1", "answer", "q2", "answer", "q3", "answer"]);
    }
}
