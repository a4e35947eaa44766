use std::fmt::Write as _;

use serde::Serialize;

use crate::models::results::RenderedResults;
use crate::models::session::Session;
use crate::models::transcript::ChatMessage;
use crate::services::conversation_service::MSG_PROCESSING;
use crate::views::escape::escape_html;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderOption {
    pub name: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
    pub selected: bool,
}

/// Everything the page shows, derived from a session. Also served as JSON
/// from `GET /session`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub providers: Vec<ProviderOption>,
    pub provider: String,
    /// Models of the active provider only, in registry order.
    pub models: Vec<ModelOption>,
    pub model: String,
    pub api_key_visible: bool,
    /// Whether a key has been entered this session. The key itself is never exposed.
    pub api_key_entered: bool,
    pub bucket_name: String,
    pub start_date: String,
    pub end_date: String,
    pub transcript: Vec<ChatMessage>,
    /// Processing indicator, present while a query is in flight.
    pub processing: Option<&'static str>,
    pub results: Option<RenderedResults>,
}

impl SessionView {
    pub fn from_session(session: &Session) -> Self {
        let providers = session
            .registry
            .providers()
            .iter()
            .map(|p| ProviderOption {
                name: p.name.clone(),
                label: p.label().to_string(),
                selected: p.name == session.form.provider,
            })
            .collect();

        let models = session
            .active_provider()
            .map(|p| {
                p.models
                    .iter()
                    .map(|m| ModelOption {
                        id: m.id.clone(),
                        name: m.name.clone(),
                        selected: m.id == session.form.model,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            providers,
            provider: session.form.provider.clone(),
            models,
            model: session.form.model.clone(),
            api_key_visible: session.api_key_visible(),
            api_key_entered: !session.form.api_key.is_empty(),
            bucket_name: session.form.bucket_name.clone(),
            start_date: session.form.start_date.format("%Y-%m-%d").to_string(),
            end_date: session.form.end_date.format("%Y-%m-%d").to_string(),
            transcript: session.transcript.messages().to_vec(),
            processing: session.is_busy().then_some(MSG_PROCESSING),
            results: session.results.rendered().cloned(),
        }
    }
}

const STYLE: &str = r#"
    body { font-family: system-ui, sans-serif; margin: 0; background: #f5f6f8; color: #1f2328; }
    header { background: #232f3e; color: #fff; padding: 12px 24px; }
    main { display: grid; grid-template-columns: 320px 1fr; gap: 16px; padding: 16px 24px; }
    section { background: #fff; border-radius: 8px; padding: 16px; box-shadow: 0 1px 2px rgba(0,0,0,.08); }
    label { display: block; font-size: .85rem; margin-top: 10px; }
    input, select, textarea { width: 100%; box-sizing: border-box; padding: 6px; }
    .row { display: flex; gap: 8px; }
    .messages { max-height: 420px; overflow-y: auto; }
    .message { padding: 8px 12px; border-radius: 8px; margin: 6px 0; white-space: pre-wrap; }
    .message.user { background: #dbeafe; margin-left: 20%; }
    .message.bot { background: #f1f5f9; margin-right: 20%; }
    .message.processing { font-style: italic; color: #64748b; }
    pre { background: #0f172a; color: #e2e8f0; padding: 10px; overflow-x: auto; }
    table.results { border-collapse: collapse; width: 100%; }
    table.results th, table.results td { border: 1px solid #d0d7de; padding: 4px 8px; text-align: left; }
    td.empty { text-align: center; color: #64748b; }
"#;

/// Polls `GET /session` while a query is in flight and, once it settles,
/// swaps in the fresh chat section. The settings form is never reloaded.
const POLL_SCRIPT: &str = r#"<script>
(function () {
  function swapChat() {
    fetch('/', { credentials: 'same-origin' })
      .then(function (r) { return r.text(); })
      .then(function (html) {
        var next = new DOMParser().parseFromString(html, 'text/html').getElementById('chat');
        if (next) { document.getElementById('chat').replaceWith(next); }
      })
      .catch(function () { location.reload(); });
  }
  function poll() {
    setTimeout(function () {
      fetch('/session', { credentials: 'same-origin' })
        .then(function (r) { return r.json(); })
        .then(function (s) { if (s.processing === null) { swapChat(); } else { poll(); } })
        .catch(poll);
    }, 2000);
  }
  poll();
})();
</script>"#;

fn write_settings(html: &mut String, view: &SessionView) {
    html.push_str("<section class=\"settings\"><h2>Settings</h2>");
    html.push_str("<form method=\"post\" action=\"/settings\">");

    let _ = write!(
        html,
        "<label for=\"bucket_name\">S3 bucket name</label>\
         <input id=\"bucket_name\" name=\"bucket_name\" value=\"{}\">",
        escape_html(&view.bucket_name)
    );

    let _ = write!(
        html,
        "<div class=\"row\"><div><label for=\"start_date\">Start date</label>\
         <input type=\"date\" id=\"start_date\" name=\"start_date\" value=\"{}\"></div>\
         <div><label for=\"end_date\">End date</label>\
         <input type=\"date\" id=\"end_date\" name=\"end_date\" value=\"{}\"></div></div>\
         <button type=\"submit\" formaction=\"/settings/dates\">Use available dates</button>",
        escape_html(&view.start_date),
        escape_html(&view.end_date)
    );

    html.push_str(
        "<label for=\"provider\">LLM provider</label>\
         <select id=\"provider\" name=\"provider\" \
         onchange=\"this.form.action='/settings/provider';this.form.submit()\">",
    );
    for p in &view.providers {
        let _ = write!(
            html,
            "<option value=\"{}\"{}>{}</option>",
            escape_html(&p.name),
            if p.selected { " selected" } else { "" },
            escape_html(&p.label)
        );
    }
    html.push_str(
        "</select><noscript><button type=\"submit\" formaction=\"/settings/provider\">\
         Switch provider</button></noscript>",
    );

    html.push_str("<label for=\"model\">Model</label><select id=\"model\" name=\"model\">");
    for m in &view.models {
        let _ = write!(
            html,
            "<option value=\"{}\"{}>{}</option>",
            escape_html(&m.id),
            if m.selected { " selected" } else { "" },
            escape_html(&m.name)
        );
    }
    html.push_str("</select>");

    if view.api_key_visible {
        let _ = write!(
            html,
            "<div id=\"api-key-group\"><label for=\"api_key\">API key</label>\
             <input type=\"password\" id=\"api_key\" name=\"api_key\" autocomplete=\"off\" \
             placeholder=\"{}\"></div>",
            if view.api_key_entered {
                "Key entered (leave blank to keep)"
            } else {
                "Enter API key"
            }
        );
    }

    html.push_str("<p><button type=\"submit\">Save settings</button></p></form>");
    html.push_str(
        "<form method=\"post\" action=\"/session/reset\">\
         <button type=\"submit\">Start over</button></form></section>",
    );
}

fn write_chat(html: &mut String, view: &SessionView) {
    html.push_str(
        "<section class=\"chat\" id=\"chat\"><h2>Chat</h2><div class=\"messages\" id=\"messages\">",
    );
    for msg in &view.transcript {
        let _ = write!(
            html,
            "<div class=\"message {}\">{}</div>",
            msg.role.as_str(),
            escape_html(&msg.text)
        );
    }
    if let Some(indicator) = view.processing {
        let _ = write!(
            html,
            "<div class=\"message bot processing\" id=\"processing\">{}</div>",
            escape_html(indicator)
        );
    }
    html.push_str("</div>");

    if view.processing.is_some() {
        html.push_str(
            "<form method=\"post\" action=\"/chat/cancel\">\
             <button type=\"submit\">Cancel query</button></form>",
        );
    } else {
        html.push_str(
            "<form method=\"post\" action=\"/chat\">\
             <textarea name=\"question\" rows=\"2\" \
             placeholder=\"Ask a question about your data...\"></textarea>\
             <button type=\"submit\" id=\"send\">Send</button></form>",
        );
    }

    if let Some(results) = &view.results {
        html.push_str("<div class=\"results-panel\" id=\"results\"><h2>Results</h2>");
        html.push_str(&results.to_html());
        html.push_str("</div>");
    }
    html.push_str("</section>");
}

/// Full chat page.
pub fn render_page(view: &SessionView) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
    if view.processing.is_some() {
        html.push_str("<noscript><meta http-equiv=\"refresh\" content=\"2\"></noscript>");
    }
    let _ = write!(
        html,
        "<title>Text-to-SQL Chat</title><style>{STYLE}</style></head><body>"
    );
    html.push_str("<header><h1>Text-to-SQL Chat</h1></header><main>");
    write_settings(&mut html, view);
    write_chat(&mut html, view);
    html.push_str("</main>");
    if view.processing.is_some() {
        html.push_str(POLL_SCRIPT);
    }
    html.push_str("</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::models::provider::{ModelDescriptor, ProviderDescriptor, ProviderRegistry};
    use crate::models::query::QueryResult;
    use crate::services::backend::fake::sample_providers;
    use crate::services::settings_service::change_provider;
    use crate::views::results::render_results;

    fn session_with(providers: Vec<ProviderDescriptor>, active: &str) -> Session {
        let mut s = Session::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 30);
        s.registry = ProviderRegistry::new(providers);
        change_provider(&mut s, active);
        s
    }

    #[test]
    fn openai_scenario_shows_key_field_and_single_model() {
        let providers = vec![ProviderDescriptor {
            name: "openai".into(),
            display_name: None,
            requires_key: true,
            models: vec![ModelDescriptor {
                id: "gpt-4".into(),
                name: "GPT-4".into(),
            }],
        }];
        let view = SessionView::from_session(&session_with(providers, "openai"));

        assert!(view.api_key_visible);
        assert_eq!(
            view.models,
            [ModelOption {
                id: "gpt-4".into(),
                name: "GPT-4".into(),
                selected: true
            }]
        );
        let html = render_page(&view);
        assert!(html.contains("id=\"api_key\""));
        assert!(html.contains("<option value=\"gpt-4\" selected>GPT-4</option>"));
    }

    #[test]
    fn keyless_provider_hides_key_field() {
        let view = SessionView::from_session(&session_with(sample_providers(), "bedrock"));
        assert!(!view.api_key_visible);
        assert!(!render_page(&view).contains("id=\"api_key\""));
    }

    #[test]
    fn model_selector_lists_only_the_active_providers_models() {
        let view = SessionView::from_session(&session_with(sample_providers(), "bedrock"));
        let html = render_page(&view);
        assert_eq!(view.models.len(), 2);
        assert!(!html.contains("value=\"gpt-4\""));
    }

    #[test]
    fn transcript_text_is_never_markup() {
        let mut session = session_with(sample_providers(), "bedrock");
        session.transcript.push_user("<script>alert('x')</script> & \"friends\"");
        let html = render_page(&SessionView::from_session(&session));
        assert!(html.contains(
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; &quot;friends&quot;"
        ));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn results_panel_hidden_until_first_answer() {
        let mut session = session_with(sample_providers(), "bedrock");
        assert!(!render_page(&SessionView::from_session(&session)).contains("id=\"results\""));

        let result: QueryResult = serde_json::from_value(json!({
            "explanation": "Top product is Widget",
            "sql_query": "SELECT product, sales FROM sales",
            "results": [{"product": "Widget", "sales": 120}]
        }))
        .unwrap();
        session.results.show(render_results(&result));

        let html = render_page(&SessionView::from_session(&session));
        assert_eq!(html.matches("<table class=\"results\">").count(), 1);
        assert!(html.contains("<th>product</th><th>sales</th>"));
        assert!(html.contains("<td>Widget</td><td>120</td>"));
    }

    #[test]
    fn processing_state_swaps_send_for_cancel() {
        let mut session = session_with(sample_providers(), "bedrock");
        crate::services::conversation_service::begin(&mut session, "slow one").unwrap();

        let view = SessionView::from_session(&session);
        assert_eq!(view.processing, Some(MSG_PROCESSING));
        let html = render_page(&view);
        assert!(html.contains("action=\"/chat/cancel\""));
        assert!(!html.contains("id=\"send\""));
    }

    #[test]
    fn polling_while_busy_leaves_settings_edits_alone() {
        let mut session = session_with(sample_providers(), "bedrock");
        crate::services::conversation_service::begin(&mut session, "slow one").unwrap();
        let html = render_page(&SessionView::from_session(&session));

        // A full-page refresh only happens without scripting.
        assert_eq!(html.matches("http-equiv=\"refresh\"").count(), 1);
        assert!(html.contains("<noscript><meta http-equiv=\"refresh\" content=\"2\"></noscript>"));

        // The script swaps the chat section only, and the settings form sits outside it.
        assert!(html.contains("fetch('/session'"));
        assert!(html.contains("getElementById('chat')"));
        let settings = html.find("<section class=\"settings\">").unwrap();
        let chat = html.find("<section class=\"chat\" id=\"chat\">").unwrap();
        assert!(settings < chat);
        assert!(!html[chat..].contains("<section class=\"settings\">"));
    }

    #[test]
    fn idle_page_does_not_poll() {
        let session = session_with(sample_providers(), "bedrock");
        let html = render_page(&SessionView::from_session(&session));
        assert!(!html.contains("http-equiv=\"refresh\""));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn entered_key_is_not_rendered() {
        let mut session = session_with(sample_providers(), "openai");
        session.form.api_key = "sk-secret-value".into();
        let view = SessionView::from_session(&session);
        assert!(view.api_key_entered);
        let html = render_page(&view);
        assert!(!html.contains("sk-secret-value"));
        assert!(!serde_json::to_string(&view).unwrap().contains("sk-secret-value"));
    }
}
