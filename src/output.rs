use serde::Serialize;
use thiserror::Error;

use crate::cleanup::{CleanupSummary, DEFAULT_BATCH_SIZE, DEFAULT_LIMIT};
use crate::session::{AuthState, SessionRecord};
use crate::telegram::BACKEND;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the page shows. Deliberately leaves out the API hash.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    pub state: AuthState,
    pub api_id: Option<i32>,
    pub phone: Option<String>,
    pub code_sent: bool,
    pub authorized: bool,
    pub last_error: Option<String>,
    pub session_string: Option<String>,
    pub summary: Option<CleanupSummary>,
    pub backend: &'static str,
}

impl StateView {
    pub fn new(record: &SessionRecord, summary: Option<&CleanupSummary>) -> Self {
        Self {
            state: record.state(),
            api_id: record.api_id,
            phone: record.phone.clone(),
            code_sent: record.code_sent,
            authorized: record.authorized,
            last_error: record.last_error.clone(),
            session_string: record.serialized_session.clone(),
            summary: summary.cloned(),
            backend: BACKEND,
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<(), OutputError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{payload}");
    Ok(())
}

pub fn render_index(view: &StateView) -> String {
    let mut page = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>tg-cleaner</title></head><body>\n<h1>tg-cleaner</h1>\n",
    );

    page.push_str(&format!(
        "<p>Status: <strong>{}</strong> (code sent: {}, authorized: {})</p>\n",
        state_label(view.state),
        yes_no(view.code_sent),
        yes_no(view.authorized)
    ));
    if let Some(error) = &view.last_error {
        page.push_str(&format!("<p class=\"error\">{}</p>\n", escape_html(error)));
    }

    if !view.authorized {
        page.push_str(&format!(
            concat!(
                "<h2>1. Send code</h2>\n<form method=\"post\" action=\"/send_code\">\n",
                "<label>API ID <input name=\"api_id\" value=\"{}\"></label>\n",
                "<label>API HASH <input name=\"api_hash\"></label>\n",
                "<label>Phone <input name=\"phone\" value=\"{}\"></label>\n",
                "<label>Session string (optional) <textarea name=\"session_input\"></textarea></label>\n",
                "<button>Send code</button>\n</form>\n",
                "<h2>2. Confirm</h2>\n<form method=\"post\" action=\"/confirm_code\">\n",
                "<label>Code <input name=\"code\" autocomplete=\"one-time-code\"></label>\n",
                "<label>2FA password <input name=\"password\" type=\"password\"></label>\n",
                "<button>Sign in</button>\n</form>\n"
            ),
            view.api_id.map(|id| id.to_string()).unwrap_or_default(),
            escape_html(view.phone.as_deref().unwrap_or_default()),
        ));
    } else {
        page.push_str(&format!(
            concat!(
                "<h2>Clean up join/leave messages</h2>\n<form method=\"post\" action=\"/cleanup\">\n",
                "<label>Chat (@username, t.me link, id or title) <input name=\"chat\"></label>\n",
                "<label>Since (ISO-8601) <input name=\"since\" placeholder=\"2024-01-01T00:00:00Z\"></label>\n",
                "<label>Until (ISO-8601) <input name=\"until\"></label>\n",
                "<label>Scan limit <input name=\"limit\" value=\"{}\"></label>\n",
                "<label>Batch size <input name=\"batch\" value=\"{}\"></label>\n",
                "<label><input type=\"checkbox\" name=\"dry_run\" value=\"1\" checked> Dry run</label>\n",
                "<button>Run</button>\n</form>\n"
            ),
            DEFAULT_LIMIT, DEFAULT_BATCH_SIZE,
        ));
    }

    if let Some(summary) = &view.summary {
        page.push_str(&render_summary(summary));
    }

    if let Some(session) = &view.session_string {
        page.push_str(&format!(
            "<h2>Session string</h2>\n<p>Set it as SESSION_STRING to skip the login after a restart.</p>\n<textarea readonly>{}</textarea>\n",
            escape_html(session)
        ));
    }

    page.push_str("<form method=\"post\" action=\"/reset\"><button>Reset</button></form>\n</body></html>\n");
    page
}

fn render_summary(summary: &CleanupSummary) -> String {
    let mut out = format!(
        "<h2>Last cleanup</h2>\n<ul>\n<li>matched: {}</li>\n<li>attempted: {}</li>\n<li>deleted: {}</li>\n",
        summary.matched, summary.attempted, summary.deleted_ok
    );
    for (kind, count) in &summary.errors {
        out.push_str(&format!("<li>errors ({}): {}</li>\n", escape_html(kind), count));
    }
    out.push_str("</ul>\n");
    out
}

fn state_label(state: AuthState) -> &'static str {
    match state {
        AuthState::Unauthenticated => "not logged in",
        AuthState::CodeSent => "waiting for code",
        AuthState::Authorized => "logged in",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
