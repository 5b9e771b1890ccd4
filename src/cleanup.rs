use std::collections::BTreeMap;
use std::num::IntErrorKind;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dates::parse_bound;
use crate::error::PanelError;
use crate::resolver::resolve_chat;
use crate::session::SessionStore;
use crate::telegram::{Chat, ClientFactory, TelegramClient};

pub const DEFAULT_LIMIT: usize = 5_000;
pub const MAX_LIMIT: usize = 100_000;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 1_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CleanupForm {
    pub chat: String,
    pub since: String,
    pub until: String,
    pub limit: String,
    pub batch: String,
    pub dry_run: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub chat: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub batch_size: usize,
    pub dry_run: bool,
}

impl CleanupRequest {
    /// Lenient parsing: bad dates drop the bound, bad numbers fall back to the
    /// defaults and every count is clamped into range.
    pub fn from_form(form: &CleanupForm) -> Self {
        Self {
            chat: form.chat.trim().to_string(),
            since: parse_bound(&form.since),
            until: parse_bound(&form.until),
            limit: parse_count(&form.limit, DEFAULT_LIMIT, MAX_LIMIT),
            batch_size: parse_count(&form.batch, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE),
            dry_run: parse_flag(&form.dry_run),
        }
    }
}

fn parse_count(raw: &str, default: usize, max: usize) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(value) => value.clamp(1, max as i64) as usize,
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => max,
            IntErrorKind::NegOverflow => 1,
            _ => default,
        },
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub matched: usize,
    pub attempted: usize,
    pub deleted_ok: usize,
    pub errors: BTreeMap<String, usize>,
}

/// Entry point for the panel: refuses to run before login, then cleans up
/// with the session's client.
pub async fn cleanup(
    store: &mut SessionStore,
    factory: &dyn ClientFactory,
    request: &CleanupRequest,
) -> Result<CleanupSummary, PanelError> {
    if !store.record().authorized {
        return Err(PanelError::Precondition("login before cleanup".to_string()));
    }
    let client = store.ensure_client(factory).await?;
    run_cleanup(client.as_ref(), request).await
}

pub async fn run_cleanup(client: &dyn TelegramClient, request: &CleanupRequest) -> Result<CleanupSummary, PanelError> {
    let chat = resolve_chat(client, &request.chat).await?;
    let ids = collect_join_leave_ids(client, &chat, request).await?;
    let mut summary = CleanupSummary {
        matched: ids.len(),
        ..CleanupSummary::default()
    };
    info!(
        chat = %chat.name,
        chat_id = chat.peer.id(),
        kind = ?chat.peer.kind(),
        matched = summary.matched,
        dry_run = request.dry_run,
        "scan finished"
    );
    if request.dry_run {
        return Ok(summary);
    }

    // One chunk at a time: the next delete waits for the previous outcome.
    for chunk in ids.chunks(request.batch_size.max(1)) {
        summary.attempted += chunk.len();
        match client.delete_messages(&chat, chunk, true).await {
            Ok(_) => summary.deleted_ok += chunk.len(),
            Err(err) => {
                let kind = err.kind();
                warn!(error = %err, kind, size = chunk.len(), "delete batch failed");
                *summary.errors.entry(kind.to_string()).or_insert(0) += chunk.len();
            }
        }
    }

    info!(
        attempted = summary.attempted,
        deleted = summary.deleted_ok,
        failed = summary.attempted - summary.deleted_ok,
        "cleanup finished"
    );
    Ok(summary)
}

async fn collect_join_leave_ids(
    client: &dyn TelegramClient,
    chat: &Chat,
    request: &CleanupRequest,
) -> Result<Vec<i32>, PanelError> {
    let mut ids = Vec::new();
    let mut history = client.messages(chat, request.limit);
    while let Some(message) = history.try_next().await? {
        if !within_window(message.date, request.since, request.until) {
            continue;
        }
        if message.is_join_or_leave() {
            ids.push(message.id);
        }
    }
    Ok(ids)
}

/// Undated messages are never filtered out.
fn within_window(date: Option<DateTime<Utc>>, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> bool {
    let Some(date) = date else {
        return true;
    };
    if since.is_some_and(|since| date < since) {
        return false;
    }
    !until.is_some_and(|until| date > until)
}
