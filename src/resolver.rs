//! Maps whatever the operator typed into the chat field onto a chat.
//!
//! Strategies run in a fixed order and the first one that resolves wins:
//! `t.me` links, `@username`, numeric ids, then a search over dialog names.

use std::sync::LazyLock;

use futures_util::TryStreamExt;
use regex::Regex;
use tracing::debug;

use crate::error::PanelError;
use crate::telegram::{Chat, Peer, TelegramClient};

static PRIVATE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^c/(\d+)").expect("valid private link regex"));

static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid numeric regex"));

/// Outcome of a single strategy.
#[derive(Debug)]
enum Step {
    Resolved(Chat),
    /// Not applicable, or a soft miss: try the next strategy.
    Pass,
    /// Continue with a synthesized reference instead of the raw input.
    Rewrite(String),
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Link,
    Username,
    Numeric,
    NameSearch,
}

const STRATEGIES: [Strategy; 4] = [
    Strategy::Link,
    Strategy::Username,
    Strategy::Numeric,
    Strategy::NameSearch,
];

impl Strategy {
    async fn apply(self, client: &dyn TelegramClient, input: &str) -> Result<Step, PanelError> {
        match self {
            Strategy::Link => resolve_link(client, input).await,
            Strategy::Username => resolve_username(client, input).await,
            Strategy::Numeric => resolve_numeric(client, input).await,
            Strategy::NameSearch => search_dialogs(client, input).await,
        }
    }
}

pub async fn resolve_chat(client: &dyn TelegramClient, raw: &str) -> Result<Chat, PanelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PanelError::Validation("empty chat reference".to_string()));
    }

    let mut input = raw.to_string();
    for strategy in STRATEGIES {
        match strategy.apply(client, &input).await? {
            Step::Resolved(chat) => {
                debug!(?strategy, chat = %chat.name, "chat resolved");
                return Ok(chat);
            }
            Step::Pass => {}
            Step::Rewrite(next) => {
                debug!(?strategy, rewritten = %next, "chat reference rewritten");
                input = next;
            }
        }
    }

    Err(PanelError::Resolution(format!("no chat found matching {raw}")))
}

fn link_path(input: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets, so the index is valid in `input`.
    let start = input.to_ascii_lowercase().find("t.me/")? + "t.me/".len();
    Some(input[start..].trim_matches('/'))
}

async fn resolve_link(client: &dyn TelegramClient, input: &str) -> Result<Step, PanelError> {
    let Some(path) = link_path(input) else {
        return Ok(Step::Pass);
    };

    if path.starts_with("c/") {
        let digits = PRIVATE_LINK_RE
            .captures(path)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| PanelError::Validation("invalid t.me/c link".to_string()))?;
        return Ok(Step::Rewrite(format!("-100{digits}")));
    }

    let username = path
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('@');
    if username.is_empty() {
        return Ok(Step::Pass);
    }
    match client.resolve_username(username).await {
        Ok(Some(chat)) => Ok(Step::Resolved(chat)),
        Ok(None) => {
            debug!(username, "link username not found, trying other forms");
            Ok(Step::Pass)
        }
        Err(err) => {
            debug!(username, error = %err, "link username lookup failed, trying other forms");
            Ok(Step::Pass)
        }
    }
}

async fn resolve_username(client: &dyn TelegramClient, input: &str) -> Result<Step, PanelError> {
    let Some(username) = input.strip_prefix('@') else {
        return Ok(Step::Pass);
    };
    match client.resolve_username(username).await? {
        Some(chat) => Ok(Step::Resolved(chat)),
        None => Err(PanelError::Resolution(format!("no chat found matching {input}"))),
    }
}

async fn resolve_numeric(client: &dyn TelegramClient, input: &str) -> Result<Step, PanelError> {
    if !NUMERIC_RE.is_match(input) {
        return Ok(Step::Pass);
    }
    let Ok(id) = input.parse::<i64>() else {
        return Err(PanelError::Resolution(format!("no chat found matching {input}")));
    };

    if let Some(peer) = Peer::from_marked_id(id) {
        match client.resolve_peer(peer).await {
            Ok(chat) => return Ok(Step::Resolved(chat)),
            Err(err) => debug!(?peer, error = %err, "typed peer lookup failed, trying bare id"),
        }
    }
    Ok(Step::Resolved(client.resolve_id(id).await?))
}

/// An exact (case-insensitive) name match wins; otherwise the first dialog
/// whose name contains the input.
async fn search_dialogs(client: &dyn TelegramClient, input: &str) -> Result<Step, PanelError> {
    let needle = input.to_lowercase();
    let mut dialogs = client.dialogs();
    let mut partial = None;
    while let Some(chat) = dialogs.try_next().await? {
        let name = chat.name.trim().to_lowercase();
        if name == needle {
            return Ok(Step::Resolved(chat));
        }
        if partial.is_none() && name.contains(&needle) {
            partial = Some(chat);
        }
    }
    Ok(partial.map_or(Step::Pass, Step::Resolved))
}
