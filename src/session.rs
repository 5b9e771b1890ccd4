use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PanelError;
use crate::telegram::{ClientFactory, Credentials, TelegramClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthState {
    Unauthenticated,
    CodeSent,
    Authorized,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone: Option<String>,
    pub serialized_session: Option<String>,
    pub code_sent: bool,
    pub authorized: bool,
    pub last_error: Option<String>,
}

impl SessionRecord {
    pub fn state(&self) -> AuthState {
        if self.authorized {
            AuthState::Authorized
        } else if self.code_sent {
            AuthState::CodeSent
        } else {
            AuthState::Unauthenticated
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            api_id: self.api_id?,
            api_hash: self.api_hash.clone()?,
        })
    }
}

/// Owner of the panel's single login and its connected client.
pub struct SessionStore {
    record: SessionRecord,
    client: Option<Arc<dyn TelegramClient>>,
    connected_with: Option<Credentials>,
}

impl SessionStore {
    /// A fresh store, optionally rehydrated from a serialized session that
    /// survived a restart.
    pub fn new(seed: Option<String>) -> Self {
        let record = SessionRecord {
            serialized_session: seed.filter(|value| !value.trim().is_empty()),
            ..SessionRecord::default()
        };
        Self {
            record,
            client: None,
            connected_with: None,
        }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut SessionRecord {
        &mut self.record
    }

    #[cfg(test)]
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn set_login_target(&mut self, api_id: i32, api_hash: &str, phone: &str) {
        self.record.api_id = Some(api_id);
        self.record.api_hash = Some(api_hash.to_string());
        self.record.phone = Some(phone.to_string());
        self.record.last_error = None;
    }

    pub fn mark_authorized(&mut self, serialized_session: String) {
        self.record.authorized = true;
        self.record.code_sent = false;
        self.record.serialized_session = Some(serialized_session);
    }

    /// Returns the connected client, connecting with the stored serialized
    /// session on first use. An existing client is reused as long as it was
    /// opened with the same credentials.
    pub async fn ensure_client(
        &mut self,
        factory: &dyn ClientFactory,
    ) -> Result<Arc<dyn TelegramClient>, PanelError> {
        let credentials = self.record.credentials().ok_or_else(|| {
            PanelError::Precondition("fill API ID/API HASH/Phone and send the code first".to_string())
        })?;

        if let Some(client) = &self.client {
            if self.connected_with.as_ref() == Some(&credentials) {
                return Ok(client.clone());
            }
            debug!(api_id = credentials.api_id, "credentials changed, reconnecting");
            self.drop_client().await;
        }

        let client = factory
            .connect(&credentials, self.record.serialized_session.as_deref())
            .await?;
        self.client = Some(client.clone());
        self.connected_with = Some(credentials);
        Ok(client)
    }

    /// Disconnects the current client, if any, keeping the record intact.
    /// Disconnect failures are logged and otherwise ignored.
    pub async fn drop_client(&mut self) {
        self.connected_with = None;
        if let Some(client) = self.client.take() {
            if let Err(err) = client.disconnect().await {
                warn!(error = %err, "failed to disconnect telegram client");
            }
        }
    }

    /// Tears the session down: the record is cleared before the client is
    /// disconnected, so the reset holds whatever the disconnect does.
    pub async fn close(&mut self) {
        let client = self.client.take();
        self.connected_with = None;
        self.record = SessionRecord::default();
        if let Some(client) = client {
            if let Err(err) = client.disconnect().await {
                warn!(error = %err, "failed to disconnect telegram client");
            }
        }
    }
}
