use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use super::{
    Chat, ClientError, ClientFactory, Credentials, Message, Peer, SignInError, TelegramClient,
};

#[derive(Default)]
pub struct FakeState {
    pub authorized: bool,
    pub authorize_on_sign_in: bool,
    pub valid_code: String,
    pub password: Option<String>,
    pub usernames: HashMap<String, Chat>,
    pub peers: HashMap<Peer, Chat>,
    pub bare_ids: HashMap<i64, Chat>,
    pub dialogs: Vec<Chat>,
    pub messages: Vec<Message>,
    pub failing_deletes: HashMap<usize, ClientError>,
    pub fail_disconnect: bool,
    pub fail_code_request: bool,
    pub fail_username_lookup: Option<ClientError>,
    pub fail_history: Option<ClientError>,

    pub code_requests: Vec<String>,
    pub username_lookups: Vec<String>,
    pub peer_lookups: Vec<Peer>,
    pub id_lookups: Vec<i64>,
    pub dialogs_seen: usize,
    pub delete_calls: Vec<Vec<i32>>,
    pub disconnects: usize,
}

pub struct FakeClient {
    state: Mutex<FakeState>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                authorize_on_sign_in: true,
                valid_code: "12345".to_string(),
                ..FakeState::default()
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn chat(peer: Peer, name: &str) -> Chat {
    Chat {
        peer,
        name: name.to_string(),
        username: None,
    }
}

#[async_trait]
impl TelegramClient for FakeClient {
    async fn is_authorized(&self) -> Result<bool, ClientError> {
        Ok(self.state().authorized)
    }

    async fn request_login_code(&self, phone: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        if state.fail_code_request {
            return Err(ClientError::Rpc {
                code: 400,
                name: "PHONE_NUMBER_INVALID".to_string(),
            });
        }
        state.code_requests.push(phone.to_string());
        Ok(())
    }

    async fn sign_in(&self, _phone: &str, code: &str) -> Result<(), SignInError> {
        let mut state = self.state();
        if code != state.valid_code {
            return Err(SignInError::InvalidCode);
        }
        if state.password.is_some() {
            return Err(SignInError::PasswordRequired);
        }
        state.authorized = state.authorize_on_sign_in;
        Ok(())
    }

    async fn check_password(&self, password: &str) -> Result<(), SignInError> {
        let mut state = self.state();
        if state.password.as_deref() != Some(password) {
            return Err(SignInError::InvalidPassword);
        }
        state.authorized = state.authorize_on_sign_in;
        Ok(())
    }

    fn export_session(&self) -> Result<String, ClientError> {
        Ok(format!("fake-session-{}", self.state().authorized))
    }

    async fn resolve_username(&self, username: &str) -> Result<Option<Chat>, ClientError> {
        let mut state = self.state();
        state.username_lookups.push(username.to_string());
        if let Some(err) = state.fail_username_lookup.clone() {
            return Err(err);
        }
        Ok(state.usernames.get(&username.to_lowercase()).cloned())
    }

    async fn resolve_peer(&self, peer: Peer) -> Result<Chat, ClientError> {
        let mut state = self.state();
        state.peer_lookups.push(peer);
        state
            .peers
            .get(&peer)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("peer {peer:?}")))
    }

    async fn resolve_id(&self, id: i64) -> Result<Chat, ClientError> {
        let mut state = self.state();
        state.id_lookups.push(id);
        state
            .bare_ids
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("id {id}")))
    }

    fn dialogs(&self) -> BoxStream<'_, Result<Chat, ClientError>> {
        let dialogs = self.state().dialogs.clone();
        stream::iter(dialogs)
            .map(move |chat| {
                self.state().dialogs_seen += 1;
                Ok(chat)
            })
            .boxed()
    }

    fn messages<'a>(&'a self, _chat: &'a Chat, limit: usize) -> BoxStream<'a, Result<Message, ClientError>> {
        let state = self.state();
        if let Some(err) = state.fail_history.clone() {
            return stream::iter([Err(err)]).boxed();
        }
        let messages: Vec<_> = state.messages.iter().take(limit).cloned().collect();
        stream::iter(messages.into_iter().map(Ok)).boxed()
    }

    async fn delete_messages(&self, _chat: &Chat, ids: &[i32], revoke: bool) -> Result<usize, ClientError> {
        assert!(revoke, "cleanup must revoke for everyone");
        let mut state = self.state();
        let call = state.delete_calls.len();
        state.delete_calls.push(ids.to_vec());
        match state.failing_deletes.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(ids.len()),
        }
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let mut state = self.state();
        state.disconnects += 1;
        if state.fail_disconnect {
            return Err(ClientError::Network("connection already closed".to_string()));
        }
        Ok(())
    }
}

/// Hands out the same [`FakeClient`] on every connect and records the session
/// each connection was opened with.
pub struct FakeFactory {
    pub client: Arc<FakeClient>,
    pub connects: Mutex<Vec<Option<String>>>,
    pub rejected_sessions: HashSet<String>,
}

impl FakeFactory {
    pub fn new(client: Arc<FakeClient>) -> Self {
        Self {
            client,
            connects: Mutex::new(Vec::new()),
            rejected_sessions: HashSet::new(),
        }
    }

    pub fn connects(&self) -> Vec<Option<String>> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn connect(
        &self,
        _credentials: &Credentials,
        session: Option<&str>,
    ) -> Result<Arc<dyn TelegramClient>, ClientError> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(session.map(str::to_string));
        if let Some(session) = session {
            if self.rejected_sessions.contains(session) {
                return Err(ClientError::Session("unreadable session string".to_string()));
            }
        }
        Ok(self.client.clone())
    }
}
