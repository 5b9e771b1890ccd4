//! [`TelegramClient`] backed by `grammers-client`.
//!
//! grammers needs a packed chat (id plus access hash) for every call, so each
//! chat this backend hands out is remembered and looked up again when the
//! panel asks for its history or deletes from it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream::{self, BoxStream, StreamExt};
use grammers_client::grammers_tl_types as tl;
use grammers_client::types::{LoginToken, PasswordToken};
use grammers_client::{Client, Config, InvocationError};
use grammers_session::{PackedChat, PackedType, Session};

use super::{
    Chat, ClientError, ClientFactory, Credentials, Message, MessageAction, Peer, SignInError,
    TelegramClient,
};

#[derive(Default)]
pub struct GrammersFactory;

#[async_trait]
impl ClientFactory for GrammersFactory {
    async fn connect(
        &self,
        credentials: &Credentials,
        session: Option<&str>,
    ) -> Result<Arc<dyn TelegramClient>, ClientError> {
        let session = match session.map(str::trim).filter(|value| !value.is_empty()) {
            Some(encoded) => {
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|err| ClientError::Session(err.to_string()))?;
                Session::load(&bytes).map_err(|err| ClientError::Session(err.to_string()))?
            }
            None => Session::new(),
        };

        let client = Client::connect(Config {
            session,
            api_id: credentials.api_id,
            api_hash: credentials.api_hash.clone(),
            params: Default::default(),
        })
        .await
        .map_err(|err| ClientError::Network(err.to_string()))?;

        tracing::debug!(api_id = credentials.api_id, "connected to telegram");
        Ok(Arc::new(GrammersClient::new(client)))
    }
}

pub struct GrammersClient {
    client: Client,
    login_token: Mutex<Option<LoginToken>>,
    password_token: Mutex<Option<PasswordToken>>,
    chats: Mutex<HashMap<Peer, grammers_client::types::Chat>>,
}

impl GrammersClient {
    fn new(client: Client) -> Self {
        Self {
            client,
            login_token: Mutex::new(None),
            password_token: Mutex::new(None),
            chats: Mutex::new(HashMap::new()),
        }
    }

    fn chats(&self) -> MutexGuard<'_, HashMap<Peer, grammers_client::types::Chat>> {
        self.chats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, chat: &grammers_client::types::Chat) -> Chat {
        let packed = chat.pack();
        let peer = match packed.ty {
            PackedType::User | PackedType::Bot => Peer::User(packed.id),
            PackedType::Chat => Peer::Group(packed.id),
            _ => Peer::Channel(packed.id),
        };
        self.chats().insert(peer, chat.clone());
        Chat {
            peer,
            name: chat.name().to_string(),
            username: chat.username().map(str::to_string),
        }
    }

    fn packed(&self, peer: Peer) -> Result<PackedChat, ClientError> {
        self.chats()
            .get(&peer)
            .map(|chat| chat.pack())
            .ok_or_else(|| ClientError::NotFound(format!("chat {}", peer.id())))
    }

    async fn find_in_dialogs(&self, matches: impl Fn(&Peer) -> bool) -> Result<Option<Chat>, ClientError> {
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(invocation_error)? {
            let chat = self.remember(dialog.chat());
            if matches(&chat.peer) {
                return Ok(Some(chat));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl TelegramClient for GrammersClient {
    async fn is_authorized(&self) -> Result<bool, ClientError> {
        self.client.is_authorized().await.map_err(invocation_error)
    }

    async fn request_login_code(&self, phone: &str) -> Result<(), ClientError> {
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(|err| ClientError::Other(err.to_string()))?;
        *self.login_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    async fn sign_in(&self, _phone: &str, code: &str) -> Result<(), SignInError> {
        let token = self
            .login_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| ClientError::Other("no login code was requested on this connection".to_string()))?;

        match self.client.sign_in(&token, code).await {
            Ok(_) => Ok(()),
            Err(grammers_client::SignInError::PasswordRequired(password_token)) => {
                *self.password_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(password_token);
                Err(SignInError::PasswordRequired)
            }
            Err(grammers_client::SignInError::InvalidCode) => {
                *self.login_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
                Err(SignInError::InvalidCode)
            }
            Err(err) => Err(sign_in_error(err)),
        }
    }

    async fn check_password(&self, password: &str) -> Result<(), SignInError> {
        let token = self
            .password_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SignInError::PasswordRequired)?;
        self.client
            .check_password(token, password.as_bytes())
            .await
            .map(|_| ())
            .map_err(sign_in_error)
    }

    fn export_session(&self) -> Result<String, ClientError> {
        Ok(STANDARD.encode(self.client.session().save()))
    }

    async fn resolve_username(&self, username: &str) -> Result<Option<Chat>, ClientError> {
        let chat = self
            .client
            .resolve_username(username)
            .await
            .map_err(invocation_error)?;
        Ok(chat.map(|chat| self.remember(&chat)))
    }

    async fn resolve_peer(&self, peer: Peer) -> Result<Chat, ClientError> {
        let cached = self.chats().get(&peer).cloned();
        if let Some(chat) = cached {
            return Ok(self.remember(&chat));
        }
        self.find_in_dialogs(|candidate| *candidate == peer)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("chat {}", peer.id())))
    }

    async fn resolve_id(&self, id: i64) -> Result<Chat, ClientError> {
        let cached = self.chats().values().find(|chat| chat.id() == id).cloned();
        if let Some(chat) = cached {
            return Ok(self.remember(&chat));
        }
        self.find_in_dialogs(|candidate| candidate.id() == id)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("chat {id}")))
    }

    fn dialogs(&self) -> BoxStream<'_, Result<Chat, ClientError>> {
        let dialogs = self.client.iter_dialogs();
        stream::unfold(Some(dialogs), move |state| async move {
            let mut dialogs = state?;
            match dialogs.next().await {
                Ok(Some(dialog)) => Some((Ok(self.remember(dialog.chat())), Some(dialogs))),
                Ok(None) => None,
                Err(err) => Some((Err(invocation_error(err)), None)),
            }
        })
        .boxed()
    }

    fn messages<'a>(&'a self, chat: &'a Chat, limit: usize) -> BoxStream<'a, Result<Message, ClientError>> {
        let packed = match self.packed(chat.peer) {
            Ok(packed) => packed,
            Err(err) => return stream::iter([Err(err)]).boxed(),
        };
        let history = self.client.iter_messages(packed).limit(limit);
        stream::unfold(Some(history), |state| async move {
            let mut history = state?;
            match history.next().await {
                Ok(Some(message)) => Some((Ok(message_from(&message)), Some(history))),
                Ok(None) => None,
                Err(err) => Some((Err(invocation_error(err)), None)),
            }
        })
        .boxed()
    }

    async fn delete_messages(&self, chat: &Chat, ids: &[i32], _revoke: bool) -> Result<usize, ClientError> {
        // grammers always revokes for every participant.
        let packed = self.packed(chat.peer)?;
        self.client
            .delete_messages(packed, ids)
            .await
            .map_err(invocation_error)
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        // The connection closes once the last handle to the client is dropped.
        self.login_token.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.password_token.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.chats().clear();
        Ok(())
    }
}

fn message_from(message: &grammers_client::types::Message) -> Message {
    let action = message.action().map(|action| match action {
        tl::enums::MessageAction::ChatAddUser(_) => MessageAction::ChatAddUser,
        tl::enums::MessageAction::ChatJoinedByLink(_) => MessageAction::ChatJoinedByLink,
        tl::enums::MessageAction::ChatDeleteUser(_) => MessageAction::ChatDeleteUser,
        _ => MessageAction::Other,
    });
    Message {
        id: message.id(),
        date: Some(message.date()),
        action,
    }
}

fn invocation_error(err: InvocationError) -> ClientError {
    match err {
        InvocationError::Rpc(rpc) => ClientError::Rpc {
            code: rpc.code,
            name: rpc.name,
        },
        other => ClientError::Network(other.to_string()),
    }
}

fn sign_in_error(err: grammers_client::SignInError) -> SignInError {
    match err {
        grammers_client::SignInError::PasswordRequired(_) => SignInError::PasswordRequired,
        grammers_client::SignInError::InvalidCode => SignInError::InvalidCode,
        grammers_client::SignInError::InvalidPassword => SignInError::InvalidPassword,
        grammers_client::SignInError::SignUpRequired { .. } => SignInError::SignUpRequired,
        grammers_client::SignInError::Other(err) => SignInError::Client(invocation_error(err)),
        #[allow(unreachable_patterns)]
        other => SignInError::Client(ClientError::Other(other.to_string())),
    }
}
