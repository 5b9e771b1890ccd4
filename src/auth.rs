use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PanelError;
use crate::session::{AuthState, SessionStore};
use crate::telegram::{ClientFactory, SignInError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SendCodeForm {
    pub api_id: String,
    pub api_hash: String,
    pub phone: String,
    pub session_input: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmCodeForm {
    pub code: String,
    pub password: String,
}

/// Starts a login. A pasted session that is already authorized completes the
/// login without a code; otherwise a verification code is sent to the phone.
/// Failures end up in `last_error`.
pub async fn request_code(store: &mut SessionStore, factory: &dyn ClientFactory, form: &SendCodeForm) -> AuthState {
    if let Err(err) = try_request_code(store, factory, form).await {
        warn!(error = %err, "sending login code failed");
        let record = store.record_mut();
        record.code_sent = false;
        record.last_error = Some(match err {
            PanelError::Validation(message) => message,
            other => format!("failed to send code: {other}"),
        });
    }
    store.record().state()
}

async fn try_request_code(
    store: &mut SessionStore,
    factory: &dyn ClientFactory,
    form: &SendCodeForm,
) -> Result<(), PanelError> {
    let api_id = form
        .api_id
        .trim()
        .parse::<i32>()
        .map_err(|_| PanelError::Validation(format!("API ID must be an integer, got {:?}", form.api_id.trim())))?;
    let phone = form.phone.trim();
    store.set_login_target(api_id, form.api_hash.trim(), phone);

    let pasted = form.session_input.trim();
    if !pasted.is_empty() {
        match adopt_session(store, factory, pasted).await {
            Ok(true) => {
                info!(api_id, "reused pasted session, no code needed");
                return Ok(());
            }
            Ok(false) => info!("pasted session is not authorized, requesting a code"),
            Err(err) => {
                warn!(error = %err, "pasted session rejected");
                store.drop_client().await;
                store.record_mut().serialized_session = None;
                store.record_mut().last_error = Some(format!("invalid session or connection failure: {err}"));
            }
        }
    }

    let client = store.ensure_client(factory).await?;
    client.request_login_code(phone).await?;
    store.record_mut().code_sent = true;
    info!(api_id, "login code requested");
    Ok(())
}

async fn adopt_session(store: &mut SessionStore, factory: &dyn ClientFactory, pasted: &str) -> Result<bool, PanelError> {
    if store.record().serialized_session.as_deref() != Some(pasted) {
        store.drop_client().await;
        store.record_mut().serialized_session = Some(pasted.to_string());
    }
    let client = store.ensure_client(factory).await?;
    if !client.is_authorized().await? {
        return Ok(false);
    }
    let refreshed = client.export_session()?;
    store.mark_authorized(refreshed);
    Ok(true)
}

/// Completes a login with the received code and, when the account asks for
/// it, the two-factor password.
pub async fn confirm_code(
    store: &mut SessionStore,
    factory: &dyn ClientFactory,
    form: &ConfirmCodeForm,
) -> AuthState {
    match try_confirm_code(store, factory, form).await {
        Ok(()) => info!("signed in"),
        Err(err) => {
            warn!(error = %err, "sign-in failed");
            store.record_mut().last_error = Some(match err {
                PanelError::Client(err) => format!("login failed: {err}"),
                other => other.to_string(),
            });
        }
    }
    store.record().state()
}

async fn try_confirm_code(
    store: &mut SessionStore,
    factory: &dyn ClientFactory,
    form: &ConfirmCodeForm,
) -> Result<(), PanelError> {
    let phone = match (&store.record().api_id, &store.record().api_hash, &store.record().phone) {
        (Some(_), Some(api_hash), Some(phone)) if !api_hash.is_empty() && !phone.is_empty() => phone.clone(),
        _ => {
            return Err(PanelError::Precondition(
                "fill API ID/API HASH/Phone and send the code first".to_string(),
            ));
        }
    };

    let client = store.ensure_client(factory).await?;
    match client.sign_in(&phone, form.code.trim()).await {
        Ok(()) => {}
        Err(SignInError::PasswordRequired) if !form.password.is_empty() => {
            client.check_password(&form.password).await?;
        }
        Err(err) => return Err(err.into()),
    }

    if !client.is_authorized().await? {
        return Err(PanelError::Auth("not authorized".to_string()));
    }
    let session = client.export_session()?;
    store.mark_authorized(session);
    store.record_mut().last_error = None;
    Ok(())
}

/// Logs out of the panel. Always succeeds.
pub async fn reset(store: &mut SessionStore) -> AuthState {
    store.close().await;
    info!("session reset");
    store.record().state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PASSWORD_REQUIRED;
    use crate::telegram::fake::{FakeClient, FakeFactory};

    fn send_form(session_input: &str) -> SendCodeForm {
        SendCodeForm {
            api_id: "12345".to_string(),
            api_hash: "abc".to_string(),
            phone: "+1000".to_string(),
            session_input: session_input.to_string(),
        }
    }

    fn confirm_form(code: &str, password: &str) -> ConfirmCodeForm {
        ConfirmCodeForm {
            code: code.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn request_code_sends_a_fresh_code() {
        let client = FakeClient::new();
        let factory = FakeFactory::new(client.clone());
        let mut store = SessionStore::new(None);

        let state = request_code(&mut store, &factory, &send_form("")).await;

        assert_eq!(state, AuthState::CodeSent);
        assert!(store.record().code_sent);
        assert!(!store.record().authorized);
        assert_eq!(store.record().last_error, None);
        assert_eq!(client.state().code_requests, vec!["+1000".to_string()]);
        assert_eq!(factory.connects(), vec![None]);
    }

    #[tokio::test]
    async fn request_code_rejects_non_numeric_api_id() {
        let factory = FakeFactory::new(FakeClient::new());
        let mut store = SessionStore::new(None);
        let mut form = send_form("");
        form.api_id = "12a45".to_string();

        let state = request_code(&mut store, &factory, &form).await;

        assert_eq!(state, AuthState::Unauthenticated);
        let error = store.record().last_error.clone().unwrap_or_default();
        assert!(error.starts_with("API ID must be an integer"), "{error}");
        assert!(factory.connects().is_empty());
    }

    #[tokio::test]
    async fn request_code_uses_the_seeded_session() {
        let factory = FakeFactory::new(FakeClient::new());
        let mut store = SessionStore::new(Some("seeded".to_string()));

        request_code(&mut store, &factory, &send_form("")).await;

        assert_eq!(factory.connects(), vec![Some("seeded".to_string())]);
    }

    #[tokio::test]
    async fn authorized_pasted_session_skips_the_code() {
        let client = FakeClient::new();
        client.state().authorized = true;
        let factory = FakeFactory::new(client.clone());
        let mut store = SessionStore::new(None);

        let state = request_code(&mut store, &factory, &send_form("pasted")).await;

        assert_eq!(state, AuthState::Authorized);
        assert!(!store.record().code_sent);
        assert_eq!(store.record().serialized_session.as_deref(), Some("fake-session-true"));
        assert!(client.state().code_requests.is_empty());
        assert_eq!(factory.connects(), vec![Some("pasted".to_string())]);
    }

    #[tokio::test]
    async fn invalid_pasted_session_falls_back_to_a_code() {
        let client = FakeClient::new();
        let mut factory = FakeFactory::new(client.clone());
        factory.rejected_sessions.insert("garbage".to_string());
        let mut store = SessionStore::new(None);

        let state = request_code(&mut store, &factory, &send_form("garbage")).await;

        assert_eq!(state, AuthState::CodeSent);
        let error = store.record().last_error.clone().unwrap_or_default();
        assert!(error.starts_with("invalid session or connection failure"), "{error}");
        assert_eq!(client.state().code_requests.len(), 1);
        assert_eq!(factory.connects(), vec![Some("garbage".to_string()), None]);
    }

    #[tokio::test]
    async fn failed_code_request_is_recorded() {
        let client = FakeClient::new();
        client.state().fail_code_request = true;
        let factory = FakeFactory::new(client);
        let mut store = SessionStore::new(None);

        let state = request_code(&mut store, &factory, &send_form("")).await;

        assert_eq!(state, AuthState::Unauthenticated);
        let error = store.record().last_error.clone().unwrap_or_default();
        assert!(error.contains("PHONE_NUMBER_INVALID"), "{error}");
    }

    #[tokio::test]
    async fn confirm_requires_a_sent_code() {
        let factory = FakeFactory::new(FakeClient::new());
        let mut store = SessionStore::new(None);

        confirm_code(&mut store, &factory, &confirm_form("12345", "")).await;

        assert_eq!(
            store.record().last_error.as_deref(),
            Some("fill API ID/API HASH/Phone and send the code first")
        );
    }

    #[tokio::test]
    async fn confirm_with_correct_code_authorizes() {
        let factory = FakeFactory::new(FakeClient::new());
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;

        let state = confirm_code(&mut store, &factory, &confirm_form(" 12345 ", "")).await;

        assert_eq!(state, AuthState::Authorized);
        assert!(store.record().authorized);
        assert_eq!(store.record().last_error, None);
        assert_eq!(store.record().serialized_session.as_deref(), Some("fake-session-true"));
    }

    #[tokio::test]
    async fn invalid_code_keeps_code_sent() {
        let factory = FakeFactory::new(FakeClient::new());
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;

        let state = confirm_code(&mut store, &factory, &confirm_form("00000", "")).await;

        assert_eq!(state, AuthState::CodeSent);
        assert_eq!(store.record().last_error.as_deref(), Some("invalid code"));
    }

    #[tokio::test]
    async fn two_factor_without_password_asks_for_it() {
        let client = FakeClient::new();
        client.state().password = Some("hunter2".to_string());
        let factory = FakeFactory::new(client);
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;

        let state = confirm_code(&mut store, &factory, &confirm_form("12345", "")).await;

        assert_eq!(state, AuthState::CodeSent);
        assert_eq!(store.record().last_error.as_deref(), Some(PASSWORD_REQUIRED));
    }

    #[tokio::test]
    async fn two_factor_with_password_authorizes() {
        let client = FakeClient::new();
        client.state().password = Some("hunter2".to_string());
        let factory = FakeFactory::new(client);
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;

        let state = confirm_code(&mut store, &factory, &confirm_form("12345", "hunter2")).await;

        assert_eq!(state, AuthState::Authorized);
        assert_eq!(store.record().last_error, None);
    }

    #[tokio::test]
    async fn wrong_password_surfaces_the_error() {
        let client = FakeClient::new();
        client.state().password = Some("hunter2".to_string());
        let factory = FakeFactory::new(client);
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;

        let state = confirm_code(&mut store, &factory, &confirm_form("12345", "nope")).await;

        assert_eq!(state, AuthState::CodeSent);
        assert_eq!(store.record().last_error.as_deref(), Some("invalid password"));
    }

    #[tokio::test]
    async fn sign_in_without_authorization_is_reported() {
        let client = FakeClient::new();
        client.state().authorize_on_sign_in = false;
        let factory = FakeFactory::new(client);
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;

        let state = confirm_code(&mut store, &factory, &confirm_form("12345", "")).await;

        assert_eq!(state, AuthState::CodeSent);
        assert!(!store.record().authorized);
        assert_eq!(store.record().last_error.as_deref(), Some("not authorized"));
    }

    #[tokio::test]
    async fn reset_clears_state_even_if_disconnect_fails() {
        let client = FakeClient::new();
        client.state().fail_disconnect = true;
        let factory = FakeFactory::new(client.clone());
        let mut store = SessionStore::new(None);
        request_code(&mut store, &factory, &send_form("")).await;
        confirm_code(&mut store, &factory, &confirm_form("12345", "")).await;

        let state = reset(&mut store).await;

        assert_eq!(state, AuthState::Unauthenticated);
        let record = store.record();
        assert!(!record.authorized);
        assert!(!record.code_sent);
        assert_eq!(record.serialized_session, None);
        assert!(!store.has_client());
        assert_eq!(client.state().disconnects, 1);
    }
}
