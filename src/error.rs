use thiserror::Error;

use crate::telegram::{ClientError, SignInError};

pub const PASSWORD_REQUIRED: &str = "this account requires a two-factor password; enter it and submit again";

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Resolution(String),
    #[error("{0}")]
    Auth(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<SignInError> for PanelError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::PasswordRequired => PanelError::Auth(PASSWORD_REQUIRED.to_string()),
            SignInError::Client(err) => PanelError::Client(err),
            other => PanelError::Auth(other.to_string()),
        }
    }
}
