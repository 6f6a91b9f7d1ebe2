//! Sign-up, sign-in, and session access.
//!
//! Credentials are verified by the gateway's identity endpoints; this module
//! only does client-side format checks (email shape, minimum password
//! length) before the round trip. On sign-in the caller is expected to
//! attach the returned session to its cart store so staged guest lines merge
//! into the durable cart.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use quince_core::{Email, EmailError};

use crate::gateway::{Gateway, GatewayError};
use crate::models::Session;

/// Minimum accepted password length for new accounts.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The email address is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The password does not meet the minimum length.
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    /// The gateway rejected the credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Any other gateway failure during an auth call.
    #[error(transparent)]
    Gateway(GatewayError),
}

impl AuthError {
    /// A message safe to show to the customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Please enter a valid email address.".to_owned(),
            Self::PasswordTooShort => {
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters.")
            }
            Self::InvalidCredentials => "Incorrect email or password.".to_owned(),
            Self::Gateway(_) => "Something went wrong. Please try again.".to_owned(),
        }
    }
}

impl From<GatewayError> for AuthError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(_) => Self::InvalidCredentials,
            other => Self::Gateway(other),
        }
    }
}

/// Gateway-backed authentication.
pub struct AuthService<G> {
    gateway: Arc<G>,
}

impl<G: Gateway> AuthService<G> {
    #[must_use]
    pub const fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Register a new account and open a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::PasswordTooShort`
    /// before any gateway call, or a gateway-derived error afterwards.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = Email::parse(email)?;
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::PasswordTooShort);
        }
        Ok(self.gateway.sign_up(&email, password).await?)
    }

    /// Open a session with existing credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address or
    /// `AuthError::InvalidCredentials` when the gateway rejects the pair.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = Email::parse(email)?;
        Ok(self.gateway.sign_in(&email, password).await?)
    }

    /// Close the current session. Closing when not signed in is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a gateway-derived error when the round trip fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(self.gateway.sign_out().await?)
    }

    /// The currently authenticated session, if any.
    ///
    /// # Errors
    ///
    /// Returns a gateway-derived error when the round trip fails.
    pub async fn current_user(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.gateway.current_session().await?)
    }
}
