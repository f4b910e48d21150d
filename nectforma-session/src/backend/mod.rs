//! Backend port — what the hosted auth service must provide
//!
//! The session actor only talks to the backend through [`AuthBackend`].
//! Production code wires in the BaaS client; tests and demos use
//! [`memory::InMemoryBackend`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

#[cfg(feature = "memory-backend")]
pub mod memory;

/// Session as the backend reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub actor_id: String,
    pub email: Option<String>,
    pub access_token: String,
}

impl AuthSession {
    pub fn new(actor_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            email: None,
            access_token: access_token.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Auth-change notifications pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Sent once when a listener attaches, carrying whatever session is known
    InitialSession(Option<AuthSession>),
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialSession(_) => "initial_session",
            Self::SignedIn(_) => "signed_in",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::SignedOut => "signed_out",
        }
    }
}

/// Receiving end of an auth-change subscription
pub type AuthEventStream = mpsc::UnboundedReceiver<AuthEvent>;

/// Remote auth service consumed by the session actor
///
/// Implementations report transport problems as
/// [`SessionError::TransientRemote`](crate::SessionError::TransientRemote) and
/// permission/authentication rejections as
/// [`SessionError::TerminalRemote`](crate::SessionError::TerminalRemote).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current session, if any
    async fn get_session(&self) -> Result<Option<AuthSession>>;

    /// Attach an auth-change listener
    async fn subscribe(&self) -> Result<AuthEventStream>;

    /// Top privilege tier check
    async fn is_super_admin(&self, actor_id: &str) -> Result<bool>;

    /// Standard role name of the actor
    async fn fetch_role(&self, actor_id: &str) -> Result<String>;

    /// End the backend session
    async fn sign_out(&self) -> Result<()>;
}
