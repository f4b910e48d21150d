//! In-memory auth backend for tests, demos and offline development.
//!
//! # Features
//!
//! - **Session + roles**: current session, super-admin set, role table
//! - **Failure injection**: fail the next N calls of an endpoint
//! - **Latency injection**: delay every call of an endpoint
//! - **Call counting**: per-endpoint request counters for verification
//! - **Event fan-out**: every subscriber first receives `InitialSession`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nectforma_session::backend::memory::{Endpoint, FailureKind, InMemoryBackend};
//! use nectforma_session::backend::AuthSession;
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! backend.set_role("u-42", "Formateur");
//! backend.set_session(Some(AuthSession::new("u-42", "token")));
//! backend.fail_next(Endpoint::IsSuperAdmin, 2, FailureKind::Transient);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, SessionError};

use super::{AuthBackend, AuthEvent, AuthEventStream, AuthSession};

/// Backend operations that can be counted, failed or delayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetSession,
    IsSuperAdmin,
    FetchRole,
    SignOut,
}

impl Endpoint {
    fn index(self) -> usize {
        match self {
            Self::GetSession => 0,
            Self::IsSuperAdmin => 1,
            Self::FetchRole => 2,
            Self::SignOut => 3,
        }
    }
}

/// What an injected failure looks like to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retryable transport error
    Transient,
    /// Permission/authentication rejection
    Terminal,
    /// Panic inside the call
    Panic,
}

#[derive(Debug, Default)]
struct Injection {
    remaining: usize,
    kind: Option<FailureKind>,
    delay: Duration,
}

/// Scriptable stand-in for the hosted auth service
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    session: RwLock<Option<AuthSession>>,
    super_admins: RwLock<HashSet<String>>,
    roles: RwLock<HashMap<String, String>>,
    injections: Mutex<[Injection; 4]>,
    calls: [AtomicUsize; 4],
    subscribers: Mutex<Vec<mpsc::UnboundedSender<AuthEvent>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Data ───

    /// Replace the stored session without notifying listeners
    pub fn set_session(&self, session: Option<AuthSession>) {
        *self.session.write() = session;
    }

    pub fn set_role(&self, actor_id: &str, role: &str) {
        self.roles.write().insert(actor_id.to_string(), role.to_string());
    }

    pub fn grant_super_admin(&self, actor_id: &str) {
        self.super_admins.write().insert(actor_id.to_string());
    }

    // ─── Scripting ───

    /// Make the next `count` calls to `endpoint` fail with `kind`
    pub fn fail_next(&self, endpoint: Endpoint, count: usize, kind: FailureKind) {
        let mut injections = self.injections.lock();
        let slot = &mut injections[endpoint.index()];
        slot.remaining = count;
        slot.kind = Some(kind);
    }

    /// Delay every call to `endpoint`
    pub fn set_latency(&self, endpoint: Endpoint, delay: Duration) {
        self.injections.lock()[endpoint.index()].delay = delay;
    }

    /// Requests received by `endpoint` so far
    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.calls[endpoint.index()].load(Ordering::SeqCst)
    }

    // ─── Events ───

    /// Push an event to every live subscriber
    pub fn emit(&self, event: AuthEvent) {
        debug!(event = event.name(), "Emitting auth event");
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Store `session` and announce it as a sign-in
    pub fn sign_in(&self, session: AuthSession) {
        self.set_session(Some(session.clone()));
        self.emit(AuthEvent::SignedIn(session));
    }

    /// Store `session` and announce it as a token refresh
    pub fn refresh_token(&self, session: AuthSession) {
        self.set_session(Some(session.clone()));
        self.emit(AuthEvent::TokenRefreshed(session));
    }

    /// Clear the session and announce the sign-out
    pub fn expire_session(&self) {
        self.set_session(None);
        self.emit(AuthEvent::SignedOut);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    // ─── Helpers ───

    async fn enter(&self, endpoint: Endpoint) -> Result<()> {
        self.calls[endpoint.index()].fetch_add(1, Ordering::SeqCst);

        let (delay, failure) = {
            let mut injections = self.injections.lock();
            let slot = &mut injections[endpoint.index()];
            let failure = if slot.remaining > 0 {
                slot.remaining -= 1;
                slot.kind
            } else {
                None
            };
            (slot.delay, failure)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match failure {
            None => Ok(()),
            Some(FailureKind::Transient) => Err(SessionError::TransientRemote(format!(
                "{endpoint:?}: connection reset"
            ))),
            Some(FailureKind::Terminal) => Err(SessionError::TerminalRemote(format!(
                "{endpoint:?}: permission denied"
            ))),
            Some(FailureKind::Panic) => panic!("{endpoint:?}: injected panic"),
        }
    }
}

#[async_trait]
impl AuthBackend for InMemoryBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        self.enter(Endpoint::GetSession).await?;
        Ok(self.session.read().clone())
    }

    async fn subscribe(&self) -> Result<AuthEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.session.read().clone();
        // Receiver is alive, send cannot fail
        let _ = tx.send(AuthEvent::InitialSession(current));
        self.subscribers.lock().push(tx);
        Ok(rx)
    }

    async fn is_super_admin(&self, actor_id: &str) -> Result<bool> {
        self.enter(Endpoint::IsSuperAdmin).await?;
        Ok(self.super_admins.read().contains(actor_id))
    }

    async fn fetch_role(&self, actor_id: &str) -> Result<String> {
        self.enter(Endpoint::FetchRole).await?;
        self.roles
            .read()
            .get(actor_id)
            .cloned()
            .ok_or_else(|| SessionError::RoleNotAssigned(actor_id.to_string()))
    }

    async fn sign_out(&self) -> Result<()> {
        self.enter(Endpoint::SignOut).await?;
        self.set_session(None);
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roles_and_counters() {
        let backend = InMemoryBackend::new();
        backend.set_role("u-1", "Formateur");
        backend.grant_super_admin("root");

        assert!(backend.is_super_admin("root").await.unwrap());
        assert!(!backend.is_super_admin("u-1").await.unwrap());
        assert_eq!(backend.fetch_role("u-1").await.unwrap(), "Formateur");
        assert_eq!(
            backend.fetch_role("ghost").await,
            Err(SessionError::RoleNotAssigned("ghost".into()))
        );
        assert_eq!(backend.call_count(Endpoint::IsSuperAdmin), 2);
        assert_eq!(backend.call_count(Endpoint::FetchRole), 2);
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Endpoint::GetSession, 2, FailureKind::Transient);

        assert!(matches!(backend.get_session().await, Err(SessionError::TransientRemote(_))));
        assert!(matches!(backend.get_session().await, Err(SessionError::TransientRemote(_))));
        assert_eq!(backend.get_session().await, Ok(None));
    }

    #[tokio::test]
    async fn test_subscriber_gets_initial_session_first() {
        let backend = InMemoryBackend::new();
        let session = AuthSession::new("u-1", "t-1");
        backend.set_session(Some(session.clone()));

        let mut events = backend.subscribe().await.unwrap();
        backend.expire_session();

        assert_eq!(events.recv().await, Some(AuthEvent::InitialSession(Some(session))));
        assert_eq!(events.recv().await, Some(AuthEvent::SignedOut));
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let backend = InMemoryBackend::new();
        let events = backend.subscribe().await.unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        drop(events);
        backend.emit(AuthEvent::SignedOut);
        assert_eq!(backend.subscriber_count(), 0);
    }
}
