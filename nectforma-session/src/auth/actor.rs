//! SessionActor — Tokio actor owning the session record
//!
//! The actor is the only writer of [`Session`]. It consumes three channels:
//! commands from [`SessionHandle`]s, auth-change events from the backend, and
//! completions from the background tasks it spawns for backend calls.
//! Completions carry a [`LivenessToken`]; one whose generation has moved on
//! (sign-out, new sign-in, refresh, shutdown) is dropped without writing.
//!
//! Consumers read the record through a `tokio::sync::watch` channel.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nectforma_session::auth::SessionActor;
//! use nectforma_session::backend::memory::InMemoryBackend;
//! use nectforma_session::BootstrapConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(InMemoryBackend::new());
//!     let handle = SessionActor::spawn(backend, BootstrapConfig::new()).await?;
//!
//!     // Blocks protected content until the first resolution is done
//!     let session = handle.wait_until_ready().await;
//!     println!("{:?} as {:?}", session.actor_id, session.role);
//!
//!     handle.sign_out().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{AuthBackend, AuthEvent, AuthEventStream, AuthSession};
use crate::config::BootstrapConfig;
use crate::error::{Result, SessionError};
use crate::timing::with_timeout;

use super::journal::TransitionJournal;
use super::liveness::{Liveness, LivenessToken};
use super::resolver::RoleResolver;
use super::types::{RoleLookupResult, Session, SessionState};

// ─── Actor Messages ───

enum SessionMsg {
    SignOut {
        reply: oneshot::Sender<Result<()>>,
    },
    RefreshRole {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Results of spawned backend work, reported back to the actor
enum Completion {
    SessionLookup {
        token: LivenessToken,
        outcome: Result<Option<AuthSession>>,
    },
    RoleResolved {
        token: LivenessToken,
        actor_id: String,
        result: RoleLookupResult,
    },
}

// ─── Actor ───

/// Session state machine — processes commands and auth events sequentially
pub struct SessionActor {
    backend: Arc<dyn AuthBackend>,
    resolver: RoleResolver,
    config: BootstrapConfig,
    liveness: Liveness,
    state: watch::Sender<Session>,
    journal: TransitionJournal,
    rx: mpsc::Receiver<SessionMsg>,
    events: Option<AuthEventStream>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl SessionActor {
    /// Spawn the actor, start the bootstrap, and return a handle
    ///
    /// The handle observes `Loading` from the start; the start-up session
    /// lookup and role resolution run in the background.
    pub async fn spawn(backend: Arc<dyn AuthBackend>, config: BootstrapConfig) -> Result<SessionHandle> {
        config.validate()?;

        // Listener first: anything that happens during the start-up lookup
        // is queued behind it. A listener that never attaches must not hold
        // up the bootstrap.
        let events = match with_timeout("subscribe", config.session_lookup_timeout(), backend.subscribe()).await {
            Ok(events) => Some(events),
            Err(e) => {
                warn!(error = %e, "Auth event subscription failed, running without live updates");
                None
            }
        };

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(Session::default());
        let journal = TransitionJournal::new(config.journal_capacity);
        journal.record(&state_rx.borrow());

        let actor = Self {
            resolver: RoleResolver::new(Arc::clone(&backend), &config),
            backend,
            config,
            liveness: Liveness::new(),
            state,
            journal: journal.clone(),
            rx,
            events,
            completions_tx,
            completions_rx,
        };

        actor.publish(|s| *s = Session::loading());
        actor.start_bootstrap();

        tokio::spawn(actor.run());
        info!("SessionActor spawned");
        Ok(SessionHandle { tx, state: state_rx, journal })
    }

    /// Main event loop
    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        if !self.handle_command(msg) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(done) = self.completions_rx.recv() => self.handle_completion(done),
                event = next_event(&mut self.events), if self.events.is_some() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Auth event stream closed");
                        self.events = None;
                    }
                },
            }
        }
        let generation = self.liveness.advance();
        info!(generation, "SessionActor stopped");
    }

    // ─── Handler Implementations ───

    /// Returns false once the actor should stop
    fn handle_command(&mut self, msg: SessionMsg) -> bool {
        match msg {
            SessionMsg::SignOut { reply } => {
                self.reset_anonymous("explicit sign-out");
                self.spawn_sign_out(reply);
            }
            SessionMsg::RefreshRole { reply } => {
                let _ = reply.send(self.handle_refresh_role());
            }
            SessionMsg::Shutdown { reply } => {
                let generation = self.liveness.advance();
                info!(generation, "Shutdown requested");
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_event(&mut self, event: AuthEvent) {
        debug!(event = event.name(), "Auth event received");
        match event {
            AuthEvent::InitialSession(_) => {
                debug!("Ignoring initial session event, start-up lookup owns the first session");
            }
            AuthEvent::SignedOut => self.reset_anonymous("signed out"),
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                if self.is_current_actor(&session) {
                    debug!(actor_id = %session.actor_id, "Session event for current actor, role kept");
                    return;
                }
                self.begin_resolution(session);
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::SessionLookup { token, outcome } => {
                if !token.is_live() {
                    debug!(generation = token.generation(), "Discarding stale session lookup");
                    return;
                }
                match outcome {
                    Ok(None) => {
                        info!("No stored session");
                        self.publish(|s| *s = Session::anonymous());
                    }
                    Ok(Some(session)) => {
                        info!(actor_id = %session.actor_id, "Stored session found, resolving role");
                        self.publish(|s| *s = Session::pending_for(&session));
                        self.spawn_resolution(session.actor_id, token, false);
                    }
                    Err(e) => {
                        error!(error = %e, "Session lookup failed, bootstrap aborted");
                        self.publish(|s| *s = Session::failed(e.to_string()));
                    }
                }
            }
            Completion::RoleResolved { token, actor_id, result } => {
                let owner_matches = self.state.borrow().actor_id.as_deref() == Some(actor_id.as_str());
                if !token.is_live() || !owner_matches {
                    warn!(actor_id = %actor_id, generation = token.generation(), "Discarding stale role resolution");
                    return;
                }
                self.publish(|s| s.apply(result));
            }
        }
    }

    fn handle_refresh_role(&mut self) -> Result<()> {
        let actor_id = self
            .state
            .borrow()
            .actor_id
            .clone()
            .ok_or(SessionError::NotAuthenticated)?;

        self.liveness.advance();
        let token = self.liveness.token();
        self.publish(|s| {
            s.role = None;
            s.is_privileged = false;
            s.last_error = None;
            s.is_loading = true;
            s.state = SessionState::Loading;
        });
        info!(actor_id = %actor_id, "Role refresh requested");
        self.spawn_resolution(actor_id, token, false);
        Ok(())
    }

    // ─── Transitions ───

    fn reset_anonymous(&mut self, reason: &str) {
        let generation = self.liveness.advance();
        info!(reason, generation, "Session cleared");
        self.publish(|s| *s = Session::anonymous());
    }

    /// New session: clear role and enter loading in one update, resolve later
    fn begin_resolution(&mut self, session: AuthSession) {
        self.liveness.advance();
        let token = self.liveness.token();
        info!(actor_id = %session.actor_id, generation = token.generation(), "New session, resolving role");
        self.publish(|s| *s = Session::pending_for(&session));
        self.spawn_resolution(session.actor_id, token, true);
    }

    fn is_current_actor(&self, session: &AuthSession) -> bool {
        let current = self.state.borrow();
        current.actor_id.as_deref() == Some(session.actor_id.as_str())
            && (current.role.is_some() || current.is_loading)
    }

    fn publish(&self, update: impl FnOnce(&mut Session)) {
        let mut previous = SessionState::Uninitialized;
        self.state.send_modify(|session| {
            previous = session.state;
            update(session);
            session.updated_at = Utc::now();
        });

        let snapshot = self.state.borrow().clone();
        if let Err(violation) = snapshot.check_invariants() {
            error!(violation = %violation, "Session invariant violated");
        }
        if previous != snapshot.state {
            info!(
                from = ?previous,
                to = ?snapshot.state,
                actor_id = ?snapshot.actor_id,
                role = ?snapshot.role,
                generation = self.liveness.current(),
                "Session transition"
            );
        }
        self.journal.record(&snapshot);
    }

    // ─── Background Work ───

    fn start_bootstrap(&self) {
        let token = self.liveness.token();
        let backend = Arc::clone(&self.backend);
        let deadline = self.config.session_lookup_timeout();
        let tx = self.completions_tx.clone();

        tokio::spawn(async move {
            let lookup = tokio::spawn(async move {
                with_timeout("get_session", deadline, backend.get_session()).await
            });
            let outcome = match lookup.await {
                Ok(outcome) => outcome,
                Err(e) => Err(SessionError::from(e)),
            };
            let _ = tx.send(Completion::SessionLookup { token, outcome });
        });
    }

    /// Resolve in a task of its own so a panic surfaces as a `JoinError`
    fn spawn_resolution(&self, actor_id: String, token: LivenessToken, defer: bool) {
        let resolver = self.resolver.clone();
        let tx = self.completions_tx.clone();

        tokio::spawn(async move {
            let work = {
                let actor_id = actor_id.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    if defer {
                        // Leave the backend's event dispatch before calling back into it
                        tokio::task::yield_now().await;
                    }
                    resolver.resolve_if_live(&actor_id, &token).await
                })
            };

            let result = match work.await {
                Ok(Some(result)) => result,
                Ok(None) => return,
                Err(e) => {
                    error!(actor_id = %actor_id, error = %e, "Role resolution task failed");
                    RoleLookupResult::failed(SessionError::from(e).to_string())
                }
            };
            let _ = tx.send(Completion::RoleResolved { token, actor_id, result });
        });
    }

    fn spawn_sign_out(&self, reply: oneshot::Sender<Result<()>>) {
        let backend = Arc::clone(&self.backend);
        let deadline = self.config.sign_out_timeout();

        tokio::spawn(async move {
            let call = tokio::spawn(async move {
                with_timeout("sign_out", deadline, backend.sign_out()).await
            });
            let outcome = match call.await {
                Ok(outcome) => outcome,
                Err(e) => Err(SessionError::from(e)),
            };
            if let Err(e) = &outcome {
                warn!(error = %e, "Backend sign-out failed, local session already cleared");
            }
            let _ = reply.send(outcome);
        });
    }
}

async fn next_event(events: &mut Option<AuthEventStream>) -> Option<AuthEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ─── Handle (client-facing API) ───

/// Thread-safe handle to read the session and drive the SessionActor
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMsg>,
    state: watch::Receiver<Session>,
    journal: TransitionJournal,
}

impl SessionHandle {
    /// Latest published session
    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Every journaled transition, oldest first
    pub fn history(&self) -> Vec<Session> {
        self.journal.entries()
    }

    /// Wait until the session leaves the loading phase
    ///
    /// Returns the last published session if the actor stops first.
    pub async fn wait_until_ready(&self) -> Session {
        let mut rx = self.state.clone();
        let ready = rx.wait_for(|s| !s.is_loading).await.map(|s| s.clone());
        ready.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Clear the local session now, then end it on the backend
    pub async fn sign_out(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMsg::SignOut { reply })
            .await
            .map_err(|_| SessionError::ActorUnavailable("SessionActor".into()))?;
        rx.await
            .map_err(|_| SessionError::ActorUnavailable("SessionActor dropped".into()))?
    }

    /// Re-run role resolution for the current actor
    pub async fn refresh_role(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMsg::RefreshRole { reply })
            .await
            .map_err(|_| SessionError::ActorUnavailable("SessionActor".into()))?;
        rx.await
            .map_err(|_| SessionError::ActorUnavailable("SessionActor dropped".into()))?
    }

    /// Stop the actor; in-flight work can no longer write
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMsg::Shutdown { reply })
            .await
            .map_err(|_| SessionError::ActorUnavailable("SessionActor".into()))?;
        rx.await
            .map_err(|_| SessionError::ActorUnavailable("SessionActor dropped".into()))
    }
}
