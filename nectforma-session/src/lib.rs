//! # Nectforma Session
//!
//! Session bootstrap and role resolution for Nectforma — decides who the
//! current actor is and what privilege level they hold before protected
//! content is shown.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │             nectforma-session             │
//! ├───────────────────────────────────────────┤
//! │              SessionActor                 │
//! │  (session record, auth events, liveness)  │
//! ├───────────────────────────────────────────┤
//! │              RoleResolver                 │
//! │  (super-admin check → role lookup)        │
//! ├─────────────────────┬─────────────────────┤
//! │     with_retry      │    with_timeout     │
//! │  (bounded backoff)  │  (per attempt)      │
//! ├─────────────────────┴─────────────────────┤
//! │          AuthBackend (hosted BaaS)        │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nectforma_session::backend::memory::InMemoryBackend;
//! use nectforma_session::backend::AuthSession;
//! use nectforma_session::{BootstrapConfig, Role, SessionActor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(InMemoryBackend::new());
//!     backend.set_role("u-42", "Formateur");
//!     backend.set_session(Some(AuthSession::new("u-42", "access-token")));
//!
//!     let handle = SessionActor::spawn(backend, BootstrapConfig::from_env()?).await?;
//!     let session = handle.wait_until_ready().await;
//!     assert_eq!(session.role, Some(Role::Formateur));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Loading gate**: `is_loading` clears only together with the role result
//! - **Short-circuit**: a super admin never triggers the role lookup
//! - **Stale writes**: work started under an old generation never writes
//! - **No escaping faults**: every failure lands in `Session::last_error`
//! - **Railway Programming**: fallible operations return `Result<T, SessionError>`

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod retry;
pub mod timing;

// Re-exports for convenience
pub use auth::{Role, RoleLookupResult, Session, SessionActor, SessionHandle, SessionState};
pub use backend::{AuthBackend, AuthEvent, AuthSession};
pub use config::{BootstrapConfig, CallPolicy, RetryPolicy};
pub use error::{Result, SessionError};
