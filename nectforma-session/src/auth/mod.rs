//! Session module — state machine, role resolution, and liveness tracking
//!
//! Owns the single session record every consumer reads.

pub mod actor;
pub mod journal;
pub mod liveness;
pub mod resolver;
pub mod types;

pub use actor::{SessionActor, SessionHandle};
pub use journal::TransitionJournal;
pub use liveness::{Liveness, LivenessToken};
pub use resolver::RoleResolver;
pub use types::{Role, RoleLookupResult, Session, SessionState};
