//! Session domain types — Role, SessionState, Session, RoleLookupResult
//!
//! Serializable, cloneable, and cheap to pass around.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::AuthSession;

/// Roles of a training organization, top tier first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    SuperAdmin,
    Admin,
    Gestionnaire,
    Formateur,
    Etudiant,
    /// A role name the backend knows and this build does not
    Unknown(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "Admin",
            Self::Gestionnaire => "Gestionnaire",
            Self::Formateur => "Formateur",
            Self::Etudiant => "Étudiant",
            Self::Unknown(name) => name,
        }
    }

    /// Case-insensitive; accents on "Étudiant" are optional
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_lowercase().as_str() {
            "super_admin" | "superadmin" | "super admin" => Self::SuperAdmin,
            "admin" => Self::Admin,
            "gestionnaire" => Self::Gestionnaire,
            "formateur" => Self::Formateur,
            "étudiant" | "etudiant" => Self::Etudiant,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }

    /// Permission level (higher = more access)
    pub fn level(&self) -> u8 {
        match self {
            Self::Unknown(_) => 0,
            Self::Etudiant => 1,
            Self::Formateur => 2,
            Self::Gestionnaire => 3,
            Self::Admin => 4,
            Self::SuperAdmin => 5,
        }
    }

    /// Check if this role has at least the permissions of `required`
    pub fn has_permission(&self, required: &Role) -> bool {
        self.level() >= required.level()
    }

    pub fn is_top_tier(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Role::parse(&name)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally observable phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Loading,
    /// Ready, with an actor and a resolved role
    Authenticated,
    /// Ready, nobody signed in
    Anonymous,
    Error,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Anonymous)
    }
}

/// The single authoritative session record
///
/// Only the session actor writes it; everyone else gets clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub actor_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_privileged: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub state: SessionState,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            actor_id: None,
            email: None,
            role: None,
            is_privileged: false,
            is_loading: false,
            last_error: None,
            state: SessionState::Uninitialized,
            updated_at: Utc::now(),
        }
    }
}

impl Session {
    /// Bootstrap in progress, nothing known yet
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            state: SessionState::Loading,
            ..Self::default()
        }
    }

    /// Ready, nobody signed in
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            ..Self::default()
        }
    }

    /// Start-up lookup failed before any actor was known
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            last_error: Some(message.into()),
            state: SessionState::Error,
            ..Self::default()
        }
    }

    /// New actor seen, role fields cleared, resolution pending
    pub fn pending_for(session: &AuthSession) -> Self {
        Self {
            actor_id: Some(session.actor_id.clone()),
            email: session.email.clone(),
            ..Self::loading()
        }
    }

    /// Apply a role lookup outcome and leave the loading phase
    ///
    /// Role, privilege, error and `is_loading` change in one step.
    pub fn apply(&mut self, result: RoleLookupResult) {
        self.state = if result.role.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Error
        };
        self.is_privileged = result.is_privileged;
        self.role = result.role;
        self.last_error = result.error;
        self.is_loading = false;
        self.updated_at = Utc::now();
    }

    /// Signed in with a resolved role
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Ready with a non-empty error: usable, but something went wrong
    pub fn is_degraded(&self) -> bool {
        self.state.is_ready() && self.last_error.is_some()
    }

    /// Check the current role against `required` (false when no role)
    pub fn has_role(&self, required: &Role) -> bool {
        self.role.as_ref().is_some_and(|r| r.has_permission(required))
    }

    /// Record-level invariants, returned as the first violation found
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.is_privileged && self.role != Some(Role::SuperAdmin) {
            return Err(format!("privileged without top-tier role: {:?}", self.role));
        }
        if self.is_loading != (self.state == SessionState::Loading) {
            return Err(format!("is_loading={} in state {:?}", self.is_loading, self.state));
        }
        if !self.is_loading
            && self.actor_id.is_some()
            && self.role.is_none()
            && self.state != SessionState::Error
        {
            return Err("ready with an actor but no role".into());
        }
        if self.state == SessionState::Authenticated && (self.actor_id.is_none() || self.role.is_none()) {
            return Err("authenticated without actor or role".into());
        }
        if self.state == SessionState::Anonymous && self.actor_id.is_some() {
            return Err("anonymous with an actor id".into());
        }
        Ok(())
    }
}

/// Outcome of one role resolution, consumed once by the session actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLookupResult {
    pub is_privileged: bool,
    pub role: Option<Role>,
    pub error: Option<String>,
}

impl RoleLookupResult {
    pub fn privileged() -> Self {
        Self {
            is_privileged: true,
            role: Some(Role::SuperAdmin),
            error: None,
        }
    }

    pub fn standard(role: Role) -> Self {
        Self {
            is_privileged: role.is_top_tier(),
            role: Some(role),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_privileged: false,
            role: None,
            error: Some(message.into()),
        }
    }

    /// Keep the role, note a non-blocking problem
    pub fn with_warning(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}
