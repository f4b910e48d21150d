//! Configuration for session bootstrap

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Retry shape for one remote call: `base_delay × 2^attempt` between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following one
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self { max_retries, base_delay_ms }
    }

    /// Single attempt, no delay
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Sum of every backoff a call failing on all attempts waits through
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries).map(|i| self.delay_for(i)).sum()
    }
}

/// Retry policy plus the deadline applied to each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPolicy {
    #[serde(flatten)]
    pub retry: RetryPolicy,
    /// Per-attempt deadline
    pub deadline_ms: u64,
}

impl CallPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, deadline_ms: u64) -> Self {
        Self {
            retry: RetryPolicy::new(max_retries, base_delay_ms),
            deadline_ms,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Session bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Deadline for the start-up session lookup
    pub session_lookup_timeout_ms: u64,

    /// Deadline for the backend sign-out call
    pub sign_out_timeout_ms: u64,

    /// "Is this actor a super admin?" (2 retries, 400ms, 6s)
    pub privilege_check: CallPolicy,

    /// "What is this actor's role?" (3 retries, 500ms, 8s)
    pub role_lookup: CallPolicy,

    /// Capacity of the command channel between handles and the actor
    pub channel_capacity: usize,

    /// Number of session snapshots kept in the transition journal
    pub journal_capacity: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            session_lookup_timeout_ms: 6000,
            sign_out_timeout_ms: 6000,
            privilege_check: CallPolicy::new(2, 400, 6000),
            role_lookup: CallPolicy::new(3, 500, 8000),
            channel_capacity: 256,
            journal_capacity: 128,
        }
    }
}

impl BootstrapConfig {
    /// Create config with the production defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `NECTFORMA_*` environment variables
    ///
    /// Recognised variables:
    /// ```text
    /// NECTFORMA_SESSION_TIMEOUT_MS   session lookup deadline
    /// NECTFORMA_PRIVILEGE_RETRIES    privilege check retry count
    /// NECTFORMA_ROLE_RETRIES         role lookup retry count
    /// NECTFORMA_JOURNAL_CAPACITY     transition journal size
    /// ```
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(ms) = env_parse("NECTFORMA_SESSION_TIMEOUT_MS")? {
            cfg.session_lookup_timeout_ms = ms;
        }
        if let Some(n) = env_parse("NECTFORMA_PRIVILEGE_RETRIES")? {
            cfg.privilege_check.retry.max_retries = n;
        }
        if let Some(n) = env_parse("NECTFORMA_ROLE_RETRIES")? {
            cfg.role_lookup.retry.max_retries = n;
        }
        if let Some(n) = env_parse("NECTFORMA_JOURNAL_CAPACITY")? {
            cfg.journal_capacity = n;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from JSON; absent keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would make the bootstrap hang or fail instantly
    pub fn validate(&self) -> Result<()> {
        if self.session_lookup_timeout_ms == 0 || self.sign_out_timeout_ms == 0 {
            return Err(SessionError::Config("timeouts must be non-zero".into()));
        }
        if self.privilege_check.deadline_ms == 0 || self.role_lookup.deadline_ms == 0 {
            return Err(SessionError::Config("call deadlines must be non-zero".into()));
        }
        if self.channel_capacity == 0 {
            return Err(SessionError::Config("channel_capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Override the session lookup deadline
    pub fn with_session_lookup_timeout_ms(mut self, ms: u64) -> Self {
        self.session_lookup_timeout_ms = ms;
        self
    }

    /// Override the privilege check policy
    pub fn with_privilege_check(mut self, policy: CallPolicy) -> Self {
        self.privilege_check = policy;
        self
    }

    /// Override the role lookup policy
    pub fn with_role_lookup(mut self, policy: CallPolicy) -> Self {
        self.role_lookup = policy;
        self
    }

    /// Override the journal size
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    pub fn session_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.session_lookup_timeout_ms)
    }

    pub fn sign_out_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_out_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SessionError::Config(format!("{key}: cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}
