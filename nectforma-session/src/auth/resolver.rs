//! RoleResolver — privilege check, then role lookup, with short-circuit
//!
//! Step (a) asks whether the actor sits in the top privilege tier. A `true`
//! answer settles the role and step (b) is never issued. Otherwise step (b)
//! fetches the standard role name. Each step goes through
//! [`with_retry`](crate::retry::with_retry), each attempt through
//! [`with_timeout`](crate::timing::with_timeout).
//!
//! Nothing escapes: every failure becomes the error channel of
//! [`RoleLookupResult`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::AuthBackend;
use crate::config::{BootstrapConfig, CallPolicy};
use crate::error::{Result, SessionError};
use crate::retry::with_retry;
use crate::timing::with_timeout;

use super::liveness::LivenessToken;
use super::types::{Role, RoleLookupResult};

#[derive(Clone)]
pub struct RoleResolver {
    backend: Arc<dyn AuthBackend>,
    privilege_check: CallPolicy,
    role_lookup: CallPolicy,
}

impl RoleResolver {
    pub fn new(backend: Arc<dyn AuthBackend>, config: &BootstrapConfig) -> Self {
        Self {
            backend,
            privilege_check: config.privilege_check,
            role_lookup: config.role_lookup,
        }
    }

    /// Resolve, then drop the result if `token` was revoked meanwhile
    pub async fn resolve_if_live(&self, actor_id: &str, token: &LivenessToken) -> Option<RoleLookupResult> {
        let result = self.resolve(actor_id).await;
        if token.is_live() {
            Some(result)
        } else {
            warn!(actor_id, generation = token.generation(), "Discarding stale role resolution");
            None
        }
    }

    pub async fn resolve(&self, actor_id: &str) -> RoleLookupResult {
        let privilege_warning = match self.check_privilege(actor_id).await {
            Ok(true) => {
                info!(actor_id, "Actor resolved to top privilege tier");
                return RoleLookupResult::privileged();
            }
            Ok(false) => None,
            Err(e) => {
                warn!(actor_id, error = %e, "Privilege check failed, falling back to role lookup");
                Some(e.to_string())
            }
        };

        match self.lookup_role(actor_id).await {
            Ok(role) => {
                info!(actor_id, role = %role, "Role resolved");
                let result = RoleLookupResult::standard(role);
                match privilege_warning {
                    Some(message) => result.with_warning(message),
                    None => result,
                }
            }
            Err(e) => {
                warn!(actor_id, error = %e, "Role lookup failed");
                RoleLookupResult::failed(e.to_string())
            }
        }
    }

    async fn check_privilege(&self, actor_id: &str) -> Result<bool> {
        let backend = &self.backend;
        let deadline = self.privilege_check.deadline();
        with_retry(&self.privilege_check.retry, "is_super_admin", Some(&log_retry), move || {
            with_timeout("is_super_admin", deadline, backend.is_super_admin(actor_id))
        })
        .await
    }

    async fn lookup_role(&self, actor_id: &str) -> Result<Role> {
        let backend = &self.backend;
        let deadline = self.role_lookup.deadline();
        let name = with_retry(&self.role_lookup.retry, "fetch_role", Some(&log_retry), move || {
            with_timeout("fetch_role", deadline, backend.fetch_role(actor_id))
        })
        .await?;

        if name.trim().is_empty() {
            return Err(SessionError::RoleNotAssigned(actor_id.to_string()));
        }
        Ok(Role::parse(&name))
    }
}

fn log_retry(attempt: u32, err: &SessionError) {
    debug!(attempt, error = %err, "Role resolution call retrying");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::liveness::Liveness;
    use crate::backend::MockAuthBackend;

    fn fast_config() -> BootstrapConfig {
        BootstrapConfig::new()
            .with_privilege_check(CallPolicy::new(2, 1, 100))
            .with_role_lookup(CallPolicy::new(3, 1, 100))
    }

    fn resolver(mock: MockAuthBackend) -> RoleResolver {
        RoleResolver::new(Arc::new(mock), &fast_config())
    }

    #[tokio::test]
    async fn test_privileged_short_circuits_role_lookup() {
        let mut mock = MockAuthBackend::new();
        mock.expect_is_super_admin().times(1).returning(|_| Ok(true));
        mock.expect_fetch_role().times(0);

        let result = resolver(mock).resolve("root").await;
        assert_eq!(result, RoleLookupResult::privileged());
    }

    #[tokio::test]
    async fn test_standard_role() {
        let mut mock = MockAuthBackend::new();
        mock.expect_is_super_admin().times(1).returning(|_| Ok(false));
        mock.expect_fetch_role()
            .times(1)
            .returning(|_| Ok("Formateur".to_string()));

        let result = resolver(mock).resolve("u-7").await;
        assert_eq!(result.role, Some(Role::Formateur));
        assert!(!result.is_privileged);
        assert_eq!(result.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_privilege_failure_degrades_but_resolves() {
        let mut mock = MockAuthBackend::new();
        mock.expect_is_super_admin()
            .times(3)
            .returning(|_| Err(SessionError::TransientRemote("503".into())));
        mock.expect_fetch_role().times(1).returning(|_| Ok("Admin".to_string()));

        let result = resolver(mock).resolve("u-1").await;
        assert_eq!(result.role, Some(Role::Admin));
        assert!(result.error.unwrap().contains("is_super_admin failed after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_steps_exhausted() {
        let mut mock = MockAuthBackend::new();
        mock.expect_is_super_admin()
            .times(3)
            .returning(|_| Err(SessionError::TransientRemote("503".into())));
        mock.expect_fetch_role()
            .times(4)
            .returning(|_| Err(SessionError::TransientRemote("503".into())));

        let result = resolver(mock).resolve("u-1").await;
        assert_eq!(result.role, None);
        assert!(!result.is_privileged);
        assert!(result.error.unwrap().contains("fetch_role failed after 4 attempts"));
    }

    #[tokio::test]
    async fn test_empty_role_name_is_an_error() {
        let mut mock = MockAuthBackend::new();
        mock.expect_is_super_admin().returning(|_| Ok(false));
        mock.expect_fetch_role().returning(|_| Ok("  ".to_string()));

        let result = resolver(mock).resolve("u-1").await;
        assert_eq!(result, RoleLookupResult::failed("No role assigned to actor u-1"));
    }

    #[tokio::test]
    async fn test_revoked_token_discards_result() {
        let mut mock = MockAuthBackend::new();
        mock.expect_is_super_admin().returning(|_| Ok(false));
        mock.expect_fetch_role().returning(|_| Ok("Formateur".to_string()));

        let liveness = Liveness::new();
        let token = liveness.token();
        liveness.advance();

        assert_eq!(resolver(mock).resolve_if_live("u-1", &token).await, None);
    }
}
