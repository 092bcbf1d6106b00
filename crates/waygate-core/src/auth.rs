//! Authentication context attached to incoming requests.
//!
//! Produced by the out-of-scope auth middleware and threaded through the
//! client API. The gateway reads it to stamp ledger events with the
//! acting principal; it never enforces authorization itself.

use crate::id::PrincipalId;
use crate::principal::PrincipalKind;
use serde::{Deserialize, Serialize};

/// Role name granting admin surfaces.
pub const ADMIN_ROLE: &str = "admin";

/// Read-only view of the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// The acting principal.
    pub principal_id: PrincipalId,
    /// What kind of principal is acting.
    pub principal_type: PrincipalKind,
    /// Roles attached to the principal.
    pub roles: Vec<String>,
}

impl AuthContext {
    /// Create a context with no roles.
    #[must_use]
    pub fn new(principal_id: PrincipalId, principal_type: PrincipalKind) -> Self {
        Self {
            principal_id,
            principal_type,
            roles: Vec::new(),
        }
    }

    /// Attach a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Whether the caller holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_context_is_not_admin() {
        let auth = AuthContext::new(PrincipalId::new(), PrincipalKind::Client);
        assert!(!auth.is_admin());
    }

    #[test]
    fn admin_role_is_recognized() {
        let auth = AuthContext::new(PrincipalId::new(), PrincipalKind::Client)
            .with_role("operator")
            .with_role(ADMIN_ROLE);
        assert!(auth.is_admin());
    }
}
