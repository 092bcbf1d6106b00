//! Principals — authenticated identities known to the gateway.

use crate::id::PrincipalId;
use serde::{Deserialize, Serialize};

/// What kind of party a principal is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A human-facing client (UI, chat frontend, other service).
    Client,
    /// A long-lived agent process.
    Agent,
    /// A remotely-hosted tool pack.
    Pack,
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Agent => write!(f, "agent"),
            Self::Pack => write!(f, "pack"),
        }
    }
}

/// Lifecycle status of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    /// Registered but not yet approved by an operator.
    Pending,
    /// Approved and allowed to attach.
    Approved,
    /// Access revoked.
    Revoked,
    /// Currently attached.
    Online,
    /// Approved but not currently attached.
    Offline,
}

impl std::fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Revoked => write!(f, "revoked"),
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// An authenticated identity.
///
/// Authentication itself (key verification, role tables) is a
/// collaborator concern; the gateway only reads these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier.
    pub id: PrincipalId,
    /// What kind of party this is.
    pub kind: PrincipalKind,
    /// Public-key fingerprint, as recorded by the auth layer.
    pub fingerprint: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Lifecycle status.
    pub status: PrincipalStatus,
}

impl Principal {
    /// Create a principal in `Pending` status.
    #[must_use]
    pub fn new(kind: PrincipalKind, fingerprint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: PrincipalId::new(),
            kind,
            fingerprint: fingerprint.into(),
            display_name: name.into(),
            status: PrincipalStatus::Pending,
        }
    }

    /// Whether this principal may currently attach.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self.status, PrincipalStatus::Pending | PrincipalStatus::Revoked)
    }
}
