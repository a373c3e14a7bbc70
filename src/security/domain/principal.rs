//! Security principals and their authenticated views.

use super::{Permission, PrincipalId, SecurityLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of identity a principal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A human user.
    User,
    /// An autonomous agent.
    Agent,
    /// The runtime itself.
    System,
}

impl PrincipalKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identity registered with the security manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPrincipal {
    id: PrincipalId,
    display_name: String,
    kind: PrincipalKind,
    level: SecurityLevel,
    permissions: BTreeSet<Permission>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl SecurityPrincipal {
    /// Creates a principal.
    ///
    /// A principal at [`SecurityLevel::System`] holds every permission
    /// regardless of `permissions`.
    #[must_use]
    pub fn new(
        id: PrincipalId,
        display_name: impl Into<String>,
        kind: PrincipalKind,
        level: SecurityLevel,
        permissions: impl IntoIterator<Item = Permission>,
        now: DateTime<Utc>,
    ) -> Self {
        let permissions = if level == SecurityLevel::System {
            Permission::ALL.into_iter().collect()
        } else {
            permissions.into_iter().collect()
        };
        Self {
            id,
            display_name: display_name.into(),
            kind,
            level,
            permissions,
            created_at: now,
            last_active: now,
        }
    }

    /// Returns the principal identifier.
    #[must_use]
    pub const fn id(&self) -> &PrincipalId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the principal kind.
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Returns the security level.
    #[must_use]
    pub const fn level(&self) -> SecurityLevel {
        self.level
    }

    /// Returns the permission set.
    #[must_use]
    pub const fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns whether the principal holds `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last time the principal authenticated.
    #[must_use]
    pub const fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Records activity at `now`.
    pub const fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }

    /// Builds the view of this principal with full permissions, as used for
    /// in-process callers that do not present a token.
    #[must_use]
    pub fn authenticated(&self) -> AuthenticatedPrincipal {
        self.scoped(&self.permissions)
    }

    /// Builds the view of this principal restricted to `scope`.
    #[must_use]
    pub fn scoped(&self, scope: &BTreeSet<Permission>) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            principal_id: self.id.clone(),
            display_name: self.display_name.clone(),
            kind: self.kind,
            level: self.level,
            permissions: self.permissions.intersection(scope).copied().collect(),
        }
    }
}

/// Principal as seen by a single authenticated request.
///
/// Its permissions are the intersection of the token's scope and the
/// principal's current permissions, so a narrowly scoped token never
/// regains permissions through re-authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    principal_id: PrincipalId,
    display_name: String,
    kind: PrincipalKind,
    level: SecurityLevel,
    permissions: BTreeSet<Permission>,
}

impl AuthenticatedPrincipal {
    /// Returns the principal identifier.
    #[must_use]
    pub const fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the principal kind.
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Returns the security level.
    #[must_use]
    pub const fn level(&self) -> SecurityLevel {
        self.level
    }

    /// Returns the effective permissions.
    #[must_use]
    pub const fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns whether the effective permissions include `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}
