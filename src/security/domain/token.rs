//! Opaque access tokens.

use super::{Permission, PrincipalId};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Number of characters in a generated token.
pub const TOKEN_LENGTH: usize = 48;

/// Stored record of an issued token.
///
/// The raw token is never stored; records are keyed by [`TokenDigest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    principal_id: PrincipalId,
    permissions: BTreeSet<Permission>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token record.
    #[must_use]
    pub const fn new(
        principal_id: PrincipalId,
        permissions: BTreeSet<Permission>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            principal_id,
            permissions,
            created_at,
            expires_at,
        }
    }

    /// Returns the owning principal.
    #[must_use]
    pub const fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    /// Returns the token's permission scope.
    #[must_use]
    pub const fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns the issue timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the expiry timestamp.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// SHA-256 digest of a raw token, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenDigest(String);

impl TokenDigest {
    /// Computes the digest of a raw token.
    #[must_use]
    pub fn of(raw_token: &str) -> Self {
        let digest = Sha256::digest(raw_token.as_bytes());
        Self(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenDigest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Token handed to a caller at issue time.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    token: String,
    principal_id: PrincipalId,
    permissions: BTreeSet<Permission>,
    expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub(crate) const fn new(
        token: String,
        principal_id: PrincipalId,
        permissions: BTreeSet<Permission>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            principal_id,
            permissions,
            expires_at,
        }
    }

    /// Returns the raw bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the owning principal.
    #[must_use]
    pub const fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    /// Returns the token's permission scope.
    #[must_use]
    pub const fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns the expiry timestamp.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("IssuedToken")
            .field("token", &"<redacted>")
            .field("principal_id", &self.principal_id)
            .field("permissions", &self.permissions)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Generates a fresh random bearer token.
#[must_use]
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_alphanumeric_and_distinct() {
        let first = generate_token();
        let second = generate_token();
        assert_eq!(first.len(), TOKEN_LENGTH);
        assert!(first.chars().all(|character| character.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = TokenDigest::of("abc");
        assert_eq!(
            digest.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn issued_token_debug_redacts_secret() {
        let issued = IssuedToken::new(
            "secret".to_owned(),
            PrincipalId::new("agent").expect("valid id"),
            BTreeSet::new(),
            Utc::now(),
        );
        assert!(!format!("{issued:?}").contains("secret"));
    }
}
