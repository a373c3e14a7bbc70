//! Principal identifier type.

use super::SecurityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a principal identifier.
const MAX_PRINCIPAL_ID_LENGTH: usize = 128;

/// Validated principal identifier, such as an agent or user name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Creates a principal identifier.
    ///
    /// The input is trimmed; it must be non-empty, at most 128 characters and
    /// free of whitespace and control characters.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidPrincipalId`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, SecurityError> {
        let normalized = value.into().trim().to_owned();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= MAX_PRINCIPAL_ID_LENGTH
            && !normalized
                .chars()
                .any(|character| character.is_whitespace() || character.is_control());
        if !is_valid {
            return Err(SecurityError::InvalidPrincipalId(normalized));
        }
        Ok(Self(normalized))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PrincipalId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("two words")]
    #[case("nul\u{0}byte")]
    fn invalid_principal_ids_are_rejected(#[case] raw: &str) {
        assert!(PrincipalId::new(raw).is_err());
    }

    #[test]
    fn principal_id_is_trimmed() {
        let id = PrincipalId::new("  observer ").expect("valid id");
        assert_eq!(id.as_str(), "observer");
    }
}
