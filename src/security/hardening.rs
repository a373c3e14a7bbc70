//! Input-hardening checks applied to tool arguments before a call leaves the
//! process.
//!
//! These are heuristic pattern checks, not parsers. The SQL detector in
//! particular can both miss crafted payloads and flag harmless text that
//! happens to look like SQL. Treat every check here as a coarse filter in
//! front of a server's own validation, never as the only line of defence.

use regex::RegexSet;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;

static SQL_INJECTION_PATTERNS: LazyLock<Result<RegexSet, regex::Error>> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\bunion\b[\s\S]*\bselect\b",
        r"(?i);\s*(drop|delete|insert|update|alter|create|truncate|grant)\b",
        r"--",
        r"/\*",
        r"(?i)'\s*or\s+'?[\w]*'?\s*=\s*'?[\w]*",
        r"(?i)\bor\b\s+\d+\s*=\s*\d+",
        r"(?i)\bexec(ute)?\s*\(",
        r"(?i)\bxp_cmdshell\b",
        r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(",
        r"(?i)\bwaitfor\s+delay\b",
    ])
});

/// Returns whether `candidate`, resolved lexically, stays inside `base`.
///
/// Both `/` and `\` separate segments, percent-encoded dots and separators
/// are decoded first, and any null byte makes the path unsafe. Symlinks are
/// not followed.
#[must_use]
pub fn is_path_within(base: &str, candidate: &str) -> bool {
    if base.contains('\0') || candidate.contains('\0') {
        return false;
    }
    let decoded = decode_path_escapes(candidate);
    let base_is_absolute = is_absolute(base);
    let candidate_is_absolute = is_absolute(&decoded);
    let Some(base_segments) = resolve_segments(segments(base)) else {
        return false;
    };

    let resolved = if candidate_is_absolute {
        if !base_is_absolute {
            return false;
        }
        resolve_segments(segments(&decoded))
    } else {
        resolve_segments(segments(base).chain(segments(&decoded)))
    };

    resolved.is_some_and(|full| full.starts_with(&base_segments))
}

/// Returns whether `query` matches a known SQL-injection pattern.
///
/// Fails closed: if the pattern set cannot be compiled every input is
/// reported as suspicious.
#[must_use]
pub fn detect_sql_injection(query: &str) -> bool {
    SQL_INJECTION_PATTERNS
        .as_ref()
        .map_or(true, |patterns| patterns.is_match(query))
}

/// Returns whether `uri` has a scheme in `allowed` (case-insensitive).
#[must_use]
pub fn is_uri_scheme_allowed<S: AsRef<str>>(uri: &str, allowed: &[S]) -> bool {
    uri_scheme(uri).is_some_and(|scheme| {
        allowed
            .iter()
            .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(scheme))
    })
}

/// Removes null bytes and control characters other than tab, line feed and
/// carriage return.
#[must_use]
pub fn strip_control_characters(input: &str) -> String {
    input
        .chars()
        .filter(|character| !character.is_control() || matches!(character, '\t' | '\n' | '\r'))
        .collect()
}

fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let mut characters = scheme.chars();
    let starts_with_letter = characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic());
    let rest_valid =
        characters.all(|character| character.is_ascii_alphanumeric() || "+-.".contains(character));
    (starts_with_letter && rest_valid).then_some(scheme)
}

fn decode_path_escapes(path: &str) -> String {
    [
        ("%2e", "."),
        ("%2E", "."),
        ("%2f", "/"),
        ("%2F", "/"),
        ("%5c", "\\"),
        ("%5C", "\\"),
    ]
    .into_iter()
    .fold(path.to_owned(), |decoded, (encoded, plain)| {
        decoded.replace(encoded, plain)
    })
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let mut characters = path.chars();
    matches!(
        (characters.next(), characters.next()),
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic()
    )
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Applies `..` segments; `None` when they climb above the start.
fn resolve_segments<'a>(parts: impl Iterator<Item = &'a str>) -> Option<Vec<&'a str>> {
    let mut stack = Vec::new();
    for part in parts {
        if part == ".." {
            stack.pop()?;
        } else {
            stack.push(part);
        }
    }
    Some(stack)
}

/// Violation found while inspecting tool arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgumentViolation {
    /// A path argument escapes the permitted base directory.
    #[error("argument '{key}' escapes the permitted directory: {value}")]
    PathTraversal {
        /// Argument key.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A query argument looks like SQL injection.
    #[error("argument '{key}' matches an SQL injection pattern")]
    SqlInjection {
        /// Argument key.
        key: String,
    },
    /// A URI argument uses a scheme outside the allow-list.
    #[error("argument '{key}' uses a disallowed URI scheme: {value}")]
    DisallowedScheme {
        /// Argument key.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A string argument contains a null byte.
    #[error("argument '{key}' contains a null byte")]
    NullByte {
        /// Argument key.
        key: String,
    },
}

/// Which argument keys receive which check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentPolicy {
    path_base: String,
    path_keys: BTreeSet<String>,
    query_keys: BTreeSet<String>,
    uri_keys: BTreeSet<String>,
    allowed_schemes: Vec<String>,
}

impl ArgumentPolicy {
    /// Creates a policy confining path arguments to `path_base`.
    ///
    /// A relative base (such as `.`) confines paths to relative locations
    /// that never climb above it.
    #[must_use]
    pub fn new(path_base: impl Into<String>) -> Self {
        let keys = |names: &[&str]| -> BTreeSet<String> {
            names.iter().map(|name| (*name).to_owned()).collect()
        };
        Self {
            path_base: path_base.into(),
            path_keys: keys(&["path", "file", "filename", "directory", "dir"]),
            query_keys: keys(&["query", "sql"]),
            uri_keys: keys(&["uri", "url"]),
            allowed_schemes: ["file", "http", "https"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Replaces the URI scheme allow-list.
    #[must_use]
    pub fn with_allowed_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the base directory path arguments are confined to.
    #[must_use]
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    /// Walks `arguments` and reports the first violation.
    ///
    /// # Errors
    ///
    /// Returns the first [`ArgumentViolation`] found, in document order.
    pub fn inspect(&self, arguments: &Value) -> Result<(), ArgumentViolation> {
        self.inspect_value("", arguments)
    }

    fn inspect_value(&self, key: &str, value: &Value) -> Result<(), ArgumentViolation> {
        match value {
            Value::Object(map) => map
                .iter()
                .try_for_each(|(child_key, child)| self.inspect_value(child_key, child)),
            Value::Array(items) => items
                .iter()
                .try_for_each(|item| self.inspect_value(key, item)),
            Value::String(text) => self.inspect_string(key, text),
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    fn inspect_string(&self, key: &str, text: &str) -> Result<(), ArgumentViolation> {
        if text.contains('\0') {
            return Err(ArgumentViolation::NullByte {
                key: key.to_owned(),
            });
        }
        let normalized_key = key.to_ascii_lowercase();
        if self.path_keys.contains(&normalized_key) && !is_path_within(&self.path_base, text) {
            return Err(ArgumentViolation::PathTraversal {
                key: key.to_owned(),
                value: text.to_owned(),
            });
        }
        if self.query_keys.contains(&normalized_key) && detect_sql_injection(text) {
            return Err(ArgumentViolation::SqlInjection {
                key: key.to_owned(),
            });
        }
        if self.uri_keys.contains(&normalized_key)
            && !is_uri_scheme_allowed(text, &self.allowed_schemes)
        {
            return Err(ArgumentViolation::DisallowedScheme {
                key: key.to_owned(),
                value: text.to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ArgumentPolicy {
    fn default() -> Self {
        Self::new(".")
    }
}
