//! Agent sessions and per-agent usage counters.

use crate::security::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open agent session.
///
/// Sessions opened with a bearer token remember it so every call made
/// through the session passes the security gate of the target client.
#[derive(Clone, PartialEq, Eq)]
pub struct AgentSession {
    id: SessionId,
    agent: String,
    principal: Option<PrincipalId>,
    token: Option<String>,
    opened_at: DateTime<Utc>,
}

impl AgentSession {
    pub(crate) fn new(agent: String, opened_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            agent,
            principal: None,
            token: None,
            opened_at,
        }
    }

    pub(crate) fn authenticated(mut self, principal: PrincipalId, token: String) -> Self {
        self.principal = Some(principal);
        self.token = Some(token);
        self
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the agent the session belongs to.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Returns the authenticated principal, if a token was presented.
    #[must_use]
    pub const fn principal(&self) -> Option<&PrincipalId> {
        self.principal.as_ref()
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns when the session was opened.
    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }
}

impl fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSession")
            .field("id", &self.id)
            .field("agent", &self.agent)
            .field("principal", &self.principal)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// Cumulative usage of one agent across all sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUsage {
    /// Tool calls attempted.
    pub tool_calls: u64,
    /// Resource reads attempted.
    pub resource_reads: u64,
    /// Calls and reads that failed.
    pub failures: u64,
    /// Time of the most recent call or read.
    pub last_activity: Option<DateTime<Utc>>,
}

impl AgentUsage {
    pub(crate) const fn record_tool_call(&mut self, at: DateTime<Utc>, succeeded: bool) {
        self.tool_calls = self.tool_calls.saturating_add(1);
        self.record_outcome(at, succeeded);
    }

    pub(crate) const fn record_resource_read(&mut self, at: DateTime<Utc>, succeeded: bool) {
        self.resource_reads = self.resource_reads.saturating_add(1);
        self.record_outcome(at, succeeded);
    }

    const fn record_outcome(&mut self, at: DateTime<Utc>, succeeded: bool) {
        if !succeeded {
            self.failures = self.failures.saturating_add(1);
        }
        self.last_activity = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    fn usage_counts_calls_reads_and_failures() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid time");
        let mut usage = AgentUsage::default();

        usage.record_tool_call(at, true);
        usage.record_tool_call(at, false);
        usage.record_resource_read(at, false);

        assert_eq!(usage.tool_calls, 2);
        assert_eq!(usage.resource_reads, 1);
        assert_eq!(usage.failures, 2);
        assert_eq!(usage.last_activity, Some(at));
    }

    #[rstest]
    fn debug_output_redacts_the_token() {
        let session = AgentSession::new("planner".to_owned(), Utc::now()).authenticated(
            PrincipalId::new("planner").expect("valid id"),
            "secret-token".to_owned(),
        );

        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
