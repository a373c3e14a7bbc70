//! Permissions, security levels and the actions they guard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability a principal may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Discover tools.
    ReadTools,
    /// Invoke tools.
    CallTools,
    /// Read resources.
    ReadResources,
    /// Modify resources.
    WriteResources,
    /// Register, unregister and reconnect servers.
    ManageServers,
    /// Read audit and runtime logs.
    ViewLogs,
    /// Administrative operations.
    AdminAccess,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::ReadTools,
        Self::CallTools,
        Self::ReadResources,
        Self::WriteResources,
        Self::ManageServers,
        Self::ViewLogs,
        Self::AdminAccess,
    ];

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadTools => "read_tools",
            Self::CallTools => "call_tools",
            Self::ReadResources => "read_resources",
            Self::WriteResources => "write_resources",
            Self::ManageServers => "manage_servers",
            Self::ViewLogs => "view_logs",
            Self::AdminAccess => "admin_access",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Ordered trust level of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Anonymous or untrusted callers.
    Public,
    /// Regular users and agents.
    User,
    /// Operators.
    Admin,
    /// The runtime itself; holds every permission.
    System,
}

impl SecurityLevel {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::User => "user",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Rate-limit rule applied to tool invocations.
pub const TOOL_CALLS_RULE: &str = "tool_calls";
/// Rate-limit rule applied to resource access.
pub const RESOURCE_ACCESS_RULE: &str = "resource_access";
/// Rate-limit rule applied to server management.
pub const SERVER_MANAGEMENT_RULE: &str = "server_management";
/// Rate-limit rule applied to everything else.
pub const DEFAULT_RULE: &str = "default";

/// Security-relevant operation subject to authorization and rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Discover tools.
    ListTools,
    /// Invoke a tool.
    CallTool,
    /// Read a resource.
    ReadResource,
    /// Write a resource.
    WriteResource,
    /// Manage servers.
    ManageServers,
    /// Read logs.
    ViewLogs,
    /// Administrative operation.
    Administer,
}

impl Action {
    /// Returns the permission required to perform the action.
    #[must_use]
    pub const fn required_permission(self) -> Permission {
        match self {
            Self::ListTools => Permission::ReadTools,
            Self::CallTool => Permission::CallTools,
            Self::ReadResource => Permission::ReadResources,
            Self::WriteResource => Permission::WriteResources,
            Self::ManageServers => Permission::ManageServers,
            Self::ViewLogs => Permission::ViewLogs,
            Self::Administer => Permission::AdminAccess,
        }
    }

    /// Returns the name of the rate-limit rule governing the action.
    #[must_use]
    pub const fn rate_limit_rule(self) -> &'static str {
        match self {
            Self::CallTool => TOOL_CALLS_RULE,
            Self::ReadResource | Self::WriteResource => RESOURCE_ACCESS_RULE,
            Self::ManageServers => SERVER_MANAGEMENT_RULE,
            Self::ListTools | Self::ViewLogs | Self::Administer => DEFAULT_RULE,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListTools => "list_tools",
            Self::CallTool => "call_tool",
            Self::ReadResource => "read_resource",
            Self::WriteResource => "write_resource",
            Self::ManageServers => "manage_servers",
            Self::ViewLogs => "view_logs",
            Self::Administer => "administer",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn security_levels_are_ordered() {
        assert!(SecurityLevel::Public < SecurityLevel::User);
        assert!(SecurityLevel::User < SecurityLevel::Admin);
        assert!(SecurityLevel::Admin < SecurityLevel::System);
    }

    #[rstest]
    #[case(Action::CallTool, TOOL_CALLS_RULE)]
    #[case(Action::ReadResource, RESOURCE_ACCESS_RULE)]
    #[case(Action::ManageServers, SERVER_MANAGEMENT_RULE)]
    #[case(Action::ListTools, DEFAULT_RULE)]
    fn actions_map_to_distinct_rules(#[case] action: Action, #[case] rule: &str) {
        assert_eq!(action.rate_limit_rule(), rule);
    }
}
