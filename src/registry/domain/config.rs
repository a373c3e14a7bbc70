//! Server configuration and its persisted JSON form.

use super::{RegistryDomainError, ServerName};
use crate::client::{HttpTransportConfig, StdioTransportConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Current configuration file format version.
pub const REGISTRY_CONFIG_VERSION: u32 = 1;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

/// Validated configuration of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    name: ServerName,
    transport: TransportConfig,
    enabled: bool,
    timeout: Duration,
    auto_reconnect: bool,
    health_check_interval: Duration,
    allowed_agents: BTreeSet<String>,
    description: Option<String>,
    tags: BTreeSet<String>,
}

impl ServerConfig {
    /// Creates an enabled, auto-reconnecting configuration open to every
    /// agent.
    #[must_use]
    pub const fn new(name: ServerName, transport: TransportConfig) -> Self {
        Self {
            name,
            transport,
            enabled: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            auto_reconnect: true,
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            allowed_agents: BTreeSet::new(),
            description: None,
            tags: BTreeSet::new(),
        }
    }

    /// Sets whether the server is connected on start.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether a failed health check triggers a reconnect.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Sets the pause between health checks.
    #[must_use]
    pub const fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Restricts the server to the named agents. An empty list admits
    /// everyone.
    #[must_use]
    pub fn with_allowed_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Returns whether the server is connected on start.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns whether a failed health check triggers a reconnect.
    #[must_use]
    pub const fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    /// Returns the pause between health checks.
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    /// Returns the agent allow-list.
    #[must_use]
    pub const fn allowed_agents(&self) -> &BTreeSet<String> {
        &self.allowed_agents
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns whether `agent` may use this server.
    #[must_use]
    pub fn admits(&self, agent: &str) -> bool {
        self.allowed_agents.is_empty() || self.allowed_agents.contains(agent)
    }
}

/// Transport discriminator in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Child process over STDIO.
    Stdio,
    /// Remote server over HTTP.
    Http,
}

/// One server entry as written in the configuration file. Durations are in
/// whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfigRecord {
    /// Server name.
    pub name: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Argv for `stdio` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Base URL for `http` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extra environment for `stdio` servers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Working directory for `stdio` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Whether the server is connected on start.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Per-request deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Whether failed health checks trigger a reconnect.
    #[serde(default = "enabled_by_default")]
    pub auto_reconnect: bool,
    /// Seconds between health checks.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    /// Agents allowed to use the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_agents: Option<Vec<String>>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

const fn enabled_by_default() -> bool {
    true
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_health_check_interval() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS
}

impl ServerConfigRecord {
    fn stdio(name: &str, command: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            transport: TransportKind::Stdio,
            command: Some(command.iter().map(|part| (*part).to_owned()).collect()),
            url: None,
            env: BTreeMap::new(),
            working_directory: None,
            enabled: false,
            timeout: DEFAULT_TIMEOUT_SECS,
            auto_reconnect: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            allowed_agents: None,
            description: None,
            tags: Vec::new(),
        }
    }

    fn described(mut self, description: &str, tags: &[&str]) -> Self {
        self.description = Some(description.to_owned());
        self.tags = tags.iter().map(|tag| (*tag).to_owned()).collect();
        self
    }

    fn transport_config(&self) -> Result<TransportConfig, RegistryDomainError> {
        let invalid = |source| RegistryDomainError::Transport {
            server: self.name.clone(),
            source,
        };
        match self.transport {
            TransportKind::Stdio => {
                let command = self
                    .command
                    .as_ref()
                    .ok_or_else(|| RegistryDomainError::MissingCommand(self.name.clone()))?;
                let base = StdioTransportConfig::new(command.iter().cloned())
                    .map_err(invalid)?
                    .with_env(self.env.clone());
                let stdio = match &self.working_directory {
                    Some(directory) => base
                        .with_working_directory(directory.clone())
                        .map_err(invalid)?,
                    None => base,
                };
                Ok(TransportConfig::Stdio(stdio))
            }
            TransportKind::Http => {
                let url = self
                    .url
                    .as_ref()
                    .ok_or_else(|| RegistryDomainError::MissingUrl(self.name.clone()))?;
                Ok(TransportConfig::Http(
                    HttpTransportConfig::new(url.clone()).map_err(invalid)?,
                ))
            }
        }
    }

    fn positive_seconds(
        &self,
        value: u64,
        field: &'static str,
    ) -> Result<Duration, RegistryDomainError> {
        if value == 0 {
            return Err(RegistryDomainError::ZeroDuration {
                server: self.name.clone(),
                field,
            });
        }
        Ok(Duration::from_secs(value))
    }
}

impl TryFrom<&ServerConfigRecord> for ServerConfig {
    type Error = RegistryDomainError;

    fn try_from(record: &ServerConfigRecord) -> Result<Self, Self::Error> {
        let name = ServerName::new(record.name.clone())?;
        let transport = record.transport_config()?;
        let timeout = record.positive_seconds(record.timeout, "timeout")?;
        let interval =
            record.positive_seconds(record.health_check_interval, "health_check_interval")?;
        let config = Self::new(name, transport)
            .with_enabled(record.enabled)
            .with_timeout(timeout)
            .with_auto_reconnect(record.auto_reconnect)
            .with_health_check_interval(interval)
            .with_allowed_agents(record.allowed_agents.iter().flatten().cloned())
            .with_tags(record.tags.iter().cloned());
        Ok(match &record.description {
            Some(description) => config.with_description(description.clone()),
            None => config,
        })
    }
}

impl From<&ServerConfig> for ServerConfigRecord {
    fn from(config: &ServerConfig) -> Self {
        let (transport, command, url, env, working_directory) = match config.transport() {
            TransportConfig::Stdio(stdio) => (
                TransportKind::Stdio,
                Some(stdio.command().to_vec()),
                None,
                stdio.env().clone(),
                stdio.working_directory().map(str::to_owned),
            ),
            TransportConfig::Http(http) => (
                TransportKind::Http,
                None,
                Some(http.base_url().to_owned()),
                BTreeMap::new(),
                None,
            ),
        };
        let allowed_agents = (!config.allowed_agents().is_empty())
            .then(|| config.allowed_agents().iter().cloned().collect());
        Self {
            name: config.name().as_str().to_owned(),
            transport,
            command,
            url,
            env,
            working_directory,
            enabled: config.enabled(),
            timeout: config.timeout().as_secs(),
            auto_reconnect: config.auto_reconnect(),
            health_check_interval: config.health_check_interval().as_secs(),
            allowed_agents,
            description: config.description().map(str::to_owned),
            tags: config.tags().iter().cloned().collect(),
        }
    }
}

/// Contents of the registry configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfigFile {
    /// Format version.
    pub version: u32,
    /// Configured servers.
    #[serde(default)]
    pub servers: Vec<ServerConfigRecord>,
}

impl RegistryConfigFile {
    /// Builds a file from validated configurations.
    #[must_use]
    pub fn from_configs<'a>(configs: impl IntoIterator<Item = &'a ServerConfig>) -> Self {
        Self {
            version: REGISTRY_CONFIG_VERSION,
            servers: configs.into_iter().map(ServerConfigRecord::from).collect(),
        }
    }

    /// Commonly useful servers, all disabled, written when no configuration
    /// exists yet.
    #[must_use]
    pub fn default_config() -> Self {
        Self {
            version: REGISTRY_CONFIG_VERSION,
            servers: vec![
                ServerConfigRecord::stdio(
                    "filesystem",
                    &["npx", "-y", "@modelcontextprotocol/server-filesystem", "."],
                )
                .described("Read and write files under the working directory", &["files"]),
                ServerConfigRecord::stdio("git", &["uvx", "mcp-server-git", "--repository", "."])
                    .described("Inspect and manipulate the local git repository", &["vcs"]),
                ServerConfigRecord::stdio("fetch", &["uvx", "mcp-server-fetch"])
                    .described("Fetch web pages as markdown", &["web"]),
                ServerConfigRecord::stdio(
                    "sqlite",
                    &["uvx", "mcp-server-sqlite", "--db-path", "data.db"],
                )
                .described("Query a local SQLite database", &["database"]),
            ],
        }
    }

    /// Validates every entry.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryDomainError`] found, including an
    /// unsupported format version.
    pub fn to_configs(&self) -> Result<Vec<ServerConfig>, RegistryDomainError> {
        if self.version != REGISTRY_CONFIG_VERSION {
            return Err(RegistryDomainError::UnsupportedVersion(self.version));
        }
        self.servers.iter().map(ServerConfig::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn parses_documented_file_format() {
        let file: RegistryConfigFile = serde_json::from_value(json!({
            "version": 1,
            "servers": [
                {
                    "name": "echo",
                    "transport": "stdio",
                    "command": ["echo-server", "--quiet"],
                    "enabled": true,
                    "timeout": 5,
                    "auto_reconnect": false,
                    "health_check_interval": 10,
                    "allowed_agents": ["planner"],
                    "tags": ["test"]
                },
                {
                    "name": "remote",
                    "transport": "http",
                    "url": "http://localhost:9000/",
                    "enabled": false,
                    "timeout": 30,
                    "auto_reconnect": true,
                    "health_check_interval": 60,
                    "description": "Remote tools"
                }
            ]
        }))
        .expect("file should parse");

        let configs = file.to_configs().expect("entries should validate");
        let [echo, remote] = configs.as_slice() else {
            panic!("expected two servers");
        };
        assert_eq!(echo.name().as_str(), "echo");
        assert_eq!(echo.timeout(), Duration::from_secs(5));
        assert!(!echo.auto_reconnect());
        assert!(echo.admits("planner"));
        assert!(!echo.admits("intruder"));
        assert_eq!(
            remote.transport(),
            &TransportConfig::http("http://localhost:9000").expect("valid url")
        );
        assert!(remote.admits("anyone"));
        assert_eq!(remote.description(), Some("Remote tools"));
    }

    #[test]
    fn records_survive_a_save_and_load() {
        let config = ServerConfig::new(
            ServerName::new("echo").expect("valid name"),
            TransportConfig::stdio(["echo-server"]).expect("valid argv"),
        )
        .with_allowed_agents(["a", "b"])
        .with_tags(["test"])
        .with_timeout(Duration::from_secs(7));

        let file = RegistryConfigFile::from_configs([&config]);
        let restored = file.to_configs().expect("entries should validate");
        assert_eq!(restored, vec![config]);
    }

    #[rstest]
    #[case(json!({"name": "x", "transport": "stdio"}), RegistryDomainError::MissingCommand("x".to_owned()))]
    #[case(json!({"name": "x", "transport": "http"}), RegistryDomainError::MissingUrl("x".to_owned()))]
    #[case(
        json!({"name": "x", "transport": "stdio", "command": ["srv"], "timeout": 0}),
        RegistryDomainError::ZeroDuration { server: "x".to_owned(), field: "timeout" }
    )]
    #[case(json!({"name": "bad name", "transport": "stdio", "command": ["srv"]}), RegistryDomainError::InvalidServerName("bad name".to_owned()))]
    fn rejects_malformed_entries(#[case] entry: serde_json::Value, #[case] expected: RegistryDomainError) {
        let record: ServerConfigRecord = serde_json::from_value(entry).expect("record should parse");
        assert_eq!(ServerConfig::try_from(&record), Err(expected));
    }

    #[test]
    fn rejects_unknown_version() {
        let file = RegistryConfigFile {
            version: 9,
            servers: Vec::new(),
        };
        assert_eq!(
            file.to_configs(),
            Err(RegistryDomainError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn default_config_ships_disabled_servers() {
        let configs = RegistryConfigFile::default_config()
            .to_configs()
            .expect("defaults should validate");
        let names: Vec<&str> = configs.iter().map(|config| config.name().as_str()).collect();
        assert_eq!(names, vec!["filesystem", "git", "fetch", "sqlite"]);
        assert!(configs.iter().all(|config| !config.enabled()));
    }
}
