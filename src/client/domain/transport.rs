//! Transport configuration value objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned while constructing transport configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportConfigError {
    /// The STDIO command line is empty.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// The STDIO working directory is empty after trimming.
    #[error("STDIO working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The HTTP base URL is empty.
    #[error("HTTP base URL must not be empty")]
    EmptyHttpBaseUrl,

    /// The HTTP base URL does not have an `http://` or `https://` prefix.
    #[error("HTTP base URL '{0}' must start with 'http://' or 'https://'")]
    InvalidHttpBaseUrl(String),
}

/// Settings for a server spawned as a child process speaking
/// newline-delimited JSON-RPC on stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioTransportConfig {
    command: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    working_directory: Option<String>,
}

impl StdioTransportConfig {
    /// Creates a STDIO configuration from an argv vector.
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigError::EmptyStdioCommand`] when the vector is
    /// empty or its program is blank.
    pub fn new<I, S>(argv: I) -> Result<Self, TransportConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = argv.into_iter().map(Into::into).collect();
        let has_program = command
            .first()
            .is_some_and(|program| !program.trim().is_empty());
        if !has_program {
            return Err(TransportConfigError::EmptyStdioCommand);
        }

        Ok(Self {
            command,
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Replaces process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, TransportConfigError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(TransportConfigError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the full argv vector.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Returns the executable.
    #[must_use]
    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    /// Returns the arguments after the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.command.split_first().map_or(&[], |(_, rest)| rest)
    }

    /// Returns environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Settings for a server reached over HTTP (`POST {base}/rpc`,
/// `GET {base}/health`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    base_url: String,
}

impl HttpTransportConfig {
    /// Creates an HTTP configuration. A trailing `/` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigError`] when `base_url` is empty or does not
    /// start with `http://` or `https://`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportConfigError> {
        let trimmed = base_url.into().trim().trim_end_matches('/').to_owned();
        if trimmed.is_empty() {
            return Err(TransportConfigError::EmptyHttpBaseUrl);
        }

        let has_valid_prefix = trimmed.starts_with("http://") || trimmed.starts_with("https://");
        if !has_valid_prefix {
            return Err(TransportConfigError::InvalidHttpBaseUrl(trimmed));
        }

        Ok(Self { base_url: trimmed })
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the JSON-RPC endpoint.
    #[must_use]
    pub fn rpc_url(&self) -> String {
        format!("{}/rpc", self.base_url)
    }

    /// Returns the liveness endpoint.
    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

/// Supported transport variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum TransportConfig {
    /// Child process over STDIO.
    Stdio(StdioTransportConfig),
    /// Remote server over HTTP.
    Http(HttpTransportConfig),
}

impl TransportConfig {
    /// Creates a `stdio` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StdioTransportConfig::new`].
    pub fn stdio<I, S>(argv: I) -> Result<Self, TransportConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::Stdio(StdioTransportConfig::new(argv)?))
    }

    /// Creates an `http` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`HttpTransportConfig::new`].
    pub fn http(base_url: impl Into<String>) -> Result<Self, TransportConfigError> {
        Ok(Self::Http(HttpTransportConfig::new(base_url)?))
    }

    /// Returns the transport kind as used in configuration files.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::Http(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn stdio_splits_program_and_args() {
        let config = StdioTransportConfig::new(["python", "-m", "server"]).expect("valid argv");
        assert_eq!(config.program(), "python");
        assert_eq!(config.args(), ["-m".to_owned(), "server".to_owned()]);
    }

    #[rstest]
    #[case(Vec::new())]
    #[case(vec!["  "])]
    fn stdio_rejects_missing_program(#[case] argv: Vec<&str>) {
        assert_eq!(
            StdioTransportConfig::new(argv),
            Err(TransportConfigError::EmptyStdioCommand)
        );
    }

    #[rstest]
    #[case("", Err(TransportConfigError::EmptyHttpBaseUrl))]
    #[case("ftp://x", Err(TransportConfigError::InvalidHttpBaseUrl("ftp://x".to_owned())))]
    #[case("http://localhost:8080/", Ok("http://localhost:8080"))]
    fn http_base_url_validation(
        #[case] raw: &str,
        #[case] expected: Result<&str, TransportConfigError>,
    ) {
        let outcome = HttpTransportConfig::new(raw);
        assert_eq!(
            outcome.as_ref().map(HttpTransportConfig::base_url),
            expected.as_ref().map(|url| *url)
        );
    }

    #[test]
    fn http_endpoints_are_derived_from_base() {
        let config = HttpTransportConfig::new("https://mcp.example").expect("valid url");
        assert_eq!(config.rpc_url(), "https://mcp.example/rpc");
        assert_eq!(config.health_url(), "https://mcp.example/health");
    }
}
