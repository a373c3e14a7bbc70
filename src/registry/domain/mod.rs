//! Registry domain: server names, configuration, health and status.

mod config;
mod error;
mod health;
mod name;
mod status;

pub use config::{
    REGISTRY_CONFIG_VERSION, RegistryConfigFile, ServerConfig, ServerConfigRecord, TransportKind,
};
pub use error::RegistryDomainError;
pub use health::{ServerHealth, ServerHealthSnapshot};
pub use name::ServerName;
pub use status::ServerStatus;
