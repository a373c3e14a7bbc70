//! JSON configuration file store.

use crate::registry::domain::RegistryConfigFile;
use crate::registry::ports::{ConfigStoreError, ConfigStoreResult, ServerConfigStore};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::ErrorKind;

/// Stores the configuration as pretty-printed JSON at a fixed path.
///
/// File access goes through a capability handle on the parent directory.
#[derive(Debug, Clone)]
pub struct JsonFileConfigStore {
    path: Utf8PathBuf,
}

impl JsonFileConfigStore {
    /// Creates a store for `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

fn split_path(path: &Utf8Path) -> ConfigStoreResult<(&Utf8Path, &str)> {
    let file_name = path.file_name().ok_or_else(|| {
        ConfigStoreError::io(std::io::Error::other(format!(
            "configuration path '{path}' must include a file name"
        )))
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Ok((parent, file_name))
}

fn read_file(path: &Utf8Path) -> ConfigStoreResult<Option<String>> {
    let (parent, file_name) = split_path(path)?;
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigStoreError::io(err)),
    };
    match dir.read_to_string(file_name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ConfigStoreError::io(err)),
    }
}

fn write_file(path: &Utf8Path, contents: &str) -> ConfigStoreResult<()> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(ConfigStoreError::io)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(ConfigStoreError::io)?;
    dir.write(file_name, contents).map_err(ConfigStoreError::io)
}

#[async_trait]
impl ServerConfigStore for JsonFileConfigStore {
    async fn load(&self) -> ConfigStoreResult<Option<RegistryConfigFile>> {
        let path = self.path.clone();
        let contents = tokio::task::spawn_blocking(move || read_file(&path))
            .await
            .map_err(ConfigStoreError::io)??;
        contents
            .map(|text| {
                serde_json::from_str(&text).map_err(|err| ConfigStoreError::Malformed(err.to_string()))
            })
            .transpose()
    }

    async fn save(&self, config: &RegistryConfigFile) -> ConfigStoreResult<()> {
        let mut contents = serde_json::to_string_pretty(config)
            .map_err(|err| ConfigStoreError::Malformed(err.to_string()))?;
        contents.push('\n');
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_file(&path, &contents))
            .await
            .map_err(ConfigStoreError::io)??;
        tracing::debug!(path = %self.path, "saved registry configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(directory: &tempfile::TempDir, relative: &str) -> JsonFileConfigStore {
        let root = Utf8Path::from_path(directory.path()).expect("temp dir should be UTF-8");
        JsonFileConfigStore::new(root.join(relative))
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let directory = tempfile::tempdir().expect("temp dir");
        let store = temp_store(&directory, "absent/servers.json");
        assert_eq!(store.load().await.expect("load should succeed"), None);
    }

    #[tokio::test]
    async fn saved_configuration_loads_back() {
        let directory = tempfile::tempdir().expect("temp dir");
        let store = temp_store(&directory, "config/servers.json");
        let config = RegistryConfigFile::default_config();

        store.save(&config).await.expect("save should succeed");
        let loaded = store.load().await.expect("load should succeed");
        assert_eq!(loaded, Some(config));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let directory = tempfile::tempdir().expect("temp dir");
        std::fs::write(directory.path().join("servers.json"), "{ not json")
            .expect("fixture should write");
        let store = temp_store(&directory, "servers.json");

        let outcome = store.load().await;
        assert!(matches!(outcome, Err(ConfigStoreError::Malformed(_))));
    }
}
