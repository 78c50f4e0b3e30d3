use std::path::PathBuf;

/// Configuration for [`JobRegistry`](crate::JobRegistry).
///
/// Use [`RegistryConfig::builder()`] or [`RegistryConfig::default()`]
/// (in-memory database, five concurrent jobs).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Path to the SQLite database file. `None` = in-memory database.
    pub db_path: Option<PathBuf>,

    /// Jobs allowed in the `running` state at once.
    pub max_concurrent_jobs: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_concurrent_jobs: 5,
        }
    }
}

impl RegistryConfig {
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

/// Builder for [`RegistryConfig`].
#[derive(Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Persist jobs in this file. Omit for in-memory.
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: u32) -> Self {
        self.config.max_concurrent_jobs = max;
        self
    }

    pub fn build(self) -> RegistryConfig {
        self.config
    }
}
