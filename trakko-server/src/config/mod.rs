//! Configuration module for trakko-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, StoreBackend};
use crate::config::runtime::{AdminConfig, AllocatorConfig, ServerConfig, SharedConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub allocator: AllocatorConfig,
    pub store_backend: StoreBackend,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server)),
            admin: Arc::new(RwLock::new(self.admin)),
            allocator: Arc::new(RwLock::new(self.allocator)),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = self.hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            admin: AdminConfig::new(secret_hash),
            allocator: AllocatorConfig {
                max_attempts: file_config.allocator.max_attempts,
            },
            store_backend: file_config.store.backend,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.admin.secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "admin secret must not be empty".into(),
            ));
        }
        if config.allocator.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "allocator.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write to a sibling temp file, then rename over the original.
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    struct TempConfig(PathBuf);

    impl TempConfig {
        fn new(content: &str) -> Self {
            let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
            let path = std::env::temp_dir().join(format!(
                "trakko-config-{}-{nanos}.toml",
                std::process::id()
            ));
            std::fs::write(&path, content).unwrap();
            TempConfig(path)
        }
    }

    impl Drop for TempConfig {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_plaintext_secret_is_hashed_and_persisted() {
        let file = TempConfig::new("[admin]\nsecret = \"open-sesame\"\n");
        let loaded = ConfigLoader::new(&file.0, None).load().unwrap();

        assert!(loaded.admin.secret_hash.starts_with("$argon2"));
        assert!(loaded.admin.verify_secret("open-sesame"));
        assert_eq!(loaded.store_backend, StoreBackend::Memory);

        let rewritten: FileConfig =
            toml::from_str(&std::fs::read_to_string(&file.0).unwrap()).unwrap();
        assert_eq!(rewritten.admin.secret, loaded.admin.secret_hash);

        // A second load keeps the existing hash.
        let again = ConfigLoader::new(&file.0, None).load().unwrap();
        assert_eq!(again.admin.secret_hash, loaded.admin.secret_hash);
    }

    #[test]
    fn test_listen_override_wins() {
        let file = TempConfig::new(
            "[server]\nlisten = \"127.0.0.1:1\"\n[admin]\nsecret = \"$argon2id$v=19$x\"\n",
        );
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new(&file.0, Some(addr)).load().unwrap();
        assert_eq!(loaded.server.listen, addr);
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let file = TempConfig::new(
            "[admin]\nsecret = \"$argon2id$v=19$x\"\n[allocator]\nmax_attempts = 0\n",
        );
        let err = ConfigLoader::new(&file.0, None).load().err().unwrap();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
