//! TOML file configuration structures.
//!
//! These structs directly map to the `trakko-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use trakko_core::allocator::DEFAULT_MAX_ATTEMPTS;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub allocator: AllocatorConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Where records are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory. Everything is lost on exit.
    #[default]
    Memory,
    /// Postgres at `DATABASE_URL`.
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Optimistic write settings, shared by ticket allocation and event renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[admin]
secret = "test-secret"

[store]
backend = "postgres"

[allocator]
max_attempts = 25
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.allocator.max_attempts, 25);
        assert!(!config.is_admin_secret_hashed());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str("[admin]\nsecret = \"s\"\n").unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.allocator.max_attempts, 10);
    }

    #[test]
    fn test_hashed_secret_detection() {
        let config = FileConfig {
            server: ServerConfig::default(),
            admin: AdminConfig {
                secret: "$argon2id$v=19$m=19456,t=2,p=1$abc123".to_string(),
            },
            store: StoreConfig::default(),
            allocator: AllocatorConfig::default(),
        };
        assert!(config.is_admin_secret_hashed());
    }
}
