//! Validated runtime configuration shared by the request handlers.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Admin configuration with hashed secret.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// The argon2 hashed admin secret.
    pub secret_hash: String,
}

impl AdminConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Verify a plaintext secret against the stored hash.
    pub fn verify_secret(&self, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub max_attempts: u32,
}

/// Shared configuration state with separate locks for each section.
///
/// Every section here is replaced on SIGHUP. The store backend is not:
/// switching it needs a restart.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub admin: Arc<RwLock<AdminConfig>>,
    pub allocator: Arc<RwLock<AllocatorConfig>>,
}
