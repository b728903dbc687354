#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

//! Shared types for Trakko.
//!
//! - [`objects`]: request, response and stored record shapes.
//! - [`feed`]: snapshot fingerprinting and the subscriber-side reconciler.
//! - [`sse`]: an incremental `text/event-stream` decoder.
//! - `client` (feature `client`): typed HTTP clients and the live feed
//!   subscription.

pub mod feed;
pub mod objects;
pub mod sse;

#[cfg(feature = "client")]
pub mod client;

/// Header carrying the plaintext admin secret.
pub const ADMIN_AUTH_HEADER: &str = "Trakko-Admin-Authorization";

/// Cookie the admin panel keeps the secret in.
pub const ADMIN_COOKIE: &str = "trakko_admin";
