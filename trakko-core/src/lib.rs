#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod allocator;
pub mod event_id;
pub mod events;
pub mod export;
pub mod feed;
pub mod store;
