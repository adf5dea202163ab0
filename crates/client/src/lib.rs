//! Wanderlore client crate.
//!
//! Wraps both server channels behind one [`Client`]: the reliable TCP
//! channel for accounts, stories and logout, and the lossy UDP sync channel
//! that mirrors the player roster with bounded retries.

pub mod client;
pub mod error;

pub use client::{Client, ClientConfig, RetryPolicy};
pub use error::ClientError;
