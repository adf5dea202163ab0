//! Wanderlore server crate.
//!
//! The server speaks two channels: a reliable TCP command channel for
//! authentication, stories and logout, and an unreliable UDP sync channel
//! that keeps the shared player roster fresh. The modules here cover
//! configuration, the per-connection command dispatcher, the roster and the
//! synchronizer task that solely owns it, the credential and story stores,
//! and metrics.

pub mod config;
pub mod error;
pub mod metrics;
pub mod roster;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;

pub use config::ServerConfig;
pub use error::ServerError;
pub use metrics::ServerMetrics;
pub use roster::{PlayerRecord, Roster, Upsert};
pub use server::WanderServer;
pub use store::{
    CredentialStore, JsonCredentialStore, JsonStoryStore, MemoryCredentialStore, MemoryStoryStore,
    StoreError, StoryStore,
};
pub use sync::{RosterCommand, RosterHandle, Synchronizer};
