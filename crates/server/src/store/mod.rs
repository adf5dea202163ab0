pub mod credentials;
pub mod stories;

pub use credentials::{CredentialStore, JsonCredentialStore, MemoryCredentialStore};
pub use stories::{JsonStoryStore, MemoryStoryStore, StoryStore};

use thiserror::Error;

/// Errors emitted by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
