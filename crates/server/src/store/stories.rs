use std::path::PathBuf;
use std::{fs, io};

use parking_lot::RwLock;
use wanderlore_protocol::{Story, StoryBatch};

use super::StoreError;

/// Persists the story collection.
pub trait StoryStore: Send + Sync + 'static {
    /// Append one story.
    fn add_entry(&self, story: &Story) -> Result<(), StoreError>;

    /// The whole collection, oldest first. Empty when nothing is stored.
    fn fetch_all(&self) -> Result<StoryBatch, StoreError>;
}

/// Story store persisted as a JSON array.
pub struct JsonStoryStore {
    path: PathBuf,
    stories: RwLock<Vec<Story>>,
}

impl JsonStoryStore {
    /// Open the store, loading any existing stories. A missing file is an
    /// empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let stories = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        Ok(Self {
            path,
            stories: RwLock::new(stories),
        })
    }

    fn persist(&self, stories: &[Story]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(stories)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

impl StoryStore for JsonStoryStore {
    fn add_entry(&self, story: &Story) -> Result<(), StoreError> {
        let mut stories = self.stories.write();
        stories.push(story.clone());
        self.persist(&stories)
    }

    fn fetch_all(&self) -> Result<StoryBatch, StoreError> {
        Ok(StoryBatch::from_stories(&self.stories.read()))
    }
}

/// In-memory story store, used by tests.
#[derive(Default)]
pub struct MemoryStoryStore {
    stories: RwLock<Vec<Story>>,
}

impl MemoryStoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoryStore for MemoryStoryStore {
    fn add_entry(&self, story: &Story) -> Result<(), StoreError> {
        self.stories.write().push(story.clone());
        Ok(())
    }

    fn fetch_all(&self) -> Result<StoryBatch, StoreError> {
        Ok(StoryBatch::from_stories(&self.stories.read()))
    }
}
