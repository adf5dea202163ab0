use serde::{Deserialize, Serialize};

/// Client -> Server handshake frame, the first frame on every reliable
/// connection. Carries the client's public key so the server can seal
/// replies if it ever needs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub public_key_pem: String,
}

/// Server -> Client handshake acknowledgement carrying the server key that
/// credentials are sealed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloAck {
    pub public_key_pem: String,
}

/// Commands clients send after the handshake. Each command is a single
/// frame carrying its full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Sealed `"username,password"`.
    Login { sealed_credentials: Vec<u8> },
    /// Sealed `"display_name,username,password"`.
    Register { sealed_profile: Vec<u8> },
    FetchStories,
    AddStory(Story),
    Logout { username: String },
}

/// Replies the server sends back, exactly one per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerReply {
    LoginResult { ok: bool },
    RegisterResult { ok: bool, message: String },
    Stories(StoryBatch),
    StoryAdded,
    LogoutResult { message: String },
    Error { kind: ErrorKind, message: String },
}

/// Machine-readable classification for `ServerReply::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The frame did not decode to any known command.
    UnknownAction,
    Internal,
}

/// A story pinned to a world position. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub content: String,
    pub username: String,
    pub pos_x: i32,
    pub pos_y: i32,
}

/// Column-major story listing: five parallel same-length vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryBatch {
    pub titles: Vec<String>,
    pub contents: Vec<String>,
    pub usernames: Vec<String>,
    pub pos_x: Vec<i32>,
    pub pos_y: Vec<i32>,
}

impl StoryBatch {
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Collect row-major stories into the parallel-vector reply shape.
    pub fn from_stories(stories: &[Story]) -> Self {
        let mut batch = Self::default();
        for story in stories {
            batch.titles.push(story.title.clone());
            batch.contents.push(story.content.clone());
            batch.usernames.push(story.username.clone());
            batch.pos_x.push(story.pos_x);
            batch.pos_y.push(story.pos_y);
        }
        batch
    }

    /// Rebuild row-major stories from the batch. A ragged batch yields
    /// only the rows every column covers.
    pub fn to_stories(&self) -> Vec<Story> {
        self.titles
            .iter()
            .zip(&self.contents)
            .zip(&self.usernames)
            .zip(self.pos_x.iter().zip(&self.pos_y))
            .map(|(((title, content), username), (pos_x, pos_y))| Story {
                title: title.clone(),
                content: content.clone(),
                username: username.clone(),
                pos_x: *pos_x,
                pos_y: *pos_y,
            })
            .collect()
    }
}

/// Unreliable-channel envelopes. The `action` tag and the field names are
/// the wire contract; anything else fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Datagram {
    SendPlayerData {
        username: String,
        pos_x: f32,
        pos_y: f32,
        /// Sender-side monotone counter; absent means 0, which is never
        /// rejected as stale.
        #[serde(default)]
        seq: u64,
    },
    Logout {
        username: String,
    },
}

/// One roster row in a snapshot reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub username: String,
    pub pos_x: f32,
    pub pos_y: f32,
}

/// Full-roster reply to a position report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub num_players: usize,
    pub players: Vec<PlayerEntry>,
}

/// Datagram logout reply when the player was on the roster.
pub const LOGOUT_OK: &str = "Logout successful, you have been removed from the players list.";
/// Datagram logout reply when no such player exists.
pub const LOGOUT_UNKNOWN: &str = "Player not found, could not log out.";

/// Join credentials the way login seals them.
pub fn join_login(username: &str, password: &str) -> String {
    format!("{username},{password}")
}

/// Split sealed login plaintext at the first comma. Passwords may contain
/// commas; usernames may not.
pub fn split_login(plaintext: &str) -> Option<(&str, &str)> {
    let mut parts = plaintext.splitn(2, ',');
    Some((parts.next()?, parts.next()?))
}

/// Join a registration profile the way register seals it.
pub fn join_register(display_name: &str, username: &str, password: &str) -> String {
    format!("{display_name},{username},{password}")
}

/// Split sealed registration plaintext into display name, username and
/// password.
pub fn split_register(plaintext: &str) -> Option<(&str, &str, &str)> {
    let mut parts = plaintext.splitn(3, ',');
    Some((parts.next()?, parts.next()?, parts.next()?))
}
