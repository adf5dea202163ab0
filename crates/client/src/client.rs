use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use wanderlore_protocol::{
    encode_datagram, messages, read_frame, write_frame, ClientCommand, Datagram, Hello, HelloAck,
    KeyPair, PeerKey, RosterSnapshot, ServerReply, Story, StoryBatch, MAX_DATAGRAM_LEN,
};

use crate::error::{ClientError, Result};

/// Where the client connects.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reliable (TCP) endpoint.
    pub server_addr: String,
    /// Unreliable (UDP) sync endpoint.
    pub sync_addr: String,
    pub retry: RetryPolicy,
}

/// Bounded-retry policy for the unreliable channel.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per exchange before giving up.
    pub attempts: u32,
    /// How long to wait for each reply.
    pub reply_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            reply_timeout: Duration::from_secs(2),
        }
    }
}

/// A connected client holding both channels and a mirror of its own
/// session state: who is logged in and the position report counter.
pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    server_key: PeerKey,
    sync: UdpSocket,
    retry: RetryPolicy,
    username: Option<String>,
    seq: u64,
}

impl Client {
    /// Connect both channels and run the key handshake on the reliable one.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.server_addr).await?;
        let (mut reader, mut writer) = stream.into_split();

        // The client speaks first: our key out, the server's key back.
        let keys = KeyPair::generate()?;
        let hello = Hello {
            public_key_pem: keys.public_key_pem()?,
        };
        write_frame(&mut writer, &hello).await?;
        let ack: HelloAck = read_frame(&mut reader).await?;
        let server_key = PeerKey::from_pem(&ack.public_key_pem)?;

        let sync = UdpSocket::bind("0.0.0.0:0").await?;
        sync.connect(&config.sync_addr).await?;

        // Seed the report counter from the wall clock so a restarted
        // session outranks any roster record its previous run left behind.
        let seq = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|epoch| epoch.as_millis() as u64)
            .unwrap_or(0);

        Ok(Self {
            reader,
            writer,
            server_key,
            sync,
            retry: config.retry.clone(),
            username: None,
            seq,
        })
    }

    /// Username of the logged-in player, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Log in with sealed credentials. True when the server accepted them.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        let sealed = self
            .server_key
            .seal(messages::join_login(username, password).as_bytes())?;
        let reply = self
            .round_trip(&ClientCommand::Login {
                sealed_credentials: sealed,
            })
            .await?;
        match reply {
            ServerReply::LoginResult { ok } => {
                if ok {
                    self.username = Some(username.to_string());
                }
                Ok(ok)
            }
            _ => Err(ClientError::UnexpectedReply("login")),
        }
    }

    /// Register an account. Returns the server's verdict and message.
    pub async fn register(
        &mut self,
        display_name: &str,
        username: &str,
        password: &str,
    ) -> Result<(bool, String)> {
        let sealed = self
            .server_key
            .seal(messages::join_register(display_name, username, password).as_bytes())?;
        let reply = self
            .round_trip(&ClientCommand::Register {
                sealed_profile: sealed,
            })
            .await?;
        match reply {
            ServerReply::RegisterResult { ok, message } => Ok((ok, message)),
            _ => Err(ClientError::UnexpectedReply("register")),
        }
    }

    pub async fn fetch_stories(&mut self) -> Result<StoryBatch> {
        let reply = self.round_trip(&ClientCommand::FetchStories).await?;
        match reply {
            ServerReply::Stories(batch) => Ok(batch),
            _ => Err(ClientError::UnexpectedReply("fetch_stories")),
        }
    }

    pub async fn add_story(&mut self, story: &Story) -> Result<()> {
        let reply = self
            .round_trip(&ClientCommand::AddStory(story.clone()))
            .await?;
        match reply {
            ServerReply::StoryAdded => Ok(()),
            _ => Err(ClientError::UnexpectedReply("add_story")),
        }
    }

    /// Log out on the reliable channel. Consumes the client; the server
    /// closes the session after confirming.
    pub async fn logout(mut self) -> Result<String> {
        let username = self.username.take().ok_or(ClientError::NotLoggedIn)?;
        let reply = self.round_trip(&ClientCommand::Logout { username }).await?;
        match reply {
            ServerReply::LogoutResult { message } => Ok(message),
            _ => Err(ClientError::UnexpectedReply("logout")),
        }
    }

    /// Report our position and mirror back the server's roster.
    ///
    /// The sync channel is lossy, so the exchange gets a bounded number of
    /// attempts, and a socket error spends one the same way silence does.
    /// When all of them miss, the mirror degrades to an empty roster
    /// instead of failing the caller.
    pub async fn send_player_data(&mut self, x: f32, y: f32) -> Result<RosterSnapshot> {
        let username = self.username.clone().ok_or(ClientError::NotLoggedIn)?;
        self.seq += 1;
        let datagram = Datagram::SendPlayerData {
            username,
            pos_x: x,
            pos_y: y,
            seq: self.seq,
        };
        let bytes = encode_datagram(&datagram)?;

        let attempts = self.retry.attempts;
        for attempt in 1..=attempts {
            match self.exchange(&bytes).await {
                Ok(Some(reply)) => match serde_json::from_slice(&reply) {
                    Ok(snapshot) => return Ok(snapshot),
                    Err(err) => {
                        tracing::warn!("undecodable snapshot (attempt {attempt}/{attempts}): {err}")
                    }
                },
                Ok(None) => tracing::warn!("no snapshot reply (attempt {attempt}/{attempts})"),
                Err(err) => {
                    tracing::warn!("sync socket error (attempt {attempt}/{attempts}): {err}")
                }
            }
        }

        tracing::warn!("sync exchange failed {attempts} times, mirroring an empty roster");
        Ok(RosterSnapshot::default())
    }

    /// Tell the synchronizer we are leaving. True when the server confirmed
    /// the removal, false when it never answered or we were not on the
    /// roster to begin with.
    pub async fn announce_logout(&mut self) -> Result<bool> {
        let username = self.username.clone().ok_or(ClientError::NotLoggedIn)?;
        let datagram = Datagram::Logout { username };
        let bytes = encode_datagram(&datagram)?;

        let attempts = self.retry.attempts;
        for attempt in 1..=attempts {
            match self.exchange(&bytes).await {
                Ok(Some(reply)) => {
                    let text = String::from_utf8_lossy(&reply);
                    return Ok(text == messages::LOGOUT_OK);
                }
                Ok(None) => tracing::warn!("no logout reply (attempt {attempt}/{attempts})"),
                Err(err) => {
                    tracing::warn!("sync socket error (attempt {attempt}/{attempts}): {err}")
                }
            }
        }

        tracing::warn!("sync logout went unanswered {attempts} times");
        Ok(false)
    }

    async fn round_trip(&mut self, command: &ClientCommand) -> Result<ServerReply> {
        write_frame(&mut self.writer, command).await?;
        let reply: ServerReply = read_frame(&mut self.reader).await?;
        if let ServerReply::Error { kind, message } = reply {
            return Err(ClientError::Server(format!("{kind:?}: {message}")));
        }
        Ok(reply)
    }

    /// One send plus one bounded read on the sync socket. `None` on
    /// timeout, `Err` on a socket failure such as the ECONNREFUSED an
    /// unreachable peer bounces back on a connected UDP socket.
    async fn exchange(&self, bytes: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
        self.sync.send(bytes).await?;
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match timeout(self.retry.reply_timeout, self.sync.recv(&mut buf)).await {
            Ok(Ok(len)) => Ok(Some(buf[..len].to_vec())),
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(None),
        }
    }
}
