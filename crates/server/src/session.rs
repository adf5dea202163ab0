use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::time::timeout;

use wanderlore_protocol::{
    messages, read_frame, write_frame, ClientCommand, ErrorKind, Hello, HelloAck, PeerKey,
    ProtocolError, ServerReply, Story,
};

use crate::error::{Result, ServerError};
use crate::server::WanderServer;
use crate::sync::RosterHandle;

/// Per-connection state once the handshake has completed.
pub struct Session {
    pub peer: SocketAddr,
    pub peer_key: PeerKey,
    /// Set by a successful login, cleared never; logout closes the session.
    pub username: Option<String>,
}

/// Drive one reliable connection from handshake to close.
///
/// Command-level failures (bad credentials, undecodable frames, store
/// hiccups) are answered on the wire and keep the session alive; only
/// handshake failures, idle timeouts and dead connections end it.
pub async fn handle_session(
    server: Arc<WanderServer>,
    stream: TcpStream,
    peer: SocketAddr,
    roster: RosterHandle,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = server.config.read_timeout;

    // The client speaks first: its key in, ours out.
    let hello: Hello = read_with_deadline(&mut reader, read_timeout).await?;
    let peer_key = PeerKey::from_pem(&hello.public_key_pem).map_err(ServerError::Handshake)?;
    let ack = HelloAck {
        public_key_pem: server.keys.public_key_pem().map_err(ServerError::Handshake)?,
    };
    write_frame(&mut writer, &ack).await?;

    let mut session = Session {
        peer,
        peer_key,
        username: None,
    };
    tracing::info!("session established with {peer}");

    loop {
        let command: ClientCommand = match read_with_deadline(&mut reader, read_timeout).await {
            Ok(command) => command,
            Err(ServerError::Protocol(ProtocolError::ConnectionClosed)) => {
                tracing::info!("{peer} disconnected");
                return Ok(());
            }
            Err(ServerError::Protocol(ProtocolError::Frame(err))) => {
                // The payload was fully consumed, so the stream is still
                // frame aligned and the session can continue.
                tracing::warn!("undecodable command from {peer}: {err}");
                server.metrics.unknown_commands.fetch_add(1, Ordering::Relaxed);
                let reply = ServerReply::Error {
                    kind: ErrorKind::UnknownAction,
                    message: "unknown or malformed command".to_string(),
                };
                write_frame(&mut writer, &reply).await?;
                continue;
            }
            Err(err) => return Err(err),
        };

        server.metrics.commands_handled.fetch_add(1, Ordering::Relaxed);

        let (reply, done) = dispatch(&server, &mut session, &roster, command).await;
        write_frame(&mut writer, &reply).await?;
        if done {
            tracing::info!("session with {peer} closed by logout");
            return Ok(());
        }
    }
}

async fn dispatch(
    server: &WanderServer,
    session: &mut Session,
    roster: &RosterHandle,
    command: ClientCommand,
) -> (ServerReply, bool) {
    match command {
        ClientCommand::Login { sealed_credentials } => {
            (handle_login(server, session, &sealed_credentials), false)
        }
        ClientCommand::Register { sealed_profile } => {
            (handle_register(server, session, &sealed_profile), false)
        }
        ClientCommand::FetchStories => (handle_fetch_stories(server), false),
        ClientCommand::AddStory(story) => (handle_add_story(server, story), false),
        ClientCommand::Logout { username } => {
            (handle_logout(session, roster, username).await, true)
        }
    }
}

fn handle_login(server: &WanderServer, session: &mut Session, sealed: &[u8]) -> ServerReply {
    let Some(plaintext) = open_text(server, sealed) else {
        tracing::debug!("login from {} with unreadable credentials", session.peer);
        return ServerReply::LoginResult { ok: false };
    };
    let Some((username, password)) = messages::split_login(&plaintext) else {
        tracing::debug!("login from {} with malformed credentials", session.peer);
        return ServerReply::LoginResult { ok: false };
    };

    tracing::info!("login attempt for {username}");
    match server.credentials.check_credentials(username, password) {
        Ok(true) => {
            session.username = Some(username.to_string());
            ServerReply::LoginResult { ok: true }
        }
        Ok(false) => ServerReply::LoginResult { ok: false },
        Err(err) => {
            tracing::error!("credential store failure during login: {err}");
            internal_error("credential store unavailable")
        }
    }
}

fn handle_register(server: &WanderServer, session: &Session, sealed: &[u8]) -> ServerReply {
    let Some(plaintext) = open_text(server, sealed) else {
        tracing::debug!("registration from {} with unreadable profile", session.peer);
        return ServerReply::RegisterResult {
            ok: false,
            message: "Registration failed".to_string(),
        };
    };
    let Some((display_name, username, password)) = messages::split_register(&plaintext) else {
        tracing::debug!("registration from {} with malformed profile", session.peer);
        return ServerReply::RegisterResult {
            ok: false,
            message: "Registration failed".to_string(),
        };
    };

    tracing::info!("registering user {display_name} ({username})");
    match server.credentials.create_user(display_name, username, password) {
        Ok(true) => ServerReply::RegisterResult {
            ok: true,
            message: "Registration successful".to_string(),
        },
        Ok(false) => ServerReply::RegisterResult {
            ok: false,
            message: "Registration failed".to_string(),
        },
        Err(err) => {
            tracing::error!("credential store failure during registration: {err}");
            internal_error("credential store unavailable")
        }
    }
}

fn handle_fetch_stories(server: &WanderServer) -> ServerReply {
    match server.stories.fetch_all() {
        Ok(batch) => ServerReply::Stories(batch),
        Err(err) => {
            tracing::error!("story store failure during fetch: {err}");
            internal_error("story store unavailable")
        }
    }
}

fn handle_add_story(server: &WanderServer, story: Story) -> ServerReply {
    // The whole story arrived in one frame; nothing partial ever lands in
    // the store.
    match server.stories.add_entry(&story) {
        Ok(()) => {
            tracing::info!(
                "story '{}' by {} added at ({}, {})",
                story.title,
                story.username,
                story.pos_x,
                story.pos_y
            );
            ServerReply::StoryAdded
        }
        Err(err) => {
            tracing::error!("story store failure during add: {err}");
            internal_error("story store unavailable")
        }
    }
}

async fn handle_logout(session: &Session, roster: &RosterHandle, username: String) -> ServerReply {
    if let Some(session_user) = &session.username {
        if *session_user != username {
            tracing::warn!("logout for {username} from a session logged in as {session_user}");
        }
    }

    // Both logout paths funnel into the synchronizer, the roster's only
    // writer.
    roster.remove(&username).await;
    tracing::info!("player {username} logged out");
    ServerReply::LogoutResult {
        message: "Logout successful.".to_string(),
    }
}

/// Open a sealed payload into UTF-8. Any failure is an authentication
/// failure for the caller to report, never a session error.
fn open_text(server: &WanderServer, sealed: &[u8]) -> Option<String> {
    let bytes = server.keys.open(sealed).ok()?;
    String::from_utf8(bytes).ok()
}

fn internal_error(message: &str) -> ServerReply {
    ServerReply::Error {
        kind: ErrorKind::Internal,
        message: message.to_string(),
    }
}

async fn read_with_deadline<R, T>(reader: &mut R, deadline: Duration) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match timeout(deadline, read_frame(reader)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServerError::IdleTimeout),
    }
}
