use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};

use wanderlore_protocol::KeyPair;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::metrics::{start_metrics_reporter, ServerMetrics};
use crate::session::handle_session;
use crate::store::{CredentialStore, StoryStore};
use crate::sync::{RosterHandle, Synchronizer};

/// Capacity of the channel feeding roster commands to the synchronizer.
const ROSTER_COMMAND_BUFFER: usize = 64;

/// The wanderlore server: a reliable TCP endpoint for accounts and
/// stories next to an unreliable UDP endpoint for position sync.
pub struct WanderServer {
    pub(crate) config: ServerConfig,
    pub(crate) keys: KeyPair,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) stories: Arc<dyn StoryStore>,
    pub(crate) metrics: Arc<ServerMetrics>,
}

impl WanderServer {
    pub fn new(
        config: ServerConfig,
        keys: KeyPair,
        credentials: Arc<dyn CredentialStore>,
        stories: Arc<dyn StoryStore>,
    ) -> Self {
        Self {
            config,
            keys,
            credentials,
            stories,
            metrics: Arc::new(ServerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind both endpoints from the config and serve forever.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.tcp_bind).await?;
        let socket = UdpSocket::bind(&self.config.udp_bind).await?;
        tracing::info!(
            "listening on {} (reliable) and {} (sync)",
            listener.local_addr()?,
            socket.local_addr()?
        );
        self.serve(listener, socket).await
    }

    /// Serve on already-bound sockets. Split from [`run`](Self::run) so
    /// tests can bind to ephemeral ports and learn the addresses first.
    pub async fn serve(self, listener: TcpListener, socket: UdpSocket) -> Result<()> {
        let (roster, commands) = RosterHandle::channel(ROSTER_COMMAND_BUFFER);
        let synchronizer = Synchronizer::new(
            socket,
            commands,
            self.config.stale_after,
            self.config.sweep_interval,
            Arc::clone(&self.metrics),
        );
        tokio::spawn(synchronizer.run());

        let server = Arc::new(self);
        tokio::spawn(start_metrics_reporter(Arc::clone(&server.metrics)));

        loop {
            let (stream, peer) = listener.accept().await?;
            server.metrics.sessions_opened.fetch_add(1, Ordering::Relaxed);
            tracing::info!("connection established with {peer}");

            let server = Arc::clone(&server);
            let roster = roster.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_session(server, stream, peer, roster).await {
                    tracing::warn!("session with {peer} failed: {err}");
                }
            });
        }
    }
}
