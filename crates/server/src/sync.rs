use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use wanderlore_protocol::{decode_datagram, messages, Datagram, RosterSnapshot, MAX_DATAGRAM_LEN};

use crate::metrics::ServerMetrics;
use crate::roster::{Roster, Upsert};

/// Roster mutations arriving from outside the synchronizer task.
#[derive(Debug)]
pub enum RosterCommand {
    /// Remove a player, sent by the reliable-channel logout path.
    Remove { username: String },
}

/// Cloneable sender half that session tasks use to reach the roster.
#[derive(Clone)]
pub struct RosterHandle {
    tx: mpsc::Sender<RosterCommand>,
}

impl RosterHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RosterCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Ask the synchronizer to drop `username` from the roster.
    pub async fn remove(&self, username: &str) {
        let command = RosterCommand::Remove {
            username: username.to_string(),
        };
        if self.tx.send(command).await.is_err() {
            tracing::warn!("synchronizer is gone, dropping roster removal for {username}");
        }
    }
}

/// The single owner of the roster: one task holding the UDP socket, the
/// roster and the command receiver, looping over datagrams, commands and
/// the staleness sweep.
pub struct Synchronizer {
    socket: UdpSocket,
    roster: Roster,
    commands: mpsc::Receiver<RosterCommand>,
    stale_after: Duration,
    sweep_interval: Duration,
    metrics: Arc<ServerMetrics>,
}

impl Synchronizer {
    pub fn new(
        socket: UdpSocket,
        commands: mpsc::Receiver<RosterCommand>,
        stale_after: Duration,
        sweep_interval: Duration,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            socket,
            roster: Roster::new(),
            commands,
            stale_after,
            sweep_interval,
            metrics,
        }
    }

    /// Run until the command channel closes. Malformed traffic is dropped,
    /// never fatal.
    pub async fn run(mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                        Err(err) => tracing::warn!("sync receive error: {err}"),
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }

        tracing::info!("synchronizer stopped");
    }

    async fn handle_datagram(&mut self, bytes: &[u8], peer: SocketAddr) {
        self.metrics.datagrams_received.fetch_add(1, Ordering::Relaxed);

        let datagram = match decode_datagram(bytes) {
            Ok(datagram) => datagram,
            Err(err) => {
                self.metrics.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("dropping undecodable datagram from {peer}: {err}");
                return;
            }
        };

        match datagram {
            Datagram::SendPlayerData {
                username,
                pos_x,
                pos_y,
                seq,
            } => {
                match self
                    .roster
                    .upsert(&username, pos_x, pos_y, seq, Instant::now())
                {
                    Upsert::Inserted => tracing::info!("player {username} joined the roster"),
                    Upsert::Updated => {
                        tracing::trace!("player {username} moved to ({pos_x}, {pos_y})")
                    }
                    Upsert::Stale => {
                        tracing::debug!("stale position report from {username} (seq {seq})")
                    }
                }
                self.update_roster_gauge();

                // The snapshot goes only to the reporting client; everyone
                // else sees it on their next report.
                let snapshot = self.roster.snapshot();
                self.send_snapshot(&snapshot, peer).await;
            }
            Datagram::Logout { username } => {
                let removed = self.roster.remove(&username);
                self.update_roster_gauge();

                let reply = if removed {
                    tracing::info!("player {username} logged out via the sync channel");
                    messages::LOGOUT_OK
                } else {
                    tracing::debug!("sync logout for unknown player {username}");
                    messages::LOGOUT_UNKNOWN
                };
                if let Err(err) = self.socket.send_to(reply.as_bytes(), peer).await {
                    tracing::warn!("failed to send logout reply to {peer}: {err}");
                }
            }
        }
    }

    fn handle_command(&mut self, command: RosterCommand) {
        match command {
            RosterCommand::Remove { username } => {
                if self.roster.remove(&username) {
                    tracing::info!("player {username} removed from the roster on logout");
                }
                self.update_roster_gauge();
            }
        }
    }

    fn sweep(&mut self, now: Instant) {
        let evicted = self.roster.evict_stale(self.stale_after, now);
        if !evicted.is_empty() {
            self.update_roster_gauge();
            for username in evicted {
                tracing::info!("evicted stale player {username}");
            }
        }
    }

    async fn send_snapshot(&self, snapshot: &RosterSnapshot, peer: SocketAddr) {
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!("failed to encode roster snapshot: {err}");
                return;
            }
        };

        match self.socket.send_to(&bytes, peer).await {
            Ok(_) => {
                self.metrics.snapshots_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::warn!("failed to send snapshot to {peer}: {err}"),
        }
    }

    fn update_roster_gauge(&self) {
        self.metrics
            .roster_size
            .store(self.roster.len() as u64, Ordering::Relaxed);
    }
}
