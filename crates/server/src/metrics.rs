use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Server counters, bumped with relaxed atomics from every task.
#[derive(Default)]
pub struct ServerMetrics {
    pub sessions_opened: AtomicU64,
    pub commands_handled: AtomicU64,
    pub unknown_commands: AtomicU64,
    pub datagrams_received: AtomicU64,
    pub datagrams_dropped: AtomicU64,
    pub snapshots_sent: AtomicU64,
    pub roster_size: AtomicU64,
}

impl ServerMetrics {
    /// Print one stats line at info level.
    pub fn print_stats(&self) {
        tracing::info!(
            "Sessions: {} | Commands: {} | Unknown: {} | Datagrams: {} | Dropped: {} | Snapshots: {} | Roster: {}",
            self.sessions_opened.load(Ordering::Relaxed),
            self.commands_handled.load(Ordering::Relaxed),
            self.unknown_commands.load(Ordering::Relaxed),
            self.datagrams_received.load(Ordering::Relaxed),
            self.datagrams_dropped.load(Ordering::Relaxed),
            self.snapshots_sent.load(Ordering::Relaxed),
            self.roster_size.load(Ordering::Relaxed),
        );
    }
}

/// Report server stats every thirty seconds until the task is dropped.
pub async fn start_metrics_reporter(metrics: Arc<ServerMetrics>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        interval.tick().await;
        metrics.print_stats();
    }
}
