use std::{env, path::PathBuf, time::Duration};

/// Configuration for the wanderlore server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the reliable (TCP) listener binds to.
    pub tcp_bind: String,
    /// Address the unreliable (UDP) sync socket binds to.
    pub udp_bind: String,
    /// Directory holding the credential and story files.
    pub data_dir: PathBuf,
    /// How long a session may sit idle before the server closes it.
    pub read_timeout: Duration,
    /// Roster entries silent for longer than this are evicted.
    pub stale_after: Duration,
    /// Interval between staleness sweeps.
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Builds a configuration from environment variables while falling back
    /// to the default deployment values.
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = env::var("WANDERLORE_DATA").unwrap_or_else(|_| "data".to_string());
        let tcp_bind = env::var("WANDERLORE_TCP_BIND").unwrap_or_else(|_| "0.0.0.0:65432".into());
        let udp_bind = env::var("WANDERLORE_UDP_BIND").unwrap_or_else(|_| "0.0.0.0:12345".into());

        let read_timeout = read_secs("WANDERLORE_READ_TIMEOUT_SECS", 300);
        let stale_after = read_secs("WANDERLORE_STALE_AFTER_SECS", 300);
        let sweep_interval = read_secs("WANDERLORE_SWEEP_INTERVAL_SECS", 30);

        anyhow::ensure!(
            sweep_interval <= stale_after,
            "sweep interval must not exceed the staleness bound"
        );

        Ok(Self {
            tcp_bind,
            udp_bind,
            data_dir: PathBuf::from(data_dir),
            read_timeout,
            stale_after,
            sweep_interval,
        })
    }

    /// Path of the credential file inside the data directory.
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    /// Path of the story file inside the data directory.
    pub fn stories_path(&self) -> PathBuf {
        self.data_dir.join("stories.json")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_bind: "0.0.0.0:65432".to_string(),
            udp_bind: "0.0.0.0:12345".to_string(),
            data_dir: PathBuf::from("data"),
            read_timeout: Duration::from_secs(300),
            stale_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

fn read_secs(var: &str, default: u64) -> Duration {
    let secs = env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
