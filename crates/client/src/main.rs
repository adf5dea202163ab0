use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wanderlore_client::{Client, ClientConfig, RetryPolicy};
use wanderlore_protocol::Story;

#[derive(Parser, Debug)]
#[command(name = "wanderlore-client")]
#[command(about = "Wandering client for the wanderlore server", long_about = None)]
struct Args {
    /// Reliable (TCP) server address
    #[arg(long, default_value = "127.0.0.1:65432")]
    server: String,

    /// Unreliable (UDP) sync address
    #[arg(long, default_value = "127.0.0.1:12345")]
    sync: String,

    /// Account username
    #[arg(long, default_value = "wanderer")]
    username: String,

    /// Account password
    #[arg(long, default_value = "wander on")]
    password: String,

    /// Register the account before logging in
    #[arg(long)]
    register: bool,

    /// Display name used when registering
    #[arg(long, default_value = "A Wanderer")]
    display_name: String,

    /// Optional story to pin at the starting position
    #[arg(long)]
    story: Option<String>,

    /// Number of position reports to send
    #[arg(long, default_value = "10")]
    ticks: u32,

    /// Delay between position reports in milliseconds
    #[arg(long, default_value = "500")]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        server_addr: args.server.clone(),
        sync_addr: args.sync.clone(),
        retry: RetryPolicy::default(),
    };

    tracing::info!(
        "connecting to {} (reliable) and {} (sync)",
        args.server,
        args.sync
    );
    let mut client = Client::connect(&config).await?;

    if args.register {
        let (ok, message) = client
            .register(&args.display_name, &args.username, &args.password)
            .await?;
        tracing::info!("registration: {message}");
        if !ok {
            tracing::warn!("continuing with the existing account");
        }
    }

    if !client.login(&args.username, &args.password).await? {
        bail!("login failed for {}", args.username);
    }
    tracing::info!("logged in as {}", args.username);

    if let Some(content) = &args.story {
        let story = Story {
            title: format!("{}'s note", args.username),
            content: content.clone(),
            username: args.username.clone(),
            pos_x: 0,
            pos_y: 0,
        };
        client.add_story(&story).await?;
        tracing::info!("story pinned at the origin");
    }

    let stories = client.fetch_stories().await?;
    tracing::info!("{} stories in the world", stories.len());

    // Walk a small circle, mirroring the roster once per tick.
    for tick in 0..args.ticks {
        let angle = tick as f32 / args.ticks.max(1) as f32 * std::f32::consts::TAU;
        let snapshot = client
            .send_player_data(angle.cos() * 10.0, angle.sin() * 10.0)
            .await?;
        tracing::info!(
            "tick {}/{}: {} players online",
            tick + 1,
            args.ticks,
            snapshot.num_players
        );
        tokio::time::sleep(Duration::from_millis(args.tick_ms)).await;
    }

    if client.announce_logout().await? {
        tracing::info!("removed from the roster");
    } else {
        tracing::warn!("roster removal unconfirmed");
    }
    let message = client.logout().await?;
    tracing::info!("{message}");

    Ok(())
}
