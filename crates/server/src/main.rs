use std::fs;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wanderlore_protocol::KeyPair;
use wanderlore_server::{JsonCredentialStore, JsonStoryStore, ServerConfig, WanderServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    fs::create_dir_all(&config.data_dir)?;

    let credentials = Arc::new(JsonCredentialStore::open(config.credentials_path())?);
    let stories = Arc::new(JsonStoryStore::open(config.stories_path())?);

    tracing::info!("generating session keys");
    let keys = KeyPair::generate()?;

    let server = WanderServer::new(config, keys, credentials, stories);
    server.run().await?;

    Ok(())
}
