//! Store probe: checks that the configured store accepts cache traffic.
//!
//! Usage: `xc-probe <config.json>`
//!
//! Connects with the cache configuration, pings, then writes, reads and
//! deletes a probe entry with the configured expiry.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xc_cache::CacheConfig;
use xc_client::{Deadline, StoreClient};

const PROBE_KEY: &[u8] = b"xc-probe:health";
const STEP_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path: PathBuf = match std::env::args_os().nth(1) {
        Some(path) => path.into(),
        None => bail!("usage: xc-probe <config.json>"),
    };
    let config = CacheConfig::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    let client = StoreClient::with_config(config.client_config())
        .await
        .with_context(|| format!("connecting to {}", config.redis_address))?;
    info!(
        addr = %config.redis_address,
        pool = client.pool().idle_count(),
        "connected"
    );

    client.ping(step()).await.context("PING")?;
    info!("ping ok");

    client
        .set_with_ttl(step(), PROBE_KEY, b"ok", config.expiry())
        .await
        .context("SET with TTL")?;
    let value = client.get(step(), PROBE_KEY).await.context("GET")?;
    if value.as_deref() != Some(b"ok".as_slice()) {
        bail!("probe value mismatch: {value:?}");
    }
    info!(ttl = config.cache_expiry, "set/get ok");

    let removed = client.delete(step(), PROBE_KEY).await.context("DEL")?;
    info!(removed, "delete ok");

    client.close().await;
    Ok(())
}

fn step() -> Deadline {
    Deadline::after(STEP_TIMEOUT)
}
