use std::path::Path;

use anyhow::Context;
use flow_core::parse_duration;
use tokio::sync::watch;
use tracing::info;

pub async fn watch(config: &Path, interval: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let interval = match interval {
        Some(raw) => parse_duration(raw)
            .filter(|d| !d.is_zero())
            .with_context(|| format!("invalid --interval {raw:?}"))?,
        None => config.interval()?,
    };
    let controller = super::controller(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    controller.run(interval, shutdown_rx).await;
    Ok(())
}
