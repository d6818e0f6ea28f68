use super::dispatch::Master;
use super::handlers::{router, MasterState};
use crate::config::Config;

use anyhow::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Loads the home directory and builds the shared handler state.
pub fn prepare(home_dir: impl Into<PathBuf>, config: &Config) -> Result<Arc<MasterState>> {
    let master = Master::load(home_dir, config)?;
    Ok(MasterState::new(master, config.chunk_size))
}

/// Serves the master API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<MasterState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Master listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Logs registry and queue counters every `interval`.
pub fn spawn_progress_reporter(state: Arc<MasterState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);

        loop {
            interval.tick().await;
            let progress = state.master().progress();
            tracing::info!(
                "Home progress: {}/{} finished, {} queued, {} in flight, {} workers",
                progress.finished,
                progress.total,
                progress.queued,
                progress.in_flight,
                progress.workers
            );
        }
    })
}
