//! exposure-daemon's service loop: two independently-ticking background
//! tasks (trigger polling, retention sweep) under one shutdown signal,
//! generalized from the teacher's `gossipd::server::Server::spawn_sync_task`
//! / `spawn_prune_task` pair.

use std::sync::Arc;
use std::time::Duration;

use exposure_engine::{retention, triggers};
use exposure_store::Store;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::Config;
use crate::dispatcher::AnyDispatcher;

pub struct Server {
    config: Config,
    store: Arc<dyn Store>,
    dispatcher: Arc<AnyDispatcher>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let dispatcher = Arc::new(AnyDispatcher::from_config(&config));
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            store,
            dispatcher,
            shutdown_tx,
        }
    }

    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run until a shutdown signal arrives on `shutdown_tx`.
    pub async fn run(&self) {
        info!("starting exposure-daemon");
        let poll_handle = self.spawn_trigger_poll_task();
        let sweep_handle = self.spawn_retention_task();

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("shutdown signal received, stopping background tasks");

        poll_handle.abort();
        sweep_handle.abort();
    }

    fn spawn_trigger_poll_task(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let interval_secs = self.config.poll_interval_secs;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = exposure_core::time::now_ms();
                        let handled = triggers::poll_once(store.as_ref(), dispatcher.as_ref(), now).await;
                        if handled > 0 {
                            debug!(handled, "trigger poll processed pending reports");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    fn spawn_retention_task(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let interval_secs = self.config.retention_interval_secs;
        let retention_days = self.config.retention_days;
        let page_size = self.config.retention_page_size;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = exposure_core::time::now_ms();
                        retention::sweep(store.as_ref(), now, retention_days, page_size);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_store::MemStore;
    use tempfile::tempdir;

    fn test_config() -> Config {
        let dir = tempdir().unwrap();
        Config {
            data_dir: dir.into_path(),
            poll_interval_secs: 1,
            retention_interval_secs: 1,
            retention_days: 180,
            retention_page_size: 500,
            fcm_endpoint: None,
            fcm_token: None,
            log_format: "pretty".into(),
            verbose: false,
        }
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_run_loop() {
        let store: Arc<dyn Store> = MemStore::new();
        let server = Server::new(test_config(), store);
        let shutdown = server.shutdown_handle();

        let run = tokio::spawn(async move { server.run().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = shutdown.send(());

        tokio::time::timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
    }
}
