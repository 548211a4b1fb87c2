use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::dashboard::{self, ApiState};
use crate::error::Result;
use crate::scheduler::{Queue, ResourcePool, Scheduler};
use crate::store;
use crate::worker::{SimulatedExecutor, TestExecutor};

/// Wires the store, queue, pool, scheduler, and HTTP surface together.
pub struct Server {
    config: OrchestratorConfig,
}

impl Server {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Run startup recovery, spawn the scheduler loop, and serve the API.
    ///
    /// Blocks until SIGTERM/SIGINT, then drains: the HTTP server stops
    /// accepting and the scheduler finishes its current tick.
    pub async fn run(self) -> Result<()> {
        let store = store::connect(&self.config.store_url).await?;
        let queue = Queue::new(
            store.clone(),
            self.config.default_priority,
            self.config.default_target,
            self.config.max_retries,
        );
        let pool = Arc::new(RwLock::new(ResourcePool::from_spec(&self.config.pool_spec)));
        let executor: Arc<dyn TestExecutor> = Arc::new(SimulatedExecutor::default());

        let scheduler = Arc::new(Scheduler::new(
            store,
            queue.clone(),
            pool.clone(),
            executor,
            Duration::from_millis(self.config.tick_interval_ms),
        ));

        // In-flight work from a previous process must become re-eligible
        // before the first tick.
        scheduler.recover().await?;

        let shutdown = signal_token();
        let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

        let result = dashboard::serve(
            self.config.listen_addr,
            ApiState { queue, pool },
            shutdown.clone(),
        )
        .await;

        shutdown.cancel();
        let _ = scheduler_handle.await;
        result
    }
}

/// Token cancelled on SIGTERM or SIGINT.
fn signal_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();

    tokio::spawn(async move {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
        handle.cancel();
    });

    token
}
