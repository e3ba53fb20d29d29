//! Worker supervision subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor::run
//!     → bind base_port + i for i in 0..workers (fail-fast at boot)
//!     → spawn one serving task per listener
//!     → loop: worker exits unexpectedly → respawn on the same port
//!             shutdown signal → stop respawning, drain all workers
//! ```
//!
//! # Design Decisions
//! - One worker per CPU core by default; each owns its listener so the
//!   OS distributes connections by port, matching the external load
//!   balancer's view of the fleet
//! - Workers share no admission state; replacements need no handoff
//! - Drain is cooperative: the supervisor never aborts a worker mid-drain

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{AbortHandle, Id, JoinSet};

use crate::config::GatewayConfig;
use crate::http::{GatewayApp, WorkerInfo};
use crate::lifecycle::Shutdown;

/// Delay before a crashed worker is replaced. Keeps a persistent bind
/// failure from spinning the supervisor loop.
const RESTART_BACKOFF: Duration = Duration::from_millis(200);

/// Supervisor-internal record of one worker slot.
#[derive(Clone, Copy, Debug)]
struct WorkerRecord {
    index: usize,
    port: u16,
}

/// Owns the fixed-size pool of serving workers.
pub struct Supervisor {
    config: Arc<GatewayConfig>,
    app: Arc<GatewayApp>,
    shutdown: Shutdown,
    handles: Mutex<HashMap<usize, AbortHandle>>,
}

impl Supervisor {
    pub fn new(config: Arc<GatewayConfig>, app: GatewayApp, shutdown: Shutdown) -> Self {
        Self {
            config,
            app: Arc::new(app),
            shutdown,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Number of workers this pool runs.
    pub fn worker_count(&self) -> usize {
        match self.config.listener.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Forcibly stop one worker's serving task. Unless the pool is
    /// draining, the supervisor replaces it on the same port like any
    /// other crash. Returns `false` when no such worker has been spawned.
    pub fn restart_worker(&self, index: usize) -> bool {
        let handles = match self.handles.lock() {
            Ok(handles) => handles,
            Err(poisoned) => poisoned.into_inner(),
        };
        match handles.get(&index) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Run the pool until shutdown, restarting workers that exit
    /// unexpectedly. Returns once every worker has drained.
    pub async fn run(&self) -> std::io::Result<()> {
        let host = self.config.listener.bind_host.clone();
        let base_port = self.config.listener.base_port;
        let count = self.worker_count();

        let mut pool: JoinSet<std::io::Result<()>> = JoinSet::new();
        let mut records: HashMap<Id, WorkerRecord> = HashMap::new();

        // Bind every port up front so an occupied port is a boot failure,
        // not a silent hole in the fleet.
        for index in 0..count {
            let record = WorkerRecord {
                index,
                port: base_port + index as u16,
            };
            let listener = TcpListener::bind((host.as_str(), record.port)).await?;
            self.spawn_worker(&mut pool, &mut records, record, Some(listener));
        }
        tracing::info!(workers = count, base_port, "Worker pool started");

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut draining = false;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv(), if !draining => {
                    tracing::info!("Shutdown signal received; draining workers");
                    draining = true;
                }
                exited = pool.join_next_with_id() => {
                    let Some(exited) = exited else { break };
                    // An aborted or panicked task surfaces as a JoinError;
                    // its id still maps back to the slot.
                    let (record, result) = match exited {
                        Ok((id, result)) => (records.remove(&id), Some(result)),
                        Err(join_error) => (records.remove(&join_error.id()), None),
                    };
                    let Some(record) = record else {
                        tracing::error!("Worker exit did not match a known slot");
                        continue;
                    };
                    if draining {
                        match result {
                            Some(Ok(())) => tracing::info!(worker = record.index, "Worker drained"),
                            Some(Err(error)) => tracing::warn!(worker = record.index, error = %error, "Worker ended with error during drain"),
                            None => tracing::warn!(worker = record.index, "Worker task cancelled during drain"),
                        }
                    } else {
                        match result {
                            Some(Ok(())) => tracing::error!(worker = record.index, "Worker exited unexpectedly; restarting"),
                            Some(Err(error)) => tracing::error!(worker = record.index, error = %error, "Worker failed; restarting"),
                            None => tracing::error!(worker = record.index, "Worker task aborted; restarting"),
                        }
                        self.spawn_worker(&mut pool, &mut records, record, None);
                    }
                }
            }
            if draining && pool.is_empty() {
                break;
            }
        }

        tracing::info!("Worker pool stopped");
        Ok(())
    }

    fn spawn_worker(
        &self,
        pool: &mut JoinSet<std::io::Result<()>>,
        records: &mut HashMap<Id, WorkerRecord>,
        record: WorkerRecord,
        listener: Option<TcpListener>,
    ) {
        let app = self.app.clone();
        let host = self.config.listener.bind_host.clone();
        let shutdown_rx = self.shutdown.subscribe();
        let restarting = listener.is_none();

        let handle = pool.spawn(async move {
            if restarting {
                tokio::time::sleep(RESTART_BACKOFF).await;
            }
            let listener = match listener {
                Some(listener) => listener,
                None => TcpListener::bind((host.as_str(), record.port)).await?,
            };

            tracing::info!(
                worker = record.index,
                port = record.port,
                pid = std::process::id(),
                "Worker listening"
            );
            let router = app.router(WorkerInfo {
                index: record.index,
                port: record.port,
            });
            GatewayApp::serve(listener, router, shutdown_rx).await
        });
        records.insert(handle.id(), record);

        let mut handles = match self.handles.lock() {
            Ok(handles) => handles,
            Err(poisoned) => poisoned.into_inner(),
        };
        handles.insert(record.index, handle);
    }
}
