//! Process lifecycle: bind, serve, watch for completion, drain, close.
//!
//! Start order: load checkpoint -> open input/output -> initialize tracker
//! -> bind listener -> accept requests. A background watcher polls
//! `all_work_complete()`; when it turns true the listener stops accepting,
//! in-flight handlers drain, the tracker writes its final checkpoint and
//! the process exits cleanly. SIGINT/SIGTERM and fatal I/O errors take the
//! same drain-and-close path.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use super::config::ServerConfig;
use crate::api::{self, AppState};
use crate::tracker::tracker::DataTracker;

/// How often the background watcher polls for completion.
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct DispatcherServer {
    state: Arc<AppState>,
    listener: TcpListener,
}

impl DispatcherServer {
    /// Initializes the tracker from the checkpoint and binds the listener.
    /// Checkpoint inconsistency and file errors fail here, before any
    /// request is accepted.
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let tracker = DataTracker::open(config.tracker_config())
            .with_context(|| format!("failed to initialize tracker for {}", config.infile.display()))?;
        let state = AppState::new(tracker);

        let addr = SocketAddr::new(config.host, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        Ok(Self { state, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Serves requests until all work is complete, a termination signal
    /// arrives or a fatal I/O error is flagged, then drains in-flight
    /// handlers and closes the tracker.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self { state, listener } = self;
        let app = api::router(state.clone());

        let watcher = tokio::spawn(completion_watcher(state.clone()));

        let shutdown_state = state.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_state))
            .await?;

        watcher.abort();

        {
            let mut tracker = state.tracker();
            tracker
                .close()
                .context("final flush/checkpoint failed")?;
        }

        if state.fatal.load(Ordering::SeqCst) {
            anyhow::bail!("shut down after a fatal I/O error; restart to resume from the last checkpoint");
        }
        Ok(())
    }
}

/// Polls the tracker until every row has been read, completed and written
/// out, then wakes the shutdown path.
async fn completion_watcher(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(COMPLETION_POLL_INTERVAL);
    loop {
        interval.tick().await;
        let done = {
            let tracker = state.tracker();
            tracker.all_work_complete()
        };
        match done {
            Ok(true) => {
                tracing::info!("All work complete. Shutting down server.");
                state.shutdown.notify_one();
                break;
            }
            Ok(false) => {}
            Err(err) => {
                let last = state.tracker().last_processed_work_id();
                state.fail_fatal("completion poll", last, &err);
                break;
            }
        }
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received interrupt; shutting down."),
        _ = terminate => tracing::info!("Received termination signal; shutting down."),
        _ = state.shutdown.notified() => {}
    }
}
