use std::time::Duration;

use nomad_common::{Error, Result};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::router::build_router;
use crate::state::SharedState;

/// How often idle sessions and rate-limiter scopes are purged in the background.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

pub struct GatewayServer {
    state: SharedState,
}

impl GatewayServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Bind `gateway.host:gateway.port` and serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let gateway = &self.state.config.gateway;
        let addr = format!("{}:{}", gateway.host, gateway.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;
        info!("NomadAI gateway listening on http://{addr}");
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let housekeeping = {
            let state = self.state.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let sessions = state.sessions.sweep_expired();
                    let scopes = state.limiter.purge_idle();
                    debug!(sessions, scopes, "housekeeping sweep");
                }
            })
        };

        let app = build_router(self.state);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Transport(format!("server error: {e}")));

        housekeeping.abort();
        info!("gateway stopped");
        result
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}
