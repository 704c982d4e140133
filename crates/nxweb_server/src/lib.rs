//! HTTP surfaces of NxWeb: the crawl dashboard and the debug-tools bridge.
//! Both are plain `axum` routers so they can be served or tested in-process.

pub mod api;
pub mod bridge;
pub mod error;
pub mod extract;
pub mod pyspider;
pub mod state;
pub mod store;

pub use api::router;
pub use bridge::{router as bridge_router, Bridge, BridgeConfig, BridgeError, ToolKind};
pub use error::{ActionFailure, ApiError, ApiResult};
pub use extract::ApiJson;
pub use pyspider::{PySpiderClient, PySpiderError};
pub use state::AppState;
pub use store::Store;

use log::{error, info};
use nxweb_core::AppConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::net::TcpListener;

#[derive(Debug)]
pub enum ServeError {
    Db(nxweb_core::DbError),
    Io(std::io::Error),
}

impl Display for ServeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "database unavailable: {err}"),
            Self::Io(err) => write!(f, "listener failed: {err}"),
        }
    }
}

impl Error for ServeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<nxweb_core::DbError> for ServeError {
    fn from(value: nxweb_core::DbError) -> Self {
        Self::Db(value)
    }
}

impl From<std::io::Error> for ServeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Serves the dashboard on `host:port` until Ctrl-C.
pub async fn serve_dashboard(config: &AppConfig) -> Result<(), ServeError> {
    let state = AppState::from_config(config)?;
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(
        "event=serve_start module=server status=ok listener=dashboard addr={} pyspider_url={}",
        listener.local_addr()?,
        config.pyspider_url
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("event=serve_stop module=server status=ok listener=dashboard");
    Ok(())
}

/// Serves the debug-tools bridge on `host:debug_tools_port` until Ctrl-C,
/// then stops every tool it launched.
pub async fn serve_debug_tools(config: &AppConfig) -> Result<(), ServeError> {
    let bridge = Bridge::new(BridgeConfig::from_app(config));
    let listener = TcpListener::bind((config.host.as_str(), config.debug_tools_port)).await?;
    info!(
        "event=serve_start module=server status=ok listener=debug_tools addr={} python={}",
        listener.local_addr()?,
        config.python
    );
    axum::serve(listener, bridge_router(bridge.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    bridge.shutdown().await;
    info!("event=serve_stop module=server status=ok listener=debug_tools");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("event=shutdown_signal module=server status=error error={err}");
        std::future::pending::<()>().await;
    }
}
