//! Debug-tools bridge: launches the Python debugger, inspector and profiler
//! and exposes them over HTTP and WebSocket.
//!
//! # Responsibility
//! - Own one [`ToolProcess`] per [`ToolKind`].
//! - Fan tool events out to every connected WebSocket client.
//!
//! # Invariants
//! - At most one child process per tool.
//! - Every command resolves within [`BridgeConfig::command_timeout`].

mod kind;
mod process;
mod routes;
mod socket;

pub use kind::ToolKind;
pub use process::{Lifecycle, ToolProcess};
pub use routes::router;

use log::warn;
use nxweb_core::AppConfig;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// How tool processes are launched and supervised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Python executable.
    pub program: String,
    /// Arguments placed before `-m <module> --server`.
    pub program_args: Vec<String>,
    pub init_delay: Duration,
    pub command_timeout: Duration,
    /// Time a stopping tool gets to exit before it is killed.
    pub stop_grace: Duration,
}

impl BridgeConfig {
    pub const INIT_DELAY: Duration = Duration::from_secs(1);
    pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
    pub const STOP_GRACE: Duration = Duration::from_secs(1);

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            program_args: Vec::new(),
            init_delay: Self::INIT_DELAY,
            command_timeout: Self::COMMAND_TIMEOUT,
            stop_grace: Self::STOP_GRACE,
        }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self::new(config.python.clone())
    }
}

#[derive(Debug)]
pub enum BridgeError {
    NotRunning(ToolKind),
    Timeout,
    /// The tool exited before answering.
    Exited(ToolKind),
    Spawn {
        kind: ToolKind,
        source: std::io::Error,
    },
    Io(std::io::Error),
    Encode(serde_json::Error),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRunning(kind) => write!(f, "{} not running", kind.label()),
            Self::Timeout => write!(f, "Command timed out"),
            Self::Exited(kind) => write!(f, "{} exited before replying", kind.label()),
            Self::Spawn { kind, source } => {
                write!(f, "failed to start {}: {source}", kind.label())
            }
            Self::Io(err) => write!(f, "tool i/o failed: {err}"),
            Self::Encode(err) => write!(f, "command could not be encoded: {err}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::NotRunning(_) | Self::Timeout | Self::Exited(_) => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Event pushed to WebSocket clients, e.g. `debugger:paused`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolEvent {
    pub event: String,
    pub data: Value,
}

impl ToolEvent {
    pub fn new(kind: ToolKind, name: &str, data: Value) -> Self {
        Self {
            event: format!("{kind}:{name}"),
            data,
        }
    }
}

/// Handle shared by the bridge routes and sockets.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    debugger: ToolProcess,
    inspector: ToolProcess,
    profiler: ToolProcess,
    events: broadcast::Sender<ToolEvent>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let config = Arc::new(config);
        let tool = |kind| ToolProcess::new(kind, Arc::clone(&config), events.clone());
        let (debugger, inspector, profiler) = (
            tool(ToolKind::Debugger),
            tool(ToolKind::Inspector),
            tool(ToolKind::Profiler),
        );
        Self {
            inner: Arc::new(BridgeInner {
                debugger,
                inspector,
                profiler,
                events,
            }),
        }
    }

    pub fn tool(&self, kind: ToolKind) -> &ToolProcess {
        match kind {
            ToolKind::Debugger => &self.inner.debugger,
            ToolKind::Inspector => &self.inner.inspector,
            ToolKind::Profiler => &self.inner.profiler,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToolEvent> {
        self.inner.events.subscribe()
    }

    /// Stops every running tool.
    pub async fn shutdown(&self) {
        for kind in ToolKind::ALL {
            if let Err(err) = self.tool(kind).stop().await {
                warn!("event=bridge_shutdown module=bridge status=error tool={kind} error={err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeError, ToolEvent, ToolKind};
    use serde_json::json;

    #[test]
    fn errors_use_tool_labels() {
        assert_eq!(
            BridgeError::NotRunning(ToolKind::Debugger).to_string(),
            "Debugger not running"
        );
        assert_eq!(BridgeError::Timeout.to_string(), "Command timed out");
    }

    #[test]
    fn event_names_are_prefixed_with_tool() {
        let event = ToolEvent::new(ToolKind::Profiler, "cpu_update", json!({"cpu": 3}));
        assert_eq!(event.event, "profiler:cpu_update");
    }
}
