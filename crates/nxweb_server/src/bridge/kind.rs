use std::fmt::{Display, Formatter};

/// One of the Python helper tools driven by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Debugger,
    Inspector,
    Profiler,
}

impl ToolKind {
    pub const ALL: [Self; 3] = [Self::Debugger, Self::Inspector, Self::Profiler];

    /// Prefix used for event names and WebSocket requests.
    pub fn name(self) -> &'static str {
        match self {
            Self::Debugger => "debugger",
            Self::Inspector => "inspector",
            Self::Profiler => "profiler",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == value)
    }

    /// Python module launched with `-m`.
    pub fn module(self) -> &'static str {
        match self {
            Self::Debugger => "pyspider.debugger.interactive_debugger",
            Self::Inspector => "pyspider.debugger.request_inspector",
            Self::Profiler => "pyspider.debugger.performance_profiler",
        }
    }

    /// `type` values of tool output lines that are broadcast as events.
    pub fn event_types(self) -> &'static [&'static str] {
        match self {
            Self::Debugger => &["paused", "resumed", "stopped", "error", "output"],
            Self::Inspector => &["request_received", "response_received", "websocket_message"],
            Self::Profiler => &["cpu_update", "memory_update", "resources_update", "network_update"],
        }
    }

    /// Commands sent while stopped start the tool first.
    pub fn auto_start(self) -> bool {
        !matches!(self, Self::Debugger)
    }

    /// Raw output, stderr and exit are forwarded as events.
    pub fn forwards_output(self) -> bool {
        matches!(self, Self::Debugger)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Debugger => "Debugger",
            Self::Inspector => "Inspector",
            Self::Profiler => "Profiler",
        }
    }
}

impl Display for ToolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
