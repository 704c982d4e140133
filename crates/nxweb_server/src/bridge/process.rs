//! One child process per tool, multiplexing JSON-line commands over stdio.
//!
//! # Invariants
//! - A stdout line answers the oldest pending command with the same name.
//! - Lines that answer nothing become events or are only logged.
//! - Commands are never retried or queued behind each other.
//! - Stdin writes hold only the stdin lock and are bounded by the command
//!   timeout, so a tool that stops reading cannot block stop or status.

use super::{BridgeConfig, BridgeError, BridgeResult, ToolEvent, ToolKind};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Outcome of a start or stop request, serialized as `{"status": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Lifecycle {
    AlreadyRunning,
    Started,
    NotRunning,
    Stopped,
}

struct Waiter {
    id: u64,
    command: String,
    reply: oneshot::Sender<Value>,
}

type Pending = Arc<Mutex<Vec<Waiter>>>;

fn lock(pending: &Mutex<Vec<Waiter>>) -> MutexGuard<'_, Vec<Waiter>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

type SharedStdin = Arc<tokio::sync::Mutex<ChildStdin>>;

struct Running {
    stdin: SharedStdin,
    pending: Pending,
    alive: Arc<AtomicBool>,
    kill: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl Running {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub struct ToolProcess {
    kind: ToolKind,
    config: Arc<BridgeConfig>,
    events: broadcast::Sender<ToolEvent>,
    child: tokio::sync::Mutex<Option<Running>>,
    next_waiter: AtomicU64,
}

impl ToolProcess {
    pub fn new(
        kind: ToolKind,
        config: Arc<BridgeConfig>,
        events: broadcast::Sender<ToolEvent>,
    ) -> Self {
        Self {
            kind,
            config,
            events,
            child: tokio::sync::Mutex::new(None),
            next_waiter: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub async fn is_running(&self) -> bool {
        self.child.lock().await.as_ref().is_some_and(Running::is_alive)
    }

    /// Spawns the tool unless it is already running, then waits the init delay.
    pub async fn start(&self) -> BridgeResult<Lifecycle> {
        let kind = self.kind;
        {
            let mut slot = self.child.lock().await;
            if slot.as_ref().is_some_and(Running::is_alive) {
                return Ok(Lifecycle::AlreadyRunning);
            }

            let mut child = Command::new(&self.config.program)
                .args(&self.config.program_args)
                .arg("-m")
                .arg(kind.module())
                .arg("--server")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| BridgeError::Spawn { kind, source })?;
            let pid = child.id().unwrap_or_default();
            let (Some(stdin), Some(stdout), Some(stderr)) =
                (child.stdin.take(), child.stdout.take(), child.stderr.take())
            else {
                return Err(BridgeError::Io(std::io::Error::other("tool stdio not captured")));
            };

            let pending = Pending::default();
            let alive = Arc::new(AtomicBool::new(true));
            let (kill, kill_rx) = oneshot::channel();
            tokio::spawn(read_stdout(
                kind,
                stdout,
                Arc::clone(&pending),
                self.events.clone(),
            ));
            tokio::spawn(read_stderr(kind, stderr, self.events.clone()));
            let monitor = tokio::spawn(watch_exit(
                kind,
                child,
                kill_rx,
                Arc::clone(&alive),
                self.events.clone(),
            ));

            *slot = Some(Running {
                stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
                pending,
                alive,
                kill: Some(kill),
                monitor,
            });
            info!("event=tool_start module=bridge status=ok tool={kind} pid={pid}");
        }

        tokio::time::sleep(self.config.init_delay).await;
        Ok(Lifecycle::Started)
    }

    /// Asks the tool to stop and kills it after the grace period.
    pub async fn stop(&self) -> BridgeResult<Lifecycle> {
        if !self.is_running().await {
            self.child.lock().await.take();
            return Ok(Lifecycle::NotRunning);
        }

        if let Err(err) = self.dispatch("stop", json!({})).await {
            warn!(
                "event=tool_stop module=bridge status=error tool={} error={err}",
                self.kind
            );
        }

        let Some(mut running) = self.child.lock().await.take() else {
            return Ok(Lifecycle::Stopped);
        };
        if tokio::time::timeout(self.config.stop_grace, &mut running.monitor)
            .await
            .is_err()
        {
            if let Some(kill) = running.kill.take() {
                let _ = kill.send(());
            }
            let _ = running.monitor.await;
        }
        info!("event=tool_stop module=bridge status=ok tool={}", self.kind);
        Ok(Lifecycle::Stopped)
    }

    /// Sends `command` and returns the `result` of its reply line.
    pub async fn send_command(&self, command: &str, params: Value) -> BridgeResult<Value> {
        if self.kind.auto_start() && !self.is_running().await {
            self.start().await?;
        }
        self.dispatch(command, params).await
    }

    /// Runs `script` under the debugger from a temporary file.
    pub async fn debug_script(&self, script: &str, globals: Value) -> BridgeResult<Value> {
        let file = tempfile::Builder::new()
            .prefix("debug_script_")
            .suffix(".py")
            .tempfile()?;
        tokio::fs::write(file.path(), script).await?;
        let filename = file.path().to_string_lossy().into_owned();
        let params = json!({ "filename": filename, "globals": globals });
        let result = self.send_command("debug_script", params).await;
        drop(file);
        result
    }

    async fn dispatch(&self, command: &str, params: Value) -> BridgeResult<Value> {
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (reply, receiver) = oneshot::channel();
        let mut line = serde_json::to_string(&json!({ "command": command, "params": params }))?;
        line.push('\n');

        let (pending, stdin) = {
            let slot = self.child.lock().await;
            let Some(running) = slot.as_ref().filter(|running| running.is_alive()) else {
                return Err(BridgeError::NotRunning(self.kind));
            };
            lock(&running.pending).push(Waiter {
                id,
                command: command.to_string(),
                reply,
            });
            (Arc::clone(&running.pending), Arc::clone(&running.stdin))
        };

        let deadline = tokio::time::Instant::now() + self.config.command_timeout;
        let written = tokio::time::timeout_at(deadline, async {
            let mut stdin = stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                lock(&pending).retain(|waiter| waiter.id != id);
                return Err(BridgeError::Io(err));
            }
            Err(_) => {
                lock(&pending).retain(|waiter| waiter.id != id);
                warn!(
                    "event=tool_command module=bridge status=timeout stage=write tool={} command={command}",
                    self.kind
                );
                return Err(BridgeError::Timeout);
            }
        }
        debug!(
            "event=tool_command module=bridge status=sent tool={} command={command}",
            self.kind
        );

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(BridgeError::Exited(self.kind)),
            Err(_) => {
                lock(&pending).retain(|waiter| waiter.id != id);
                warn!(
                    "event=tool_command module=bridge status=timeout tool={} command={command}",
                    self.kind
                );
                Err(BridgeError::Timeout)
            }
        }
    }
}

fn emit(events: &broadcast::Sender<ToolEvent>, kind: ToolKind, name: &str, data: Value) {
    // No subscribers is not an error.
    let _ = events.send(ToolEvent::new(kind, name, data));
}

/// Routes one stdout line to a waiter, the event channel, or the log.
fn route_line(
    kind: ToolKind,
    line: &str,
    pending: &Mutex<Vec<Waiter>>,
    events: &broadcast::Sender<ToolEvent>,
) {
    if line.trim().is_empty() {
        return;
    }
    let Ok(message) = serde_json::from_str::<Value>(line) else {
        if kind.forwards_output() {
            emit(events, kind, "output", json!({ "stdout": line }));
        } else {
            debug!("event=tool_output module=bridge status=raw tool={kind}");
        }
        return;
    };

    if let Some(command) = message.get("command").and_then(Value::as_str) {
        let waiter = {
            let mut waiters = lock(pending);
            waiters.retain(|waiter| !waiter.reply.is_closed());
            waiters
                .iter()
                .position(|waiter| waiter.command == command)
                .map(|index| waiters.remove(index))
        };
        if let Some(waiter) = waiter {
            let result = message.get("result").cloned().unwrap_or(Value::Null);
            let _ = waiter.reply.send(result);
            return;
        }
    }

    match message.get("type").and_then(Value::as_str) {
        Some(event) if kind.event_types().contains(&event) => {
            let data = message.get("data").cloned().unwrap_or(Value::Null);
            emit(events, kind, event, data);
        }
        _ => debug!("event=tool_output module=bridge status=unrouted tool={kind}"),
    }
}

async fn read_stdout(
    kind: ToolKind,
    stdout: ChildStdout,
    pending: Pending,
    events: broadcast::Sender<ToolEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_line(kind, &line, &pending, &events),
            Ok(None) => break,
            Err(err) => {
                warn!("event=tool_stdout module=bridge status=error tool={kind} error={err}");
                break;
            }
        }
    }
    // Dropping the senders fails every waiter still pending.
    lock(&pending).clear();
}

async fn read_stderr(kind: ToolKind, stderr: ChildStderr, events: broadcast::Sender<ToolEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if kind.forwards_output() {
            emit(&events, kind, "error", json!({ "error": line }));
        } else {
            warn!("event=tool_stderr module=bridge status=output tool={kind} line_len={}", line.len());
        }
    }
}

async fn watch_exit(
    kind: ToolKind,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    alive: Arc<AtomicBool>,
    events: broadcast::Sender<ToolEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            if let Err(err) = child.start_kill() {
                warn!("event=tool_kill module=bridge status=error tool={kind} error={err}");
            }
            child.wait().await
        }
    };
    alive.store(false, Ordering::SeqCst);

    let code = status.as_ref().ok().and_then(|status| status.code());
    info!(
        "event=tool_exit module=bridge status=ok tool={kind} code={}",
        code.map_or_else(|| "none".to_string(), |code| code.to_string())
    );
    if kind.forwards_output() {
        emit(&events, kind, "stopped", json!({ "code": code }));
    }
}
