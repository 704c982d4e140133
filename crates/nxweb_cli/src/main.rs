//! `nxweb` binary: boots config and logging, then runs one listener.
//!
//! # Responsibility
//! - Merge environment config with command-line overrides.
//! - Start the dashboard or the debug-tools bridge on a tokio runtime.

use clap::{Args, Parser, Subcommand};
use log::error;
use nxweb_core::config::{
    ENV_DB_PATH, ENV_DEBUG_TOOLS_PORT, ENV_HOST, ENV_LOG_DIR, ENV_LOG_LEVEL, ENV_PORT,
    ENV_PYSPIDER_URL, ENV_PYTHON,
};
use nxweb_core::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nxweb")]
#[command(about = "PySpider crawl dashboard and debug-tools bridge", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the dashboard API and WebSocket
    Serve,
    /// Serve the debugger, inspector and profiler bridge
    DebugTools,
    /// Print the core version and exit
    Ping,
}

#[derive(Args)]
struct Overrides {
    /// Bind host for both listeners
    #[arg(long, global = true, env = ENV_HOST)]
    host: Option<String>,

    /// Dashboard port
    #[arg(long, global = true, env = ENV_PORT)]
    port: Option<u16>,

    /// Debug-tools bridge port
    #[arg(long, global = true, env = ENV_DEBUG_TOOLS_PORT)]
    debug_tools_port: Option<u16>,

    /// SQLite database file
    #[arg(long, global = true, env = ENV_DB_PATH)]
    db_path: Option<PathBuf>,

    /// PySpider web UI base URL
    #[arg(long, global = true, env = ENV_PYSPIDER_URL)]
    pyspider_url: Option<String>,

    /// Python executable used to launch the debug tools
    #[arg(long, global = true, env = ENV_PYTHON)]
    python: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = ENV_LOG_LEVEL)]
    log_level: Option<String>,

    /// Directory for rolling log files; stderr when unset
    #[arg(long, global = true, env = ENV_LOG_DIR)]
    log_dir: Option<String>,
}

impl Overrides {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(port) = self.debug_tools_port {
            config.debug_tools_port = port;
        }
        if let Some(path) = self.db_path {
            config.db_path = path;
        }
        if let Some(url) = self.pyspider_url {
            config.pyspider_url = url;
        }
        if let Some(python) = self.python {
            config.python = python;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_dir.is_some() {
            config.log_dir = self.log_dir;
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("nxweb: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if matches!(cli.command, Command::Ping) {
        println!("nxweb_core ping={}", nxweb_core::ping());
        println!("nxweb_core version={}", nxweb_core::core_version());
        return Ok(());
    }

    let config = AppConfig::from_env().map_err(|err| err.to_string())?;
    let config = cli
        .overrides
        .apply(config)
        .validate()
        .map_err(|err| err.to_string())?;
    nxweb_core::init_logging(&config.log_level, config.log_dir.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("failed to start runtime: {err}"))?;
    let served = runtime.block_on(async {
        match cli.command {
            Command::Serve => nxweb_server::serve_dashboard(&config).await,
            Command::DebugTools => nxweb_server::serve_debug_tools(&config).await,
            Command::Ping => Ok(()),
        }
    });
    served.map_err(|err| {
        error!("event=serve module=cli status=error error={err}");
        err.to_string()
    })
}
