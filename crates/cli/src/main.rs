// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! The `sapporo` binary.
//!
//! With no subcommand it starts the WES server. The `outputs` and
//! `ro-crate` subcommands are the post-run helpers the dispatcher
//! invokes inside a run directory after the engine finishes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bridge;

use clap::{Args, Parser, Subcommand};
use sapporo_server::ServerConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sapporo",
    version,
    about = "GA4GH Workflow Execution Service backed by the local filesystem"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the outputs.json manifest for a finished run directory.
    Outputs {
        /// Path to the run directory.
        run_dir: PathBuf,
    },
    /// Generate ro-crate-metadata.json for a finished run directory.
    RoCrate {
        /// Path to the run directory.
        run_dir: PathBuf,
    },
}

/// Server flags. Priority: CLI > environment > default.
#[derive(Debug, Args)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "SAPPORO_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "SAPPORO_PORT", default_value_t = 1122)]
    port: u16,

    /// Debug mode: verbose logs, relaxed secret checks.
    #[arg(long, env = "SAPPORO_DEBUG")]
    debug: bool,

    /// Root directory holding all run directories.
    #[arg(long, env = "SAPPORO_RUN_DIR", default_value = "./runs")]
    run_dir: PathBuf,

    /// Dispatcher executable, invoked as `run.sh <run_dir>`.
    #[arg(long, env = "SAPPORO_RUN_SH", default_value = "./run.sh")]
    run_sh: PathBuf,

    /// service-info JSON document (built-in default when omitted).
    #[arg(long, env = "SAPPORO_SERVICE_INFO")]
    service_info: Option<PathBuf>,

    /// Executable-workflow whitelist JSON file.
    #[arg(long, env = "SAPPORO_EXECUTABLE_WORKFLOWS")]
    executable_workflows: Option<PathBuf>,

    /// Auth configuration JSON file (auth disabled when omitted).
    #[arg(long, env = "SAPPORO_AUTH_CONFIG")]
    auth_config: Option<PathBuf>,

    /// Prefix to nest the whole API under (e.g. /ga4gh/wes/v1).
    #[arg(long, env = "SAPPORO_URL_PREFIX")]
    url_prefix: Option<String>,

    /// External base URL for links in responses.
    #[arg(long, env = "SAPPORO_BASE_URL")]
    base_url: Option<String>,

    /// Access-Control-Allow-Origin value.
    #[arg(long, env = "SAPPORO_ALLOW_ORIGIN", default_value = "*")]
    allow_origin: String,

    /// Remove run directories whose start_time is older than this many days.
    #[arg(long, env = "SAPPORO_RUN_REMOVE_OLDER_THAN_DAYS")]
    run_remove_older_than_days: Option<u64>,

    /// Minutes between snapshot index rebuilds.
    #[arg(long, env = "SAPPORO_SNAPSHOT_INTERVAL", default_value_t = 30)]
    snapshot_interval: u64,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            debug: self.debug,
            run_dir: self.run_dir,
            run_sh: self.run_sh,
            service_info_path: self.service_info,
            executable_workflows_path: self.executable_workflows,
            auth_config_path: self.auth_config,
            url_prefix: self.url_prefix,
            base_url: self.base_url,
            allow_origin: self.allow_origin,
            run_remove_older_than_days: self.run_remove_older_than_days,
            snapshot_interval_min: self.snapshot_interval,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.serve.debug);

    match cli.command {
        Some(Command::Outputs { run_dir }) => bridge::write_outputs_manifest(&run_dir),
        Some(Command::RoCrate { run_dir }) => bridge::write_ro_crate(&run_dir),
        None => {
            sapporo_server::serve(cli.serve.into_config()).await?;
            Ok(())
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
