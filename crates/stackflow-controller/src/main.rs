//! Environment controller entry point
//!
//! `handle` reads one lifecycle request document (from a file or stdin),
//! applies it to the file backed environment state under `--state-root` and
//! writes the response document to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stackflow_controller::{EnvController, EnvironmentStore, FileStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow-env-controller")]
#[command(about = "Environment controller for StackFlow workload stacks", long_about = None)]
struct Cli {
    /// Directory holding `.stackflow/environments.json`
    #[arg(long, env = "STACKFLOW_STATE_ROOT", default_value = ".", global = true)]
    state_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a lifecycle request and print the response
    Handle {
        /// Request document, stdin when omitted
        request: Option<PathBuf>,
    },
    /// Register an environment stack and its outputs
    Register {
        env_stack: String,
        /// Stack output as KEY=VALUE
        #[arg(long = "output", value_parser = parse_output)]
        outputs: Vec<(String, String)>,
    },
    /// Print the environment stack parameters as JSON
    Params { env_stack: String },
}

fn parse_output(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{value}'")),
    }
}

async fn read_request(path: Option<PathBuf>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut body = String::new();
            tokio::io::stdin()
                .read_to_string(&mut body)
                .await
                .context("Failed to read request from stdin")?;
            Ok(body)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let store = FileStore::new(&cli.state_root);

    match cli.command {
        Command::Handle { request } => {
            let body = read_request(request).await?;
            let controller = EnvController::new(store);
            println!("{}", controller.handle_json(&body).await?);
        }
        Command::Register { env_stack, outputs } => {
            let outputs: BTreeMap<_, _> = outputs.into_iter().collect();
            store.register_environment(&env_stack, outputs).await?;
            tracing::info!(env_stack = %env_stack, "Registered environment");
        }
        Command::Params { env_stack } => {
            let values = store.parameter_values(&env_stack).await?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }
    Ok(())
}
