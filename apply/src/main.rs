use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};
use vsphere_apply::{AppUpdate, ApplyError, PlanInput, apply, resources_from_input, writeln_update};
use vsphere_client::memory::MemoryClient;
use vsphere_resource::Environment;
use vsphere_version::VSphereVersion;

#[derive(Parser, Debug)]
#[command(
    name = "vsphere-plan",
    about = "Reconcile vSphere resources against an in-memory inventory.",
    version
)]
struct Cli {
    /// Path to the JSON plan file.
    #[arg(long = "input", value_name = "PATH")]
    input: PathBuf,

    /// Endpoint version to gate fields by (e.g. 8.0.2), overriding the plan file.
    #[arg(long = "endpoint-version", value_name = "VERSION", env = "VSPHERE_VERSION")]
    endpoint_version: Option<VSphereVersion>,

    /// Seconds to wait for each remote task before giving up.
    #[arg(long = "task-timeout", value_name = "SECONDS", default_value_t = 300)]
    task_timeout: u64,

    /// Log level (e.g., trace, debug, info, warn, error). Default: info.
    #[arg(long = "log", value_name = "LEVEL", default_value = "info")]
    log: String,
}

#[derive(Error, Debug)]
enum AppError {
    #[error("failed to read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON plan parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no endpoint version: set \"version\" in the plan or pass --endpoint-version")]
    MissingVersion,

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    install_tracing(&cli.log);
    debug!(cli = ?cli, "parsed cli");

    if let Err(err) = run(cli).await {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let text = tokio::fs::read_to_string(&cli.input)
        .await
        .map_err(|source| AppError::ReadInput {
            path: cli.input.clone(),
            source,
        })?;
    let plan: PlanInput = serde_json::from_str(&text)?;
    info!(input = %cli.input.display(), resources = plan.resources.len(), "using plan");

    let version = cli
        .endpoint_version
        .or(plan.version)
        .ok_or(AppError::MissingVersion)?;
    let env = Environment::new(version).with_task_timeout(Duration::from_secs(cli.task_timeout));

    let resources = resources_from_input(plan.resources)?;
    let client = MemoryClient::new(plan.inventory);

    let mut stdout = tokio::io::stdout();
    apply(&client, &env, resources, &mut stdout).await?;
    writeln_update(
        &mut stdout,
        &AppUpdate::Inventory {
            inventory: client.inventory(),
        },
    )
    .await?;
    Ok(())
}

fn install_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}
