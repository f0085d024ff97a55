//! Subcommand handlers.

use std::path::Path;
use std::sync::Arc;

use gremlin_core::callback::TracingCallback;
use gremlin_core::clients::{HttpFaultClient, JaegerTraceClient};
use gremlin_core::config::{self, ConfigOverrides, GremlinConfig};
use gremlin_core::controller::{Collaborators, ExperimentController, plan};
use gremlin_core::selection::{FixedTargetSelector, TargetSelector, selector_for};
use gremlin_core::sources::{CsvEdgeSource, CsvServiceSource};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::report;
use crate::{Commands, ConfigAction};

pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_file, overrides),
        Commands::Upstream { target, json } => {
            let config = load(workspace, config_file, overrides)?;
            handle_upstream(&config, workspace, target, json).await
        }
        Commands::Run { target, json } => {
            let config = load(workspace, config_file, overrides)?;
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            handle_run(config, workspace, target, json).await
        }
    }
}

fn load(
    workspace: &Path,
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<GremlinConfig> {
    config::load_config(Some(workspace), config_file, overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn selector(config: &GremlinConfig, target: Option<String>) -> Arc<dyn TargetSelector> {
    match target {
        Some(target) => Arc::new(FixedTargetSelector::new(target)),
        None => Arc::from(selector_for(config.experiment.selection)),
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = config::workspace_config_path(workspace);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            let path = config::write_default_config(workspace)
                .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = config::load_config(Some(workspace), config_file, overrides)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

async fn handle_upstream(
    config: &GremlinConfig,
    workspace: &Path,
    target: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let edges = CsvEdgeSource::new(config.data.edges_path(workspace));
    let services = CsvServiceSource::new(config.data.services_path(workspace));
    let selector = selector(config, target);

    let resolved = plan(
        &edges,
        &services,
        selector.as_ref(),
        config.experiment.include_target_when_isolated,
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        print!("{}", report::render_plan(&resolved));
    }
    Ok(())
}

async fn handle_run(
    config: GremlinConfig,
    workspace: &Path,
    target: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let collaborators = Collaborators {
        edges: Arc::new(CsvEdgeSource::new(config.data.edges_path(workspace))),
        services: Arc::new(CsvServiceSource::new(config.data.services_path(workspace))),
        traces: Arc::new(JaegerTraceClient::new(&config.trace)?),
        faults: Arc::new(HttpFaultClient::new(&config.fault)?),
    };

    let token = CancellationToken::new();
    let controller = ExperimentController::new(
        config.experiment.clone(),
        collaborators,
        Arc::new(TracingCallback),
    )
    .with_selector(selector(&config, target))
    .with_cancellation(token.clone());

    info!(
        experiment_id = %controller.id(),
        trace = %config.trace.endpoint,
        fault = %config.fault.endpoint,
        "Experiment configured"
    );
    let listener = tokio::spawn(cancel_on_shutdown(token));
    let outcome = controller.run().await;
    listener.abort();

    match outcome {
        Ok(report) => {
            if json {
                println!("{}", report::report_json(&report)?);
            } else {
                print!("{}", report::render_report(&report));
            }
            Ok(())
        }
        Err(aborted) => {
            if json {
                println!("{}", report::aborted_json(&aborted)?);
            } else {
                print!("{}", report::render_aborted(&aborted));
            }
            Err(aborted.into())
        }
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_shutdown(token: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received interrupt"),
        _ = terminate => info!("Received SIGTERM"),
    }
    warn!("Shutting down; cancelling experiment and removing any active fault");
    token.cancel();
}
