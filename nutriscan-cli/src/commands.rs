//! CLI subcommand handlers.

use crate::Commands;
use nutriscan_core::NutriscanConfig;
use nutriscan_core::gateway;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config: NutriscanConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => handle_serve(config, host, port).await,
        Commands::FetchModel => handle_fetch_model(config).await,
        Commands::Classify { image, no_echo } => handle_classify(config, &image, no_echo).await,
    }
}

/// Make every relative path in the config relative to `workspace`.
pub(crate) fn anchor_paths(config: &mut NutriscanConfig, workspace: &Path) {
    let anchor = |path: &mut PathBuf| {
        if path.is_relative() {
            *path = workspace.join(&*path);
        }
    };
    anchor(&mut config.model.manifest_path);
    anchor(&mut config.model.model_dir);
    anchor(&mut config.pipeline.nutrition_path);
    anchor(&mut config.logging.log_dir);
}

async fn handle_serve(
    mut config: NutriscanConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let context = nutriscan_core::bootstrap(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Startup failed: {}", e))?;

    gateway::run(Arc::new(context), &config.gateway, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    tracing::info!("Shutdown signal received");
}

async fn handle_fetch_model(config: NutriscanConfig) -> anyhow::Result<()> {
    let path = nutriscan_core::provision_model(&config.model)
        .await
        .map_err(|e| anyhow::anyhow!("Model provisioning failed: {}", e))?;
    println!("Model ready: {}", path.display());
    Ok(())
}

async fn handle_classify(
    mut config: NutriscanConfig,
    image: &Path,
    no_echo: bool,
) -> anyhow::Result<()> {
    if no_echo {
        config.pipeline.echo_image = false;
    }
    let bytes = tokio::fs::read(image)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", image.display(), e))?;

    let context = nutriscan_core::bootstrap(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Startup failed: {}", e))?;

    let response = tokio::task::spawn_blocking(move || context.predict(&bytes)).await??;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
