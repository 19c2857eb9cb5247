// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::{info, warn};

use infuser::config::Config;
use infuser::kubernetes::wait_for_backend_crd;
use infuser::reconcilers::NamespaceReconciler;
use infuser::webhook;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting Infuser operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: installer_image={}",
        config.installer_image
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the MonitoringBackend CRD before starting the reconciler
    info!("Waiting for MonitoringBackend CRD to become available...");
    wait_for_backend_crd(&client).await?;

    let reconciler = NamespaceReconciler::new(client.clone());

    info!("Starting namespace reconciler and admission webhook...");

    // Run the reconciler and the webhook server concurrently
    tokio::try_join!(reconciler.run(), webhook::serve(client, config))?;

    // This should never be reached as both components run forever
    warn!("All components stopped unexpectedly");
    Ok(())
}
