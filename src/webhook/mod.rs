// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mutating admission webhook that bootstraps the monitoring agent in
//! workload pods.
//!
//! The webhook only decides and patches; the install config secret it
//! wires into the pod is materialized asynchronously by the namespace
//! reconciler and merely has to exist by the time the pod starts.

pub mod mutation;

use std::sync::Arc;

use axum::{routing::post, Router};
use kube::Client;
use tracing::info;

use crate::config::Config;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Kubernetes client for namespace and MonitoringBackend lookups
    pub kube: Client,
    pub config: Config,
}

impl WebhookState {
    pub fn new(kube: Client, config: Config) -> Self {
        Self { kube, config }
    }
}

/// Create the webhook router with all mutation endpoints
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/inject", post(mutation::handle))
        .with_state(state)
}

/// Serve the admission webhook until the process is stopped
pub async fn serve(client: Client, config: Config) -> anyhow::Result<()> {
    let addr = config.webhook_addr;
    let state = Arc::new(WebhookState::new(client, config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Admission webhook listening on {}", addr);

    axum::serve(listener, webhook_router(state)).await?;
    Ok(())
}
