// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::MonitoringBackend;
use kube::{discovery::Discovery, Client, Resource};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the MonitoringBackend CRD to be served by the apiserver,
/// polling with exponential backoff. The operator must not start its
/// reconciler before the CRD exists, or every namespace reconciliation
/// would fail on the backend lookup.
pub async fn wait_for_backend_crd(client: &Client) -> Result<()> {
    let group = MonitoringBackend::group(&());
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match backend_crd_served(client).await {
            Ok(true) => {
                info!("MonitoringBackend CRD ({}) is available", group);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "MonitoringBackend CRD ({}) not yet available, waiting {} seconds...",
                    group, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for MonitoringBackend CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn backend_crd_served(client: &Client) -> Result<bool> {
    let group = MonitoringBackend::group(&());
    let version = MonitoringBackend::version(&());
    let kind = MonitoringBackend::kind(&());

    let discovery = Discovery::new(client.clone())
        .filter(&[group.as_ref()])
        .run()
        .await?;

    let served = discovery.groups().any(|g| {
        g.name() == group.as_ref()
            && g.recommended_resources()
                .iter()
                .any(|(ar, _)| ar.kind == kind.as_ref() && ar.version == version.as_ref())
    });

    Ok(served)
}
