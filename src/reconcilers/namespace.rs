// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace reconciler - keeps the per-namespace install config secret in
//! sync with the MonitoringBackend a namespace is labeled for.
//!
//! Credentials, proxy and trust bundle are referenced indirectly, so their
//! changes produce no watch event here. Every managed namespace is
//! therefore requeued on a fixed interval and the secret is re-rendered
//! and compared on each pass.

use crate::constants::{config_secret, labels, resync, OPERATOR_NAME};
use crate::error::{InfuserError, Result};
use crate::kubernetes::{resolve_proxy, resolve_tokens, resolve_trusted_ca};
use crate::script::render_artifacts;
use crate::types::MonitoringBackend;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::ByteString;
use kube::{
    api::{ObjectMeta, Patch, PatchParams},
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct NamespaceReconciler {
    client: Client,
}

impl NamespaceReconciler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(namespaces, WatcherConfig::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled namespace: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// The MonitoringBackend name a namespace is labeled for, if any.
/// An absent label or an empty value means the namespace is not managed.
pub fn managing_backend(namespace: &Namespace) -> Option<&str> {
    namespace
        .metadata
        .labels
        .as_ref()?
        .get(labels::BACKEND)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

async fn reconcile(namespace: Arc<Namespace>, ctx: Arc<NamespaceReconciler>) -> Result<Action> {
    let name = namespace.name_any();

    let Some(backend_name) = managing_backend(&namespace) else {
        debug!("Namespace {} is not managed, skipping", name);
        return Ok(Action::await_change());
    };

    debug!("Reconciling namespace {} for backend {}", name, backend_name);

    let backends: Api<MonitoringBackend> = Api::all(ctx.client.clone());
    let backend = backends.get(backend_name).await?;

    let tokens = resolve_tokens(&ctx.client, &backend.spec).await?;
    let proxy = resolve_proxy(&ctx.client, &backend.spec).await?;
    let trusted_ca = resolve_trusted_ca(&ctx.client, &backend.spec).await?;

    let artifacts = render_artifacts(
        &backend.spec,
        &tokens.paas_token,
        &proxy,
        trusted_ca.as_deref(),
    )?;

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &name);
    match secrets.get(config_secret::NAME).await {
        Ok(existing) if existing.data.as_ref() == Some(&artifacts) => {
            debug!("Config secret in namespace {} is up to date", name);
        }
        Ok(_) => {
            info!("Updating config secret in namespace {}", name);
            apply_config_secret(&secrets, &name, backend_name, artifacts).await?;
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!("Creating config secret in namespace {}", name);
            apply_config_secret(&secrets, &name, backend_name, artifacts).await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Action::requeue(Duration::from_secs(resync::INTERVAL_SECS)))
}

/// Apply the rendered artifacts as the config secret (create or update).
/// A conflicting concurrent write surfaces as an error; the next
/// reconciliation re-fetches and recomputes instead of re-applying stale
/// data.
async fn apply_config_secret(
    secrets: &Api<Secret>,
    namespace: &str,
    backend_name: &str,
    data: BTreeMap<String, ByteString>,
) -> Result<()> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(config_secret::NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                labels::BACKEND.to_string(),
                backend_name.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };

    let pp = PatchParams::apply(OPERATOR_NAME).force();
    secrets
        .patch(config_secret::NAME, &pp, &Patch::Apply(&secret))
        .await?;

    Ok(())
}

fn error_policy(
    namespace: Arc<Namespace>,
    error: &InfuserError,
    _ctx: Arc<NamespaceReconciler>,
) -> Action {
    error!(
        "Reconciliation error for namespace {}: {}",
        namespace.name_any(),
        error
    );
    Action::requeue(Duration::from_secs(60))
}
