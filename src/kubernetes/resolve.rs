// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of the secrets and config maps a MonitoringBackend refers to.
//!
//! All lookups are direct, uncached reads. The referenced objects live in
//! arbitrary namespaces and do not feed watch events into the namespace
//! synchronizer, which is why reconciliation re-resolves them on every run.

use crate::constants::references;
use crate::error::{InfuserError, Result};
use crate::types::MonitoringBackendSpec;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use tracing::instrument;

/// The credential pair stored in the backend's tokens secret
#[derive(Debug, Clone)]
pub struct Tokens {
    pub api_token: String,
    pub paas_token: String,
}

/// Read both tokens from the secret referenced by the backend spec
#[instrument(skip(client, spec))]
pub async fn resolve_tokens(client: &Client, spec: &MonitoringBackendSpec) -> Result<Tokens> {
    let namespace = &spec.tokens.namespace;
    let name = &spec.tokens.name;

    let api_token = get_secret_key(client, namespace, name, references::API_TOKEN_KEY).await?;
    let paas_token = get_secret_key(client, namespace, name, references::PAAS_TOKEN_KEY).await?;

    Ok(Tokens {
        api_token: into_utf8(api_token, namespace, name, references::API_TOKEN_KEY)?,
        paas_token: into_utf8(paas_token, namespace, name, references::PAAS_TOKEN_KEY)?,
    })
}

/// Resolve the proxy value for a backend, an empty string meaning "no proxy".
/// A secret reference wins over a literal value when both are set.
#[instrument(skip(client, spec))]
pub async fn resolve_proxy(client: &Client, spec: &MonitoringBackendSpec) -> Result<String> {
    let Some(proxy) = &spec.proxy else {
        return Ok(String::new());
    };

    if let Some(reference) = &proxy.value_from {
        let value =
            get_secret_key(client, &reference.namespace, &reference.name, reference.key()).await?;
        return into_utf8(value, &reference.namespace, &reference.name, reference.key());
    }

    Ok(proxy.value.clone().unwrap_or_default())
}

/// Resolve the trust bundle for a backend, if one is referenced
#[instrument(skip(client, spec))]
pub async fn resolve_trusted_ca(
    client: &Client,
    spec: &MonitoringBackendSpec,
) -> Result<Option<Vec<u8>>> {
    let Some(reference) = &spec.trusted_ca else {
        return Ok(None);
    };

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &reference.namespace);
    let config_map = match config_maps.get(&reference.name).await {
        Ok(cm) => cm,
        Err(kube::Error::Api(err)) if err.code == 404 => {
            return Err(InfuserError::MissingReference(format!(
                "config map {}/{} not found",
                reference.namespace, reference.name
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let Some(value) = config_map.data.as_ref().and_then(|d| d.get(reference.key())) else {
        return Err(InfuserError::MissingReference(format!(
            "config map {}/{} does not contain key '{}'",
            reference.namespace,
            reference.name,
            reference.key()
        )));
    };

    Ok(Some(value.as_bytes().to_vec()))
}

async fn get_secret_key(
    client: &Client,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Vec<u8>> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = match secrets.get(name).await {
        Ok(s) => s,
        Err(kube::Error::Api(err)) if err.code == 404 => {
            return Err(InfuserError::MissingReference(format!(
                "secret {}/{} not found",
                namespace, name
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return Err(InfuserError::MissingReference(format!(
            "secret {}/{} does not contain key '{}'",
            namespace, name, key
        )));
    };

    Ok(value.0.clone())
}

fn into_utf8(bytes: Vec<u8>, namespace: &str, name: &str, key: &str) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| {
        InfuserError::MissingReference(format!(
            "secret {}/{} key '{}' is not valid UTF-8",
            namespace, name, key
        ))
    })
}
