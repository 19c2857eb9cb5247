// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::constants::references;

/// Cluster-scoped description of the monitoring backend: where the agent
/// installer is downloaded from and how to authenticate against it.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(group = "infuser.dev", version = "v1alpha1", kind = "MonitoringBackend")]
#[serde(rename_all = "camelCase")]
pub struct MonitoringBackendSpec {
    /// Backend API endpoint, e.g. https://tenant.example.com/api
    pub api_url: String,
    /// Secret holding the apiToken/paasToken credential pair
    pub tokens: SecretRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,
    /// Config map entry with PEM certificates the installer should trust
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_ca: Option<ConfigMapKeyRef>,
    /// Disable certificate verification when talking to the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_cert_check: Option<bool>,
}

/// Reference to a secret in an arbitrary namespace
#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

/// Reference to a single key of a secret
#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Reference to a single key of a config map
#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapKeyRef {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Proxy used for installer downloads. Either a literal value or a
/// reference to a secret key; the reference wins when both are set.
#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<SecretKeyRef>,
}

impl MonitoringBackendSpec {
    pub fn skip_cert_check(&self) -> bool {
        self.skip_cert_check.unwrap_or(false)
    }

    pub fn has_trusted_ca(&self) -> bool {
        self.trusted_ca.is_some()
    }
}

impl SecretKeyRef {
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(references::PROXY_KEY)
    }
}

impl ConfigMapKeyRef {
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(references::TRUSTED_CA_KEY)
    }
}
