// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Image run as the install init container in injected pods
    pub installer_image: String,
    /// Listen address of the admission webhook server. TLS is terminated
    /// in front of the operator, certificate provisioning is not handled here.
    pub webhook_addr: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let installer_image = env::var("INFUSER_INSTALLER_IMAGE")
            .context("INFUSER_INSTALLER_IMAGE environment variable not set")?;
        let webhook_addr = env::var("INFUSER_WEBHOOK_ADDR")
            .unwrap_or("0.0.0.0:8443".to_string())
            .parse()
            .context("INFUSER_WEBHOOK_ADDR is not a valid listen address")?;

        Ok(Config {
            installer_image,
            webhook_addr,
        })
    }
}
