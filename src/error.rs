// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfuserError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Install script rendering failed: {0}")]
    RenderError(#[from] minijinja::Error),

    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("Invalid MonitoringBackend: {0}")]
    InvalidBackend(String),
}

pub type Result<T> = std::result::Result<T, InfuserError>;
