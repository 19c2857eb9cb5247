// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and reference resolution.

pub mod crd;
pub mod resolve;

pub use crd::wait_for_backend_crd;
pub use resolve::{resolve_proxy, resolve_tokens, resolve_trusted_ca, Tokens};
