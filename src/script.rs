// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rendering of the per-namespace install artifacts.
//!
//! The install script is parameterized twice: backend identity and
//! credentials are substituted here at render time, while flavor and
//! technology selection are read from the init container's environment
//! (FLAVOR, TECHNOLOGIES, INSTALLPATH, NODENAME, NODEIP) at run time.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use minijinja::{context, Environment, UndefinedBehavior};
use url::Url;

use crate::constants::{config_secret, injection};
use crate::error::{InfuserError, Result};
use crate::types::MonitoringBackendSpec;

const INSTALL_SCRIPT: &str = r#"#!/usr/bin/env sh

set -eu

api_url="{{ api_url }}"
config_dir="{{ config_dir }}"
paas_token="{{ paas_token }}"
proxy="{{ proxy }}"
skip_cert_checks="{{ skip_cert_checks }}"
custom_ca="{{ custom_ca }}"

archive="$(mktemp)"

curl_params="--silent --fail --output ${archive}"

if [ "${skip_cert_checks}" = "true" ]; then
  curl_params="${curl_params} --insecure"
fi

if [ "${custom_ca}" = "true" ]; then
  curl_params="${curl_params} --cacert ${config_dir}/ca.pem"
fi

if [ -n "${proxy}" ]; then
  curl_params="${curl_params} --proxy ${proxy}"
fi

curl "${api_url}/v1/deployment/installer/agent/unix/paas/latest?flavor=${FLAVOR}&include=${TECHNOLOGIES}&bitness=64" \
  --header "Authorization: Api-Token ${paas_token}" ${curl_params}

unzip -o -d "${INSTALLPATH}" "${archive}"
rm -f "${archive}"

mkdir -p "${INSTALLPATH}/agent/conf"
printf '%s' "${NODENAME}" > "${INSTALLPATH}/agent/conf/node.name"
printf '%s' "${NODEIP}" > "${INSTALLPATH}/agent/conf/node.ip"

echo "${INSTALLPATH}/agent/lib64/libagentproc.so" >> /etc/ld.so.preload
"#;

/// Render the full set of config secret entries for one backend.
///
/// The result is a pure function of the inputs: rendering twice with the
/// same backend spec, token, proxy and trust bundle yields byte-identical
/// output, which the namespace synchronizer relies on for diff-based
/// updates.
pub fn render_artifacts(
    spec: &MonitoringBackendSpec,
    paas_token: &str,
    proxy: &str,
    trusted_ca: Option<&[u8]>,
) -> Result<BTreeMap<String, ByteString>> {
    let api_url = Url::parse(&spec.api_url)
        .map_err(|e| InfuserError::InvalidBackend(format!("apiUrl {:?}: {}", spec.api_url, e)))?;
    let custom_ca = trusted_ca.is_some_and(|ca| !ca.is_empty());

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let script = env.render_str(
        INSTALL_SCRIPT,
        context! {
            api_url => api_url.as_str().trim_end_matches('/'),
            config_dir => injection::CONFIG_MOUNT_PATH,
            paas_token => paas_token,
            proxy => proxy,
            skip_cert_checks => spec.skip_cert_check(),
            custom_ca => custom_ca,
        },
    )?;

    let mut artifacts = BTreeMap::new();
    artifacts.insert(
        config_secret::SCRIPT_KEY.to_string(),
        ByteString(script.into_bytes()),
    );

    if custom_ca {
        if let Some(ca) = trusted_ca {
            artifacts.insert(config_secret::CA_KEY.to_string(), ByteString(ca.to_vec()));
        }
    }

    if !proxy.is_empty() {
        artifacts.insert(
            config_secret::PROXY_KEY.to_string(),
            ByteString(proxy.as_bytes().to_vec()),
        );
    }

    Ok(artifacts)
}
