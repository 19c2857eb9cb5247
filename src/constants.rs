// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Label keys used by Infuser
pub mod labels {
    /// Names the MonitoringBackend responsible for a namespace
    pub const BACKEND: &str = "infuser.dev/backend";
}

/// Kubernetes annotation keys used by Infuser
pub mod annotations {
    /// Marker recorded on a pod once the agent has been injected
    pub const INJECTED: &str = "infuser.dev/injected";
    /// Installer flavor override (pod wins over namespace)
    pub const FLAVOR: &str = "infuser.dev/flavor";
    /// Installer technology-set override (pod wins over namespace)
    pub const TECHNOLOGIES: &str = "infuser.dev/technologies";
}

/// Fallback values when neither pod nor namespace carries an override
pub mod defaults {
    pub const FLAVOR: &str = "default";
    pub const TECHNOLOGIES: &str = "all";
}

/// The per-namespace install config secret
pub mod config_secret {
    /// Fixed name of the secret in every managed namespace
    pub const NAME: &str = "infuser-agent-config";
    pub const SCRIPT_KEY: &str = "init.sh";
    pub const CA_KEY: &str = "ca.pem";
    pub const PROXY_KEY: &str = "proxy";
}

/// Keys inside objects referenced by a MonitoringBackend
pub mod references {
    pub const API_TOKEN_KEY: &str = "apiToken";
    pub const PAAS_TOKEN_KEY: &str = "paasToken";
    /// Default config map key for the trust bundle
    pub const TRUSTED_CA_KEY: &str = "certs";
    /// Default secret key for an indirect proxy value
    pub const PROXY_KEY: &str = "proxy";
}

/// Names and mount paths of the injected pieces
pub mod injection {
    pub const INIT_CONTAINER: &str = "install-agent";
    pub const BIN_VOLUME: &str = "agent-bin";
    pub const CONFIG_VOLUME: &str = "agent-config";
    pub const PODINFO_VOLUME: &str = "agent-podinfo";
    /// Agent installation directory, exported to the script as INSTALLPATH
    pub const INSTALL_PATH: &str = "/opt/infuser/agent";
    /// Where the config secret is mounted in the init container
    pub const CONFIG_MOUNT_PATH: &str = "/mnt/config";
    /// Where pod metadata is projected in the init container
    pub const PODINFO_MOUNT_PATH: &str = "/mnt/podinfo";
    /// Where pod metadata is projected in application containers
    pub const CONTAINER_PODINFO_MOUNT_PATH: &str = "/opt/infuser/agent/agent/conf/pod";
    /// Shared object preloaded into application processes
    pub const PRELOAD_LIBRARY: &str = "/opt/infuser/agent/agent/lib64/libagentproc.so";
}

/// The operator name used for server-side apply
pub const OPERATOR_NAME: &str = "infuser";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Reconciliation cadence
pub mod resync {
    /// Referenced secrets/config maps generate no watch events here, so
    /// every managed namespace is re-checked on this interval.
    pub const INTERVAL_SECS: u64 = 300;
}
