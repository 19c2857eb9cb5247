// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod mutation webhook - decides injection eligibility per admission
//! request and computes the structural patch.

use std::sync::Arc;

use axum::{extract::State, Json};
use k8s_openapi::api::core::v1::{
    Container, DownwardAPIVolumeFile, DownwardAPIVolumeSource, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, Namespace, ObjectFieldSelector, Pod, SecretVolumeSource, Volume, VolumeMount,
};
use kube::{
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    core::DynamicObject,
    Api,
};
use tracing::{debug, error, info, warn};

use crate::constants::{annotations, config_secret, defaults, injection};
use crate::reconcilers::namespace::managing_backend;
use crate::types::MonitoringBackend;
use crate::webhook::WebhookState;

/// Handle a mutating admission review for pods
pub async fn handle(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate(&state, &request).await;
    Json(response.into_review())
}

/// Process a single pod admission request
pub async fn mutate(state: &WebhookState, request: &AdmissionRequest<Pod>) -> AdmissionResponse {
    let uid = request.uid.clone();

    let Some(pod) = &request.object else {
        debug!(uid = %uid, "No pod object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    // A pod is injected at most once, even across repeated admission calls.
    if is_injected(pod) {
        debug!(uid = %uid, "Pod already carries the injected marker, allowing unchanged");
        return AdmissionResponse::from(request);
    }

    let Some(namespace_name) = request
        .namespace
        .as_deref()
        .or(pod.metadata.namespace.as_deref())
    else {
        debug!(uid = %uid, "Request carries no namespace, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let namespaces: Api<Namespace> = Api::all(state.kube.clone());
    let namespace = match namespaces.get(namespace_name).await {
        Ok(ns) => ns,
        Err(e) => {
            error!(uid = %uid, namespace = %namespace_name, error = %e, "Failed to look up namespace");
            return AdmissionResponse::from(request)
                .deny(format!("namespace lookup failed: {e}"));
        }
    };

    let Some(backend_name) = managing_backend(&namespace) else {
        debug!(uid = %uid, namespace = %namespace_name, "Namespace is not managed, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let backends: Api<MonitoringBackend> = Api::all(state.kube.clone());
    if let Err(e) = backends.get(backend_name).await {
        return match e {
            kube::Error::Api(ref err) if err.code == 404 => {
                warn!(
                    uid = %uid,
                    namespace = %namespace_name,
                    "Namespace references missing MonitoringBackend {}, allowing unchanged",
                    backend_name
                );
                AdmissionResponse::from(request)
            }
            e => {
                error!(uid = %uid, backend = %backend_name, error = %e, "Failed to look up MonitoringBackend");
                AdmissionResponse::from(request)
                    .deny(format!("MonitoringBackend lookup failed: {e}"))
            }
        };
    }

    let flavor = resolve_parameter(pod, &namespace, annotations::FLAVOR, defaults::FLAVOR);
    let technologies = resolve_parameter(
        pod,
        &namespace,
        annotations::TECHNOLOGIES,
        defaults::TECHNOLOGIES,
    );

    info!(
        uid = %uid,
        namespace = %namespace_name,
        backend = %backend_name,
        flavor = %flavor,
        technologies = %technologies,
        "Injecting agent bootstrap"
    );

    let mutated = inject(pod, flavor, technologies, &state.config.installer_image);

    let patch = match build_patch(pod, &mutated) {
        Ok(patch) => patch,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize pod for patching");
            return AdmissionResponse::from(request)
                .deny(format!("pod serialization error: {e}"));
        }
    };

    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

/// Check if a pod already carries the injected marker annotation
pub fn is_injected(pod: &Pod) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::INJECTED))
        .is_some_and(|v| v == "true")
}

/// Resolve an injection parameter: pod annotation wins over namespace
/// annotation, absence of both falls back to the default
pub fn resolve_parameter<'a>(
    pod: &'a Pod,
    namespace: &'a Namespace,
    key: &str,
    default: &'a str,
) -> &'a str {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .or_else(|| {
            namespace
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(key))
        })
        .map(String::as_str)
        .unwrap_or(default)
}

/// Rewrite a pod to bootstrap the agent. Ordering of the injected
/// pieces is fixed so that repeated calls produce identical pods.
pub fn inject(pod: &Pod, flavor: &str, technologies: &str, installer_image: &str) -> Pod {
    let mut pod = pod.clone();

    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(annotations::INJECTED.to_string(), "true".to_string());

    let spec = pod.spec.get_or_insert_with(Default::default);

    spec.init_containers
        .get_or_insert_with(Vec::new)
        .insert(0, install_container(flavor, technologies, installer_image));

    spec.volumes
        .get_or_insert_with(Vec::new)
        .extend(injected_volumes());

    for container in &mut spec.containers {
        let name = container.name.clone();
        let image = container.image.clone().unwrap_or_default();

        let env = container.env.get_or_insert_with(Vec::new);
        env.push(env_value("LD_PRELOAD", injection::PRELOAD_LIBRARY));
        env.push(env_value("CONTAINER_NAME", &name));
        env.push(env_value("CONTAINER_IMAGE", &image));

        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        mounts.push(mount(injection::BIN_VOLUME, injection::INSTALL_PATH, false));
        mounts.push(mount(
            injection::PODINFO_VOLUME,
            injection::CONTAINER_PODINFO_MOUNT_PATH,
            false,
        ));
    }

    pod
}

fn install_container(flavor: &str, technologies: &str, installer_image: &str) -> Container {
    Container {
        name: injection::INIT_CONTAINER.to_string(),
        image: Some(installer_image.to_string()),
        command: Some(vec!["/bin/sh".to_string()]),
        args: Some(vec![format!("{}/init.sh", injection::CONFIG_MOUNT_PATH)]),
        env: Some(vec![
            env_value("FLAVOR", flavor),
            env_value("TECHNOLOGIES", technologies),
            env_value("INSTALLPATH", injection::INSTALL_PATH),
            env_from_field("NODENAME", "spec.nodeName"),
            env_from_field("NODEIP", "status.hostIP"),
        ]),
        volume_mounts: Some(vec![
            mount(injection::BIN_VOLUME, injection::INSTALL_PATH, false),
            mount(injection::CONFIG_VOLUME, injection::CONFIG_MOUNT_PATH, true),
            mount(injection::PODINFO_VOLUME, injection::PODINFO_MOUNT_PATH, false),
        ]),
        ..Default::default()
    }
}

fn injected_volumes() -> Vec<Volume> {
    vec![
        Volume {
            name: injection::BIN_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: injection::CONFIG_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(config_secret::NAME.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: injection::PODINFO_VOLUME.to_string(),
            downward_api: Some(DownwardAPIVolumeSource {
                items: Some(vec![
                    podinfo_file("name", "metadata.name"),
                    podinfo_file("namespace", "metadata.namespace"),
                    podinfo_file("uid", "metadata.uid"),
                    podinfo_file("labels", "metadata.labels"),
                    podinfo_file("annotations", "metadata.annotations"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn env_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn podinfo_file(path: &str, field_path: &str) -> DownwardAPIVolumeFile {
    DownwardAPIVolumeFile {
        path: path.to_string(),
        field_ref: Some(ObjectFieldSelector {
            field_path: field_path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn build_patch(original: &Pod, mutated: &Pod) -> serde_json::Result<json_patch::Patch> {
    Ok(json_patch::diff(
        &serde_json::to_value(original)?,
        &serde_json::to_value(mutated)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_utils::{namespace_json, MockService};
    use crate::types::{MonitoringBackendSpec, SecretRef};
    use k8s_openapi::api::core::v1::PodSpec;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const INSTALLER_IMAGE: &str = "registry.example.com/infuser/installer:1.0";
    const NAMESPACE_PATH: &str = "/api/v1/namespaces/team-a";
    const BACKEND_PATH: &str = "/apis/infuser.dev/v1alpha1/monitoringbackends/prod";

    fn make_pod(annotations: Option<BTreeMap<String, String>>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("test-pod".to_string()),
                namespace: Some("team-a".to_string()),
                annotations,
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "test-container".to_string(),
                    image: Some("alpine".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn make_namespace(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> Namespace {
        serde_json::from_str(&namespace_json("team-a", labels, annotations)).unwrap()
    }

    fn make_request(pod: &Pod) -> AdmissionRequest<Pod> {
        let review: AdmissionReview<Pod> = serde_json::from_value(serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "test-request-uid",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": "test-pod",
                "namespace": "team-a",
                "operation": "CREATE",
                "userInfo": {},
                "object": serde_json::to_value(pod).unwrap()
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    fn make_state(service: MockService) -> WebhookState {
        WebhookState::new(
            service.into_client(),
            Config {
                installer_image: INSTALLER_IMAGE.to_string(),
                webhook_addr: "0.0.0.0:8443".parse().unwrap(),
            },
        )
    }

    fn backend_json() -> String {
        let spec = MonitoringBackendSpec {
            api_url: "https://test-url/api".to_string(),
            tokens: SecretRef {
                namespace: "infuser".to_string(),
                name: "backend-tokens".to_string(),
            },
            proxy: None,
            trusted_ca: None,
            skip_cert_check: None,
        };
        serde_json::to_string(&MonitoringBackend::new("prod", spec)).unwrap()
    }

    #[test]
    fn test_inject_adds_bootstrap_pieces() {
        let pod = make_pod(None);
        let mutated = inject(&pod, "default", "all", INSTALLER_IMAGE);

        let spec = mutated.spec.as_ref().unwrap();
        assert_eq!(spec.init_containers.as_ref().unwrap().len(), 1);
        assert_eq!(spec.volumes.as_ref().unwrap().len(), 3);
        assert_eq!(
            mutated
                .metadata
                .annotations
                .as_ref()
                .unwrap()
                .get("infuser.dev/injected"),
            Some(&"true".to_string())
        );

        let init = &spec.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, "install-agent");
        assert_eq!(init.image.as_deref(), Some(INSTALLER_IMAGE));
        assert_eq!(init.env.as_ref().unwrap().len(), 5);
        assert_eq!(init.volume_mounts.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_inject_rewrites_application_containers() {
        let pod = make_pod(None);
        let mutated = inject(&pod, "default", "all", INSTALLER_IMAGE);

        let container = &mutated.spec.as_ref().unwrap().containers[0];
        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env[0].name, "LD_PRELOAD");
        assert_eq!(
            env[0].value.as_deref(),
            Some("/opt/infuser/agent/agent/lib64/libagentproc.so")
        );
        assert_eq!(env[1].name, "CONTAINER_NAME");
        assert_eq!(env[1].value.as_deref(), Some("test-container"));
        assert_eq!(env[2].name, "CONTAINER_IMAGE");
        assert_eq!(env[2].value.as_deref(), Some("alpine"));

        let mounts = container.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].name, "agent-bin");
        assert_eq!(mounts[1].name, "agent-podinfo");
    }

    #[test]
    fn test_inject_prepends_init_container() {
        let mut pod = make_pod(None);
        pod.spec.as_mut().unwrap().init_containers = Some(vec![Container {
            name: "existing-init".to_string(),
            ..Default::default()
        }]);

        let mutated = inject(&pod, "default", "all", INSTALLER_IMAGE);

        let init_containers = mutated
            .spec
            .as_ref()
            .unwrap()
            .init_containers
            .as_ref()
            .unwrap();
        assert_eq!(init_containers.len(), 2);
        assert_eq!(init_containers[0].name, "install-agent");
        assert_eq!(init_containers[1].name, "existing-init");
    }

    #[test]
    fn test_inject_preserves_existing_env() {
        let mut pod = make_pod(None);
        pod.spec.as_mut().unwrap().containers[0].env =
            Some(vec![env_value("EXISTING", "value")]);

        let mutated = inject(&pod, "default", "all", INSTALLER_IMAGE);

        let env = mutated.spec.as_ref().unwrap().containers[0]
            .env
            .as_ref()
            .unwrap();
        assert_eq!(env.len(), 4);
        assert_eq!(env[0].name, "EXISTING");
    }

    #[test]
    fn test_inject_passes_flavor_and_technologies() {
        let pod = make_pod(None);
        let mutated = inject(&pod, "musl", "java,nginx", INSTALLER_IMAGE);

        let init = &mutated.spec.as_ref().unwrap().init_containers.as_ref().unwrap()[0];
        let env = init.env.as_ref().unwrap();
        assert_eq!(env[0].name, "FLAVOR");
        assert_eq!(env[0].value.as_deref(), Some("musl"));
        assert_eq!(env[1].name, "TECHNOLOGIES");
        assert_eq!(env[1].value.as_deref(), Some("java,nginx"));
    }

    #[test]
    fn test_patch_applies_cleanly_to_original() {
        let pod = make_pod(None);
        let mutated = inject(&pod, "default", "all", INSTALLER_IMAGE);
        let patch = build_patch(&pod, &mutated).unwrap();

        let mut document = serde_json::to_value(&pod).unwrap();
        json_patch::patch(&mut document, &patch).unwrap();
        assert_eq!(document, serde_json::to_value(&mutated).unwrap());
    }

    #[test]
    fn test_patch_is_deterministic() {
        let pod = make_pod(None);

        let first = build_patch(&pod, &inject(&pod, "default", "all", INSTALLER_IMAGE)).unwrap();
        let second = build_patch(&pod, &inject(&pod, "default", "all", INSTALLER_IMAGE)).unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_is_injected() {
        assert!(!is_injected(&make_pod(None)));

        let marked = make_pod(Some(BTreeMap::from([(
            "infuser.dev/injected".to_string(),
            "true".to_string(),
        )])));
        assert!(is_injected(&marked));
    }

    #[test]
    fn test_resolve_parameter_pod_annotation_wins() {
        let pod = make_pod(Some(BTreeMap::from([(
            "infuser.dev/flavor".to_string(),
            "musl".to_string(),
        )])));
        let namespace = make_namespace(&[], &[("infuser.dev/flavor", "default")]);

        assert_eq!(
            resolve_parameter(&pod, &namespace, "infuser.dev/flavor", "default"),
            "musl"
        );
    }

    #[test]
    fn test_resolve_parameter_namespace_fallback() {
        let pod = make_pod(None);
        let namespace = make_namespace(&[], &[("infuser.dev/technologies", "java")]);

        assert_eq!(
            resolve_parameter(&pod, &namespace, "infuser.dev/technologies", "all"),
            "java"
        );
    }

    #[test]
    fn test_resolve_parameter_default() {
        let pod = make_pod(None);
        let namespace = make_namespace(&[], &[]);

        assert_eq!(
            resolve_parameter(&pod, &namespace, "infuser.dev/flavor", "default"),
            "default"
        );
    }

    #[tokio::test]
    async fn test_mutate_skips_marked_pod_without_lookups() {
        let service = MockService::new();
        let state = make_state(service.clone());
        let pod = make_pod(Some(BTreeMap::from([(
            "infuser.dev/injected".to_string(),
            "true".to_string(),
        )])));

        let response = mutate(&state, &make_request(&pod)).await;

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(service.requests().is_empty());
    }

    #[tokio::test]
    async fn test_mutate_passes_through_unmanaged_namespace() {
        let service = MockService::new().on_get(
            NAMESPACE_PATH,
            200,
            &namespace_json("team-a", &[], &[]),
        );
        let state = make_state(service);

        let response = mutate(&state, &make_request(&make_pod(None))).await;

        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    #[tokio::test]
    async fn test_mutate_passes_through_dangling_backend_label() {
        let service = MockService::new().on_get(
            NAMESPACE_PATH,
            200,
            &namespace_json("team-a", &[("infuser.dev/backend", "prod")], &[]),
        );
        let state = make_state(service);

        let response = mutate(&state, &make_request(&make_pod(None))).await;

        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    #[tokio::test]
    async fn test_mutate_patches_managed_pod() {
        let service = MockService::new()
            .on_get(
                NAMESPACE_PATH,
                200,
                &namespace_json("team-a", &[("infuser.dev/backend", "prod")], &[]),
            )
            .on_get(BACKEND_PATH, 200, &backend_json());
        let state = make_state(service);
        let pod = make_pod(None);

        let response = mutate(&state, &make_request(&pod)).await;

        assert!(response.allowed);
        let patch: json_patch::Patch =
            serde_json::from_slice(response.patch.as_ref().unwrap()).unwrap();
        assert!(!patch.0.is_empty());

        let mut document = serde_json::to_value(&pod).unwrap();
        json_patch::patch(&mut document, &patch).unwrap();
        assert_eq!(
            document["metadata"]["annotations"]["infuser.dev/injected"],
            "true"
        );
        assert_eq!(document["spec"]["initContainers"][0]["name"], "install-agent");
    }

    #[tokio::test]
    async fn test_mutate_honors_namespace_overrides() {
        let service = MockService::new()
            .on_get(
                NAMESPACE_PATH,
                200,
                &namespace_json(
                    "team-a",
                    &[("infuser.dev/backend", "prod")],
                    &[("infuser.dev/flavor", "musl")],
                ),
            )
            .on_get(BACKEND_PATH, 200, &backend_json());
        let state = make_state(service);
        let pod = make_pod(None);

        let response = mutate(&state, &make_request(&pod)).await;

        let patch: json_patch::Patch =
            serde_json::from_slice(response.patch.as_ref().unwrap()).unwrap();
        let mut document = serde_json::to_value(&pod).unwrap();
        json_patch::patch(&mut document, &patch).unwrap();
        assert_eq!(
            document["spec"]["initContainers"][0]["env"][0]["value"],
            "musl"
        );
    }

    #[tokio::test]
    async fn test_handle_rejects_review_without_request() {
        let service = MockService::new();
        let state = Arc::new(make_state(service));
        let review: AdmissionReview<Pod> = serde_json::from_value(serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview"
        }))
        .unwrap();

        let Json(result) = handle(State(state), Json(review)).await;

        let response = result.response.unwrap();
        assert!(!response.allowed);
    }
}
