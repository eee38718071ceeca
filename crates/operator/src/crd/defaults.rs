use k8s_openapi::api::core::v1::ContainerPort;

use super::tfjob::{
    CleanPodPolicy, RestartPolicy, TFJob, DEFAULT_CONTAINER_NAME, DEFAULT_PORT, DEFAULT_PORT_NAME,
};

/// Applies platform default values to a freshly decoded job.
///
/// Implementations must be idempotent: ingress may default the same object
/// more than once across resyncs.
pub trait Defaulter: Send + Sync {
    fn default_job(&self, job: &mut TFJob);
}

/// Stock v1alpha2 defaulting rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct TFJobDefaulter;

impl Defaulter for TFJobDefaulter {
    fn default_job(&self, job: &mut TFJob) {
        if job.spec.clean_pod_policy.is_none() {
            job.spec.clean_pod_policy = Some(CleanPodPolicy::All);
        }

        for replica_spec in job.spec.tf_replica_specs.values_mut() {
            if replica_spec.replicas.is_none() {
                replica_spec.replicas = Some(1);
            }
            if replica_spec.restart_policy.is_none() {
                replica_spec.restart_policy = Some(RestartPolicy::Never);
            }

            let Some(pod_spec) = replica_spec.template.spec.as_mut() else {
                continue;
            };
            for container in pod_spec
                .containers
                .iter_mut()
                .filter(|c| c.name == DEFAULT_CONTAINER_NAME)
            {
                let ports = container.ports.get_or_insert_with(Vec::new);
                if !ports.iter().any(|p| p.name.as_deref() == Some(DEFAULT_PORT_NAME)) {
                    ports.push(ContainerPort {
                        name: Some(DEFAULT_PORT_NAME.to_string()),
                        container_port: DEFAULT_PORT,
                        ..Default::default()
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{TFJobSpec, TFReplicaType};
    use serde_json::json;

    fn job() -> TFJob {
        let spec: TFJobSpec = serde_json::from_value(json!({
            "tfReplicaSpecs": {
                "Worker": {
                    "template": { "spec": { "containers": [
                        { "name": "tensorflow", "image": "tf:1.7" },
                        { "name": "sidecar", "image": "busybox" }
                    ] } }
                }
            }
        }))
        .unwrap();
        TFJob::new("train", spec)
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let mut job = job();
        TFJobDefaulter.default_job(&mut job);

        assert_eq!(job.spec.clean_pod_policy, Some(CleanPodPolicy::All));
        let worker = &job.spec.tf_replica_specs[&TFReplicaType::Worker];
        assert_eq!(worker.replicas, Some(1));
        assert_eq!(worker.restart_policy, Some(RestartPolicy::Never));

        let containers = &worker.template.spec.as_ref().unwrap().containers;
        let ports = containers[0].ports.as_ref().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].container_port, DEFAULT_PORT);
        assert!(containers[1].ports.is_none());
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let mut job = job();
        job.spec.clean_pod_policy = Some(CleanPodPolicy::None);
        TFJobDefaulter.default_job(&mut job);
        assert_eq!(job.spec.clean_pod_policy, Some(CleanPodPolicy::None));
    }

    #[test]
    fn test_defaulting_is_idempotent() {
        let mut once = job();
        TFJobDefaulter.default_job(&mut once);
        let mut twice = once.clone();
        TFJobDefaulter.default_job(&mut twice);
        assert_eq!(once, twice);
    }
}
