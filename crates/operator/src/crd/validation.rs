use thiserror::Error;

use super::tfjob::{TFJobSpec, TFReplicaType, DEFAULT_CONTAINER_NAME};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("TFJobSpec has no replica specs")]
    NoReplicaSpecs,
    #[error("{0} replica template declares no containers")]
    NoContainers(TFReplicaType),
    #[error("container {container} in {replica} replica has no image")]
    MissingImage {
        replica: TFReplicaType,
        container: String,
    },
    #[error("there is no container named tensorflow in {0} replica")]
    MissingDefaultContainer(TFReplicaType),
    #[error("{replica} replicas must not be negative, got {replicas}")]
    NegativeReplicas {
        replica: TFReplicaType,
        replicas: i32,
    },
    #[error("Chief replicas must be at most 1, got {0}")]
    TooManyChiefs(i32),
}

/// Checks that a decoded spec describes a runnable training topology.
pub fn validate_spec(spec: &TFJobSpec) -> Result<(), ValidationError> {
    if spec.tf_replica_specs.is_empty() {
        return Err(ValidationError::NoReplicaSpecs);
    }

    for (&replica, replica_spec) in &spec.tf_replica_specs {
        if let Some(replicas) = replica_spec.replicas {
            if replicas < 0 {
                return Err(ValidationError::NegativeReplicas { replica, replicas });
            }
            if replica == TFReplicaType::Chief && replicas > 1 {
                return Err(ValidationError::TooManyChiefs(replicas));
            }
        }

        let containers = replica_spec
            .template
            .spec
            .as_ref()
            .map(|s| s.containers.as_slice())
            .unwrap_or_default();
        if containers.is_empty() {
            return Err(ValidationError::NoContainers(replica));
        }

        let mut has_default = false;
        for container in containers {
            if container.image.as_deref().unwrap_or_default().is_empty() {
                return Err(ValidationError::MissingImage {
                    replica,
                    container: container.name.clone(),
                });
            }
            if container.name == DEFAULT_CONTAINER_NAME {
                has_default = true;
            }
        }
        if !has_default {
            return Err(ValidationError::MissingDefaultContainer(replica));
        }
    }

    Ok(())
}
