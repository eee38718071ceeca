pub mod defaults;
pub mod tfjob;
pub mod validation;

pub use defaults::{Defaulter, TFJobDefaulter};
pub use tfjob::{
    CleanPodPolicy, RestartPolicy, TFJob, TFJobCondition, TFJobConditionType, TFJobSpec,
    TFJobStatus, TFReplicaSpec, TFReplicaStatus, TFReplicaType,
};
pub use validation::{validate_spec, ValidationError};
