use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ApiResource;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the container every replica template must carry.
pub const DEFAULT_CONTAINER_NAME: &str = "tensorflow";
/// Name of the port injected into the `tensorflow` container by defaulting.
pub const DEFAULT_PORT_NAME: &str = "tfjob-port";
pub const DEFAULT_PORT: i32 = 2222;

#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
#[kube(
    group = "kubeflow.org",
    version = "v1alpha2",
    kind = "TFJob",
    plural = "tfjobs",
    shortname = "tfjob",
    namespaced,
    status = "TFJobStatus",
    derive = "PartialEq"
)]
pub struct TFJobSpec {
    /// Which pods to delete once the job has terminated. Unset means `All`.
    #[serde(rename = "cleanPodPolicy", skip_serializing_if = "Option::is_none")]
    pub clean_pod_policy: Option<CleanPodPolicy>,

    /// Replica topology of the training cluster, keyed by role
    #[serde(rename = "tfReplicaSpecs", default)]
    pub tf_replica_specs: BTreeMap<TFReplicaType, TFReplicaSpec>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub enum TFReplicaType {
    PS,
    Worker,
    Chief,
    Evaluator,
}

impl fmt::Display for TFReplicaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TFReplicaType::PS => "PS",
            TFReplicaType::Worker => "Worker",
            TFReplicaType::Chief => "Chief",
            TFReplicaType::Evaluator => "Evaluator",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct TFReplicaSpec {
    /// Desired number of replicas for this role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Pod template used to create every replica of this role
    #[serde(default)]
    pub template: PodTemplateSpec,

    /// Restart behaviour of replicas of this role
    #[serde(rename = "restartPolicy", skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
    ExitCode,
}

/// Controls which dependents are removed when a job terminates.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
pub enum CleanPodPolicy {
    /// Delete every pod and its service
    #[default]
    All,
    /// Delete only pods still in the `Running` phase, plus their services
    Running,
    /// Leave everything in place
    None,
}

impl CleanPodPolicy {
    /// Whether a pod in `phase` (and its companion service) should be deleted.
    pub fn should_delete(self, phase: Option<&str>) -> bool {
        match self {
            CleanPodPolicy::All => true,
            CleanPodPolicy::Running => phase == Some("Running"),
            CleanPodPolicy::None => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct TFJobStatus {
    /// Lifecycle history, oldest first. Entries are only ever appended.
    #[serde(default)]
    pub conditions: Vec<TFJobCondition>,

    #[serde(rename = "replicaStatuses", default)]
    pub replica_statuses: BTreeMap<TFReplicaType, TFReplicaStatus>,

    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,

    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Time>,

    #[serde(rename = "lastReconcileTime", skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<Time>,
}

impl TFJobStatus {
    /// True once the most recent condition is a terminal one.
    pub fn is_finished(&self) -> bool {
        self.conditions
            .last()
            .map(|c| c.condition_type.is_terminal())
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct TFReplicaStatus {
    #[serde(default)]
    pub active: i32,
    #[serde(default)]
    pub succeeded: i32,
    #[serde(default)]
    pub failed: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct TFJobCondition {
    #[serde(rename = "type")]
    pub condition_type: TFJobConditionType,
    /// One of "True", "False" or "Unknown"
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "lastUpdateTime")]
    pub last_update_time: Time,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: Time,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum TFJobConditionType {
    Created,
    Running,
    Restarting,
    Succeeded,
    Failed,
    Terminated,
}

impl TFJobConditionType {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TFJobConditionType::Succeeded | TFJobConditionType::Failed | TFJobConditionType::Terminated
        )
    }
}

impl TFJob {
    /// Type information for handling TFJobs as `DynamicObject`s.
    pub fn api_resource() -> ApiResource {
        ApiResource::erase::<TFJob>(&())
    }

    /// Effective cleanup policy, falling back to `All` when unset.
    pub fn clean_pod_policy(&self) -> CleanPodPolicy {
        self.spec.clean_pod_policy.unwrap_or_default()
    }

    /// Cache key in `namespace/name` form.
    pub fn key(&self) -> String {
        match self.namespace() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, self.name_any()),
            _ => self.name_any(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.as_ref().map(|s| s.is_finished()).unwrap_or(false)
    }
}
