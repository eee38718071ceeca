//! Kubernetes Event recording against TFJob resources.
//!
//! Recording is fire-and-forget: a failed publish is logged and swallowed,
//! never surfaced to the reconciliation that emitted it.

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use crate::crd::TFJob;

/// Audit sink for human-visible progress and failures on a job.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, job: &TFJob, type_: EventType, reason: &str, message: String);
}

/// Publishes events through the API server.
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    /// `controller_name` shows up as the reporting component on each event,
    /// `instance` as the reporting pod.
    pub fn new(client: Client, controller_name: &str, instance: Option<String>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance,
            },
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, job: &TFJob, type_: EventType, reason: &str, message: String) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), job.object_ref(&()));
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(message),
            action: actions::RECONCILE.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(
                job = %job.name_any(),
                reason,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Reason strings, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    pub const FAILED_MARSHAL_TFJOB: &str = "FailedMarshalTFJob";
    pub const TFJOB_TERMINATED: &str = "TFJobTerminated";
    pub const SUCCESSFUL_DELETE_PDB: &str = "SuccessfulDeletePdb";
    pub const FAILED_DELETE_PDB: &str = "FailedDeletePdb";
    pub const SUCCESSFUL_DELETE_POD: &str = "SuccessfulDeletePod";
    pub const FAILED_DELETE_POD: &str = "FailedDeletePod";
    pub const SUCCESSFUL_DELETE_SERVICE: &str = "SuccessfulDeleteService";
    pub const FAILED_DELETE_SERVICE: &str = "FailedDeleteService";
}

pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
}
