//! Control-plane operations on the objects a TFJob owns.
//!
//! Every delete treats "already gone" as success so cleanup can be retried
//! from the top after a partial failure.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Api, DeleteParams, ListParams};
use kube::runtime::events::EventType;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::crd::TFJob;
use crate::events::{reasons, EventRecorder};
use crate::{is_kube_not_found, Result};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodControl: Send + Sync {
    /// Deletes a pod owned by `job`. Deleting an absent pod succeeds.
    async fn delete_pod(&self, namespace: &str, name: &str, job: &TFJob) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Deletes a service owned by `job`. Deleting an absent service succeeds.
    async fn delete_service(&self, namespace: &str, name: &str, job: &TFJob) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PdbControl: Send + Sync {
    /// Returns `None` when no such budget exists.
    async fn get_pdb(&self, namespace: &str, name: &str) -> Result<Option<PodDisruptionBudget>>;
    async fn delete_pdb(&self, namespace: &str, name: &str) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;
}

/// Folds a delete response into whether the object was still there.
fn deletion_outcome<T>(res: std::result::Result<T, kube::Error>) -> std::result::Result<bool, kube::Error> {
    match res {
        Ok(_) => Ok(true),
        Err(e) if is_kube_not_found(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Issues a delete and reports whether the object was still there.
async fn delete_if_present<K>(api: &Api<K>, name: &str) -> std::result::Result<bool, kube::Error>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    deletion_outcome(api.delete(name, &DeleteParams::default()).await)
}

/// A pod with a deletion timestamp is already on its way out.
fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Event reasons for one kind of owned object.
struct DeleteReasons {
    kind: &'static str,
    success: &'static str,
    failure: &'static str,
}

const POD_REASONS: DeleteReasons = DeleteReasons {
    kind: "pod",
    success: reasons::SUCCESSFUL_DELETE_POD,
    failure: reasons::FAILED_DELETE_POD,
};

const SERVICE_REASONS: DeleteReasons = DeleteReasons {
    kind: "service",
    success: reasons::SUCCESSFUL_DELETE_SERVICE,
    failure: reasons::FAILED_DELETE_SERVICE,
};

/// Records the event for a delete outcome. An object that was already gone
/// gets no event.
async fn report_deletion(
    recorder: &dyn EventRecorder,
    job: &TFJob,
    namespace: &str,
    name: &str,
    outcome: std::result::Result<bool, kube::Error>,
    reasons: &DeleteReasons,
) -> Result<()> {
    match outcome {
        Ok(false) => {
            debug!(kind = reasons.kind, name, namespace, "Object already deleted");
            Ok(())
        }
        Ok(true) => {
            info!(kind = reasons.kind, name, namespace, "Deleted object");
            recorder
                .record(job, EventType::Normal, reasons.success, format!("Deleted {}: {}", reasons.kind, name))
                .await;
            Ok(())
        }
        Err(e) => {
            recorder
                .record(job, EventType::Warning, reasons.failure, format!("Error deleting: {}", e))
                .await;
            Err(e.into())
        }
    }
}

pub struct KubePodControl {
    client: Client,
    recorder: Arc<dyn EventRecorder>,
}

impl KubePodControl {
    pub fn new(client: Client, recorder: Arc<dyn EventRecorder>) -> Self {
        Self { client, recorder }
    }
}

#[async_trait]
impl PodControl for KubePodControl {
    async fn delete_pod(&self, namespace: &str, name: &str, job: &TFJob) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let Some(pod) = api.get_opt(name).await? else {
            debug!(pod = name, namespace, "Pod already deleted");
            return Ok(());
        };
        if is_terminating(&pod) {
            debug!(pod = name, namespace, "Pod is already terminating");
            return Ok(());
        }

        let outcome = delete_if_present(&api, name).await;
        report_deletion(self.recorder.as_ref(), job, namespace, name, outcome, &POD_REASONS).await
    }
}

pub struct KubeServiceControl {
    client: Client,
    recorder: Arc<dyn EventRecorder>,
}

impl KubeServiceControl {
    pub fn new(client: Client, recorder: Arc<dyn EventRecorder>) -> Self {
        Self { client, recorder }
    }
}

#[async_trait]
impl ServiceControl for KubeServiceControl {
    async fn delete_service(&self, namespace: &str, name: &str, job: &TFJob) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);

        let outcome = delete_if_present(&api, name).await;
        report_deletion(self.recorder.as_ref(), job, namespace, name, outcome, &SERVICE_REASONS).await
    }
}

pub struct KubePodLister {
    client: Client,
}

impl KubePodLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLister for KubePodLister {
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(pods.items)
    }
}

pub struct KubePdbControl {
    client: Client,
}

impl KubePdbControl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PdbControl for KubePdbControl {
    async fn get_pdb(&self, namespace: &str, name: &str) -> Result<Option<PodDisruptionBudget>> {
        let api: Api<PodDisruptionBudget> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn delete_pdb(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<PodDisruptionBudget> = Api::namespaced(self.client.clone(), namespace);
        if !delete_if_present(&api, name).await? {
            debug!(pdb = name, namespace, "PodDisruptionBudget already deleted");
        }
        Ok(())
    }
}
