//! Cascading cleanup of the pods, services and PodDisruptionBudget owned by
//! a terminated TFJob.
//!
//! Both operations are safe to retry from the top: the control
//! implementations treat deleting an absent object as success.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::control::{PdbControl, PodControl, ServiceControl};
use crate::crd::{CleanPodPolicy, TFJob};
use crate::events::{reasons, EventRecorder};
use crate::{Error, Result};

pub struct Cleaner {
    pod_control: Arc<dyn PodControl>,
    service_control: Arc<dyn ServiceControl>,
    pdb_control: Arc<dyn PdbControl>,
    recorder: Arc<dyn EventRecorder>,
}

impl Cleaner {
    pub fn new(
        pod_control: Arc<dyn PodControl>,
        service_control: Arc<dyn ServiceControl>,
        pdb_control: Arc<dyn PdbControl>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            pod_control,
            service_control,
            pdb_control,
            recorder,
        }
    }

    /// Deletes the PodDisruptionBudget named after the job, if there is one.
    pub async fn delete_pdb(&self, job: &TFJob) -> Result<()> {
        let name = job.name_any();
        let namespace = job.namespace().unwrap_or_default();

        if self.pdb_control.get_pdb(&namespace, &name).await?.is_none() {
            debug!(job = %name, namespace = %namespace, "No PodDisruptionBudget to delete");
            return Ok(());
        }

        self.recorder
            .record(
                job,
                EventType::Normal,
                reasons::TFJOB_TERMINATED,
                "TFJob is terminated, deleting pdb".to_string(),
            )
            .await;
        info!(job = %name, namespace = %namespace, "Deleting pdb {}", name);

        if let Err(e) = self.pdb_control.delete_pdb(&namespace, &name).await {
            self.recorder
                .record(job, EventType::Warning, reasons::FAILED_DELETE_PDB, format!("Error deleting: {}", e))
                .await;
            return Err(Error::DeletePdb(Box::new(e)));
        }

        self.recorder
            .record(job, EventType::Normal, reasons::SUCCESSFUL_DELETE_PDB, format!("Deleted pdb: {}", name))
            .await;
        Ok(())
    }

    /// Deletes the job's pods and their co-named services as its
    /// `cleanPodPolicy` dictates. Stops at the first failed delete.
    pub async fn delete_pods_and_services(&self, job: &TFJob, pods: &[Pod]) -> Result<()> {
        if pods.is_empty() {
            return Ok(());
        }

        self.recorder
            .record(
                job,
                EventType::Normal,
                reasons::TFJOB_TERMINATED,
                "TFJob is terminated, deleting pods and services".to_string(),
            )
            .await;

        let policy = job.clean_pod_policy();
        if policy == CleanPodPolicy::None {
            return Ok(());
        }

        for pod in pods {
            let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
            if !policy.should_delete(phase) {
                debug!(job = %job.name_any(), pod = %pod.name_any(), ?phase, "Keeping pod");
                continue;
            }

            let namespace = pod.namespace().unwrap_or_default();
            let name = pod.name_any();
            self.pod_control.delete_pod(&namespace, &name, job).await?;
            // Pods and their services share a name.
            self.service_control.delete_service(&namespace, &name, job).await?;
        }
        Ok(())
    }
}
