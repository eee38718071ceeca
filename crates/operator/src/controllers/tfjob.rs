use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, error, info};

use crate::cache::JobCache;
use crate::cleanup::Cleaner;
use crate::control::PodLister;
use crate::crd::TFJob;
use crate::queue::{KeyQueue, WorkQueue};
use crate::Result;

pub const LABEL_GROUP_NAME: &str = "group_name";
pub const LABEL_TFJOB_NAME: &str = "tf_job_name";
pub const GROUP_NAME: &str = "kubeflow.org";

const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Labels every pod and service created for `job` carries.
pub fn gen_labels(job_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_GROUP_NAME.to_string(), GROUP_NAME.to_string()),
        (LABEL_TFJOB_NAME.to_string(), job_name.replace('/', "-")),
    ])
}

fn label_selector(job_name: &str) -> String {
    gen_labels(job_name)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Drains the work queue. For each finished job it removes the dependents
/// its cleanup policy selects.
pub struct TFJobController {
    cache: JobCache,
    cleaner: Cleaner,
    pods: Arc<dyn PodLister>,
    queue: Arc<KeyQueue>,
}

impl TFJobController {
    pub fn new(cache: JobCache, cleaner: Cleaner, pods: Arc<dyn PodLister>, queue: Arc<KeyQueue>) -> Self {
        Self {
            cache,
            cleaner,
            pods,
            queue,
        }
    }

    pub async fn run(self: Arc<Self>, workers: usize) {
        info!(workers, "Starting TFJob controller");

        let handles: Vec<_> = (0..workers.max(1))
            .map(|_| {
                let ctrl = self.clone();
                tokio::spawn(async move { ctrl.run_worker().await })
            })
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "TFJob worker panicked");
            }
        }
    }

    async fn run_worker(&self) {
        while let Some(key) = self.queue.next().await {
            let result = self.sync_tfjob(&key).await;
            self.queue.done(&key);
            if let Err(e) = result {
                error!(key = %key, error = %e, "Error syncing tfjob, retrying in {:?}", RETRY_DELAY);
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(RETRY_DELAY).await;
                    queue.add(key);
                });
            }
        }
    }

    pub async fn sync_tfjob(&self, key: &str) -> Result<()> {
        let job = match self.cache.get_job_from_key(key) {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                debug!(key, "TFJob has been deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !job.is_finished() {
            debug!(key, "TFJob is still active, nothing to clean up");
            return Ok(());
        }

        let pods = self.get_pods_for_job(&job).await?;
        info!(key, pods = pods.len(), policy = ?job.clean_pod_policy(), "Cleaning up finished TFJob");
        self.cleaner.delete_pods_and_services(&job, &pods).await?;
        self.cleaner.delete_pdb(&job).await
    }

    /// Pods labelled for `job`. When the job has a UID, only pods it controls.
    async fn get_pods_for_job(&self, job: &TFJob) -> Result<Vec<Pod>> {
        let namespace = job.namespace().unwrap_or_default();
        let pods = self.pods.list_pods(&namespace, &label_selector(&job.name_any())).await?;

        let Some(uid) = job.uid() else {
            return Ok(pods);
        };
        Ok(pods
            .into_iter()
            .filter(|pod| {
                pod.owner_references()
                    .iter()
                    .any(|r| r.uid == uid && r.controller == Some(true))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockIndexer;
    use crate::control::{MockPdbControl, MockPodControl, MockPodLister, MockServiceControl};
    use crate::events::MockEventRecorder;
    use kube::api::DynamicObject;
    use serde_json::json;

    fn generic(conditions: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "kubeflow.org/v1alpha2",
            "kind": "TFJob",
            "metadata": { "name": "train-1", "namespace": "ns" },
            "spec": {
                "cleanPodPolicy": "All",
                "tfReplicaSpecs": {
                    "Worker": { "template": { "spec": { "containers": [{ "name": "tensorflow", "image": "tf" }] } } }
                }
            },
            "status": { "conditions": conditions }
        }))
        .unwrap()
    }

    fn condition(type_: &str) -> serde_json::Value {
        json!({
            "type": type_,
            "status": "True",
            "reason": "",
            "message": "",
            "lastUpdateTime": "2024-01-01T00:00:00Z",
            "lastTransitionTime": "2024-01-01T00:00:00Z"
        })
    }

    fn controller(
        indexer: MockIndexer,
        lister: MockPodLister,
        pods: MockPodControl,
        services: MockServiceControl,
        pdbs: MockPdbControl,
        recorder: MockEventRecorder,
    ) -> TFJobController {
        let cleaner = Cleaner::new(Arc::new(pods), Arc::new(services), Arc::new(pdbs), Arc::new(recorder));
        TFJobController::new(
            JobCache::new(Arc::new(indexer)),
            cleaner,
            Arc::new(lister),
            Arc::new(KeyQueue::new()),
        )
    }

    #[test]
    fn test_label_selector() {
        assert_eq!(label_selector("train-1"), "group_name=kubeflow.org,tf_job_name=train-1");
    }

    #[tokio::test]
    async fn test_deleted_job_is_skipped() {
        let mut indexer = MockIndexer::new();
        indexer.expect_get_by_key().returning(|_| Ok(None));
        let ctrl = controller(
            indexer,
            MockPodLister::new(),
            MockPodControl::new(),
            MockServiceControl::new(),
            MockPdbControl::new(),
            MockEventRecorder::new(),
        );
        assert!(ctrl.sync_tfjob("ns/train-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_active_job_is_left_alone() {
        let mut indexer = MockIndexer::new();
        indexer
            .expect_get_by_key()
            .returning(|_| Ok(Some(Arc::new(generic(json!([condition("Created"), condition("Running")]))))));
        let ctrl = controller(
            indexer,
            MockPodLister::new(),
            MockPodControl::new(),
            MockServiceControl::new(),
            MockPdbControl::new(),
            MockEventRecorder::new(),
        );
        assert!(ctrl.sync_tfjob("ns/train-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_finished_job_is_cleaned_up() {
        let mut indexer = MockIndexer::new();
        indexer
            .expect_get_by_key()
            .returning(|_| Ok(Some(Arc::new(generic(json!([condition("Created"), condition("Succeeded")]))))));
        let mut lister = MockPodLister::new();
        lister
            .expect_list_pods()
            .withf(|ns, selector| ns == "ns" && selector.contains("tf_job_name=train-1"))
            .times(1)
            .returning(|_, _| {
                Ok(vec![Pod {
                    metadata: kube::api::ObjectMeta {
                        name: Some("train-1-worker-0".to_string()),
                        namespace: Some("ns".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }])
            });
        let mut pods = MockPodControl::new();
        pods.expect_delete_pod()
            .withf(|_, name, _| name == "train-1-worker-0")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut services = MockServiceControl::new();
        services
            .expect_delete_service()
            .withf(|_, name, _| name == "train-1-worker-0")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut pdbs = MockPdbControl::new();
        pdbs.expect_get_pdb().times(1).returning(|_, _| Ok(None));
        let mut recorder = MockEventRecorder::new();
        recorder.expect_record().times(1).return_const(());

        let ctrl = controller(indexer, lister, pods, services, pdbs, recorder);
        assert!(ctrl.sync_tfjob("ns/train-1").await.is_ok());
    }
}
