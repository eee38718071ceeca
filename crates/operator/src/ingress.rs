//! Entry points the informer calls for TFJob add/update notifications.
//!
//! Handlers never return errors: a failure ends the current notification and
//! is reported through logs and job events.

use std::sync::Arc;

use kube::api::DynamicObject;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use crate::cache::key_for;
use crate::codec;
use crate::conditions::{append_condition, TFJOB_CREATED_REASON};
use crate::crd::{Defaulter, TFJobConditionType};
use crate::events::{reasons, EventRecorder};
use crate::queue::WorkQueue;

pub struct JobEventHandler {
    defaulter: Arc<dyn Defaulter>,
    recorder: Arc<dyn EventRecorder>,
    queue: Arc<dyn WorkQueue>,
}

impl JobEventHandler {
    pub fn new(
        defaulter: Arc<dyn Defaulter>,
        recorder: Arc<dyn EventRecorder>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            defaulter,
            recorder,
            queue,
        }
    }

    /// A TFJob appeared: default it, record `Created`, write it back into
    /// `obj` and queue it.
    pub async fn on_add(&self, obj: &mut DynamicObject) {
        let mut job = match codec::decode(obj) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to convert the TFJob");
                let msg = format!("Failed to unmarshal the object to TFJob object: {}", e);
                warn!(job = %e.job.name_any(), "{}", msg);
                self.recorder
                    .record(&e.job, EventType::Warning, reasons::FAILED_MARSHAL_TFJOB, msg)
                    .await;
                return;
            }
        };

        self.defaulter.default_job(&mut job);

        let msg = format!("TFJob {} is created.", job.name_any());
        info!(job = %job.key(), "{}", msg);

        if let Err(e) = append_condition(&mut job, TFJobConditionType::Created, TFJOB_CREATED_REASON, &msg) {
            error!(job = %job.key(), error = %e, "Append tfJob condition error");
            return;
        }

        if let Err(e) = codec::encode(&job, obj) {
            error!(job = %job.key(), error = %e, "Failed to convert the obj");
            return;
        }
        self.enqueue(obj);
    }

    /// A TFJob changed. Only its identity matters here; the worker works out
    /// what changed.
    pub fn on_update(&self, old: &DynamicObject, new: &DynamicObject) {
        let old_job = match codec::decode(old) {
            Ok(job) => job,
            Err(_) => return,
        };
        info!(job = %old_job.key(), "Updating tfjob: {}", old_job.name_any());
        self.enqueue(new);
    }

    fn enqueue(&self, obj: &DynamicObject) {
        match key_for(obj) {
            Ok(key) => {
                debug!(key = %key, "Enqueueing tfjob");
                self.queue.add(key);
            }
            Err(e) => error!(error = %e, "Couldn't get key for object"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::crd::{CleanPodPolicy, TFJobDefaulter};
    use crate::events::MockEventRecorder;
    use crate::queue::MockWorkQueue;
    use serde_json::json;

    fn generic(spec: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "kubeflow.org/v1alpha2",
            "kind": "TFJob",
            "metadata": { "name": "train-1", "namespace": "ns" },
            "spec": spec
        }))
        .unwrap()
    }

    fn valid_spec() -> serde_json::Value {
        json!({
            "tfReplicaSpecs": {
                "Worker": { "template": { "spec": { "containers": [{ "name": "tensorflow", "image": "tf" }] } } }
            }
        })
    }

    fn invalid_spec() -> serde_json::Value {
        json!({ "tfReplicaSpecs": { "Worker": { "template": { "spec": { "containers": [] } } } } })
    }

    fn handler(recorder: MockEventRecorder, queue: MockWorkQueue) -> JobEventHandler {
        JobEventHandler::new(Arc::new(TFJobDefaulter), Arc::new(recorder), Arc::new(queue))
    }

    #[tokio::test]
    async fn test_add_records_created_and_enqueues() {
        let mut queue = MockWorkQueue::new();
        queue
            .expect_add()
            .withf(|key| key == "ns/train-1")
            .times(1)
            .return_const(());
        let handler = handler(MockEventRecorder::new(), queue);

        let mut obj = generic(valid_spec());
        handler.on_add(&mut obj).await;

        let job = decode(&obj).unwrap();
        assert_eq!(job.spec.clean_pod_policy, Some(CleanPodPolicy::All));
        let conditions = job.status.unwrap().conditions;
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].condition_type, TFJobConditionType::Created);
        assert_eq!(conditions[0].message, "TFJob train-1 is created.");
    }

    #[tokio::test]
    async fn test_add_unprocessable_payload_warns_once_without_enqueue() {
        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_record()
            .withf(|job, type_, reason, _| {
                job.name_any() == "train-1"
                    && matches!(type_, EventType::Warning)
                    && reason == reasons::FAILED_MARSHAL_TFJOB
            })
            .times(1)
            .return_const(());
        let mut queue = MockWorkQueue::new();
        queue.expect_add().times(0);
        let handler = handler(recorder, queue);

        let mut obj = generic(invalid_spec());
        let before = obj.clone();
        handler.on_add(&mut obj).await;
        assert_eq!(obj.data, before.data);
    }

    #[tokio::test]
    async fn test_add_with_future_condition_is_abandoned() {
        let mut queue = MockWorkQueue::new();
        queue.expect_add().times(0);
        let handler = handler(MockEventRecorder::new(), queue);

        let mut obj = generic(valid_spec());
        obj.data["status"] = json!({
            "conditions": [{
                "type": "Running",
                "status": "True",
                "reason": "TFJobRunning",
                "message": "",
                "lastUpdateTime": "2999-01-01T00:00:00Z",
                "lastTransitionTime": "2999-01-01T00:00:00Z"
            }]
        });
        let before = obj.clone();
        handler.on_add(&mut obj).await;
        assert_eq!(obj.data, before.data);
    }

    #[test]
    fn test_update_enqueues_new_key() {
        let mut queue = MockWorkQueue::new();
        queue
            .expect_add()
            .withf(|key| key == "ns/train-1")
            .times(1)
            .return_const(());
        let handler = handler(MockEventRecorder::new(), queue);

        let old = generic(valid_spec());
        let mut new = old.clone();
        new.data["spec"]["cleanPodPolicy"] = json!("None");
        handler.on_update(&old, &new);
    }

    #[test]
    fn test_update_with_unparsable_old_is_ignored() {
        let mut queue = MockWorkQueue::new();
        queue.expect_add().times(0);
        let handler = handler(MockEventRecorder::new(), queue);

        handler.on_update(&generic(invalid_spec()), &generic(valid_spec()));
    }
}
