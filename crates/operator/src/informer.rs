//! Watches TFJobs as untyped objects, mirrors them into a reflector store and
//! feeds add/update notifications to the [`JobEventHandler`].

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::crd::TFJob;
use crate::ingress::JobEventHandler;

pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(30);

pub struct TFJobInformer {
    api: Api<DynamicObject>,
    resource: ApiResource,
    writer: Writer<DynamicObject>,
    resync_period: Duration,
}

impl TFJobInformer {
    /// `namespace` of `None` watches every namespace.
    pub fn new(client: Client, namespace: Option<&str>, resync_period: Duration) -> Self {
        let resource = TFJob::api_resource();
        let api = match namespace {
            Some(ns) => Api::namespaced_with(client, ns, &resource),
            None => Api::all_with(client, &resource),
        };
        Self {
            api,
            writer: Writer::new(resource.clone()),
            resource,
            resync_period,
        }
    }

    /// Read handle on the mirrored objects.
    pub fn store(&self) -> Store<DynamicObject> {
        self.writer.as_reader()
    }

    pub fn resource(&self) -> ApiResource {
        self.resource.clone()
    }

    /// Runs until the watch stream ends.
    pub async fn run(mut self, handler: Arc<JobEventHandler>) {
        info!(resync = ?self.resync_period, "Starting TFJob informer");

        let mut events = watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut resync = tokio::time::interval(self.resync_period);
        // The first tick fires immediately, before anything is cached.
        resync.tick().await;

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(event)) => self.dispatch(event, &handler).await,
                    Some(Err(e)) => warn!(error = %e, "TFJob watch failed"),
                    None => break,
                },
                _ = resync.tick() => self.resync(&handler),
            }
        }
        info!("TFJob informer stopped");
    }

    async fn dispatch(&mut self, event: watcher::Event<DynamicObject>, handler: &JobEventHandler) {
        let store = self.writer.as_reader();
        let seen: Vec<(Option<Arc<DynamicObject>>, DynamicObject)> = match &event {
            watcher::Event::Applied(obj) => vec![(self.cached(&store, obj), obj.clone())],
            watcher::Event::Restarted(objs) => objs
                .iter()
                .map(|obj| (self.cached(&store, obj), obj.clone()))
                .collect(),
            watcher::Event::Deleted(obj) => {
                debug!(job = %obj.name_any(), "TFJob deleted");
                Vec::new()
            }
        };
        self.writer.apply_watcher_event(&event);

        for (old, mut obj) in seen {
            match old {
                Some(old) => handler.on_update(&old, &obj),
                None => {
                    handler.on_add(&mut obj).await;
                    // Keep what the handler wrote back visible to cache readers.
                    self.writer.apply_watcher_event(&watcher::Event::Applied(obj));
                }
            }
        }
    }

    fn cached(&self, store: &Store<DynamicObject>, obj: &DynamicObject) -> Option<Arc<DynamicObject>> {
        store.get(&ObjectRef::from_obj_with(obj, self.resource.clone()))
    }

    fn resync(&self, handler: &JobEventHandler) {
        let objects = self.writer.as_reader().state();
        debug!(count = objects.len(), "Resyncing TFJobs");
        for obj in objects {
            handler.on_update(&obj, &obj);
        }
    }
}
