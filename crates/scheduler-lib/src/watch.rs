//! Pod discovery
//!
//! Watches unscheduled pods and feeds the ones requesting this scheduler
//! into the [`PodBuffer`]. Each pod is buffered once per appearance: status
//! updates to an already-seen pending pod are not re-enqueued.

use crate::buffer::PodBuffer;
use crate::health::{components, HealthRegistry};
use crate::models::PodRef;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::watcher::{self, watcher, Event};
use kube::Client;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Field selector matching pods with no node assigned
pub const UNSCHEDULED_SELECTOR: &str = "spec.nodeName=";

/// Turns watch events into buffered pods
pub struct PodEventHandler {
    buffer: Arc<PodBuffer>,
    /// `namespace/name` of pending pods already handed to the buffer
    seen: HashSet<String>,
}

impl PodEventHandler {
    pub fn new(buffer: Arc<PodBuffer>) -> Self {
        Self {
            buffer,
            seen: HashSet::new(),
        }
    }

    /// Apply one watch event, returning how many pods were buffered
    pub fn handle(&mut self, event: Event<Pod>) -> usize {
        match event {
            Event::Applied(pod) => usize::from(self.offer(&pod)),
            Event::Deleted(pod) => {
                if let Some(pod_ref) = PodRef::from_pod(&pod) {
                    self.seen.remove(&pod_ref.to_string());
                }
                0
            }
            Event::Restarted(pods) => {
                let listed: HashSet<String> = pods
                    .iter()
                    .filter_map(PodRef::from_pod)
                    .map(|p| p.to_string())
                    .collect();
                self.seen.retain(|key| listed.contains(key));

                pods.iter().filter(|pod| self.offer(pod)).count()
            }
        }
    }

    fn offer(&mut self, pod: &Pod) -> bool {
        let Some(pod_ref) = PodRef::from_pod(pod) else {
            return false;
        };

        let assigned = pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .is_some_and(|n| !n.is_empty());
        if assigned {
            return false;
        }

        let key = pod_ref.to_string();
        if self.seen.contains(&key) {
            return false;
        }

        if self.buffer.enqueue(pod_ref) {
            debug!(pod = %key, "Buffered pending pod");
            self.seen.insert(key);
            true
        } else {
            false
        }
    }
}

/// Long-lived watch on unscheduled pods in one namespace
pub struct PodWatcher {
    api: Api<Pod>,
    handler: PodEventHandler,
    health: HealthRegistry,
}

impl PodWatcher {
    pub fn new(
        client: Client,
        namespace: &str,
        buffer: Arc<PodBuffer>,
        health: HealthRegistry,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            handler: PodEventHandler::new(buffer),
            health,
        }
    }

    /// Consume watch events until shutdown or the stream ends
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(selector = UNSCHEDULED_SELECTOR, "Starting pod watch");

        let config = watcher::Config::default().fields(UNSCHEDULED_SELECTOR);
        let mut events = Box::pin(watcher(self.api.clone(), config));
        let mut degraded = false;

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        self.handler.handle(event);
                        if degraded {
                            self.health.set_healthy(components::WATCHER).await;
                            degraded = false;
                        }
                    }
                    Some(Err(e)) => {
                        // The watcher re-lists on its own after errors
                        warn!(error = %e, "Pod watch error");
                        self.health
                            .set_degraded(components::WATCHER, e.to_string())
                            .await;
                        degraded = true;
                    }
                    None => {
                        warn!("Pod watch stream ended");
                        self.health
                            .set_unhealthy(components::WATCHER, "Watch stream ended")
                            .await;
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down pod watch");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    const SCHEDULER: &str = "custom-scheduler";

    fn pending_pod(name: &str, scheduler: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("app".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                scheduler_name: Some(scheduler.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn handler() -> (PodEventHandler, Arc<PodBuffer>) {
        let buffer = Arc::new(PodBuffer::new(SCHEDULER));
        (PodEventHandler::new(Arc::clone(&buffer)), buffer)
    }

    #[test]
    fn test_applied_pod_is_buffered_once() {
        let (mut handler, buffer) = handler();

        assert_eq!(handler.handle(Event::Applied(pending_pod("web-1", SCHEDULER))), 1);
        // A status update for the same pending pod
        assert_eq!(handler.handle(Event::Applied(pending_pod("web-1", SCHEDULER))), 0);

        assert_eq!(buffer.drain_all().len(), 1);
    }

    #[test]
    fn test_other_scheduler_is_ignored() {
        let (mut handler, buffer) = handler();

        assert_eq!(
            handler.handle(Event::Applied(pending_pod("web-1", "default-scheduler"))),
            0
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_assigned_pod_is_ignored() {
        let (mut handler, buffer) = handler();

        let mut pod = pending_pod("web-1", SCHEDULER);
        if let Some(spec) = pod.spec.as_mut() {
            spec.node_name = Some("tokyo-worker1".to_string());
        }

        assert_eq!(handler.handle(Event::Applied(pod)), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_deleted_pod_can_be_buffered_again() {
        let (mut handler, buffer) = handler();

        handler.handle(Event::Applied(pending_pod("web-1", SCHEDULER)));
        handler.handle(Event::Deleted(pending_pod("web-1", SCHEDULER)));
        handler.handle(Event::Applied(pending_pod("web-1", SCHEDULER)));

        assert_eq!(buffer.drain_all().len(), 2);
    }

    #[test]
    fn test_restart_buffers_only_new_pods() {
        let (mut handler, buffer) = handler();

        handler.handle(Event::Applied(pending_pod("web-1", SCHEDULER)));
        handler.handle(Event::Applied(pending_pod("gone", SCHEDULER)));
        buffer.drain_all();

        let added = handler.handle(Event::Restarted(vec![
            pending_pod("web-1", SCHEDULER),
            pending_pod("web-2", SCHEDULER),
            pending_pod("other", "default-scheduler"),
        ]));

        assert_eq!(added, 1);
        assert_eq!(buffer.drain_all()[0].name, "web-2");

        // "gone" was not in the re-list, so it is forgotten
        assert_eq!(handler.handle(Event::Applied(pending_pod("gone", SCHEDULER))), 1);
    }
}
