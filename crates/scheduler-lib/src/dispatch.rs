//! Binding dispatch
//!
//! Commits one pod-to-node binding per assignment. A failed binding is
//! logged and counted for that pod only; the rest of the batch is still
//! attempted and nothing is retried or re-buffered.

use crate::error::{Result, SchedulerError};
use crate::models::{Assignment, Node, PodRef};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Binding, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::Client;
use std::sync::Arc;

/// Commits a scheduling decision to the cluster
#[async_trait]
pub trait Binder: Send + Sync {
    async fn bind(&self, pod: &PodRef, node: Node) -> Result<()>;
}

/// Binds pods through the `pods/binding` subresource
pub struct KubeBinder {
    client: Client,
}

impl KubeBinder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Core/v1 Binding targeting `node`
pub fn binding_for(pod: &PodRef, node: Node) -> Binding {
    Binding {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            namespace: Some(pod.namespace.clone()),
            ..Default::default()
        },
        target: ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Node".to_string()),
            name: Some(node.name().to_string()),
            ..Default::default()
        },
    }
}

#[async_trait]
impl Binder for KubeBinder {
    async fn bind(&self, pod: &PodRef, node: Node) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let body = serde_json::to_vec(&binding_for(pod, node))?;

        // The API server answers with a Status object, not a Binding
        pods.create_subresource::<serde_json::Value>(
            "binding",
            &pod.name,
            &PostParams::default(),
            body,
        )
        .await
        .map_err(|e| SchedulerError::Binding {
            pod: pod.to_string(),
            node: node.to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

/// Per-batch dispatch results
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub succeeded: Vec<Assignment>,
    pub failed: Vec<(Assignment, String)>,
}

impl DispatchReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

/// Applies bindings and isolates per-pod failures
pub struct Dispatcher {
    binder: Arc<dyn Binder>,
    logger: StructuredLogger,
    metrics: SchedulerMetrics,
}

impl Dispatcher {
    pub fn new(binder: Arc<dyn Binder>, logger: StructuredLogger) -> Self {
        Self {
            binder,
            logger,
            metrics: SchedulerMetrics::new(),
        }
    }

    /// Bind a single pod, logging the outcome
    pub async fn dispatch(&self, pod: &PodRef, node: Node) -> Result<()> {
        match self.binder.bind(pod, node).await {
            Ok(()) => {
                self.logger.log_binding(pod, node);
                self.metrics.inc_pods_scheduled();
                Ok(())
            }
            Err(e) => {
                self.logger.log_binding_failure(pod, node, &e.to_string());
                self.metrics.inc_binding_failures();
                Err(e)
            }
        }
    }

    /// Attempt every assignment in order, regardless of earlier failures
    pub async fn dispatch_batch(&self, assignments: Vec<Assignment>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for assignment in assignments {
            match self.dispatch(&assignment.pod, assignment.node).await {
                Ok(()) => report.succeeded.push(assignment),
                Err(e) => report.failed.push((assignment, e.to_string())),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every bind attempt and fails for pods in `failing`
    struct RecordingBinder {
        attempts: Mutex<Vec<(String, Node)>>,
        failing: Vec<String>,
    }

    impl RecordingBinder {
        fn new(failing: &[&str]) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                failing: failing.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn attempts(&self) -> Vec<(String, Node)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Binder for RecordingBinder {
        async fn bind(&self, pod: &PodRef, node: Node) -> Result<()> {
            self.attempts.lock().unwrap().push((pod.name.clone(), node));
            if self.failing.contains(&pod.name) {
                return Err(SchedulerError::Binding {
                    pod: pod.to_string(),
                    node: node.to_string(),
                    reason: "pod already bound".to_string(),
                });
            }
            Ok(())
        }
    }

    fn assignment(name: &str, node: Node) -> Assignment {
        Assignment {
            pod: PodRef::new(name, "app", "custom-scheduler"),
            node,
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let binder = Arc::new(RecordingBinder::new(&["pod-2"]));
        let dispatcher = Dispatcher::new(binder.clone(), StructuredLogger::new("test"));

        let report = dispatcher
            .dispatch_batch(vec![
                assignment("pod-1", Node::TokyoWorker1),
                assignment("pod-2", Node::MastersSlave),
                assignment("pod-3", Node::SingaporeWorker2),
            ])
            .await;

        assert_eq!(
            binder.attempts(),
            vec![
                ("pod-1".to_string(), Node::TokyoWorker1),
                ("pod-2".to_string(), Node::MastersSlave),
                ("pod-3".to_string(), Node::SingaporeWorker2),
            ]
        );
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.succeeded[0].pod.name, "pod-1");
        assert_eq!(report.succeeded[1].pod.name, "pod-3");
        assert_eq!(report.failed[0].0.pod.name, "pod-2");
        assert!(report.failed[0].1.contains("pod already bound"));
    }

    #[tokio::test]
    async fn test_single_dispatch_reports_error() {
        let binder = Arc::new(RecordingBinder::new(&["bad"]));
        let dispatcher = Dispatcher::new(binder, StructuredLogger::new("test"));

        let ok = PodRef::new("good", "app", "custom-scheduler");
        let bad = PodRef::new("bad", "app", "custom-scheduler");

        tokio_test::assert_ok!(dispatcher.dispatch(&ok, Node::MastersSlave2).await);
        let err = tokio_test::assert_err!(dispatcher.dispatch(&bad, Node::MastersSlave2).await);
        assert!(matches!(err, SchedulerError::Binding { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let binder = Arc::new(RecordingBinder::new(&[]));
        let dispatcher = Dispatcher::new(binder.clone(), StructuredLogger::new("test"));

        let report = dispatcher.dispatch_batch(Vec::new()).await;
        assert_eq!(report.success_count(), 0);
        assert!(binder.attempts().is_empty());
    }

    #[test]
    fn test_binding_body_targets_node() {
        let pod = PodRef::new("web-1", "app", "custom-scheduler");
        let binding = binding_for(&pod, Node::SingaporeWorker1);

        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["kind"], "Binding");
        assert_eq!(json["metadata"]["name"], "web-1");
        assert_eq!(json["metadata"]["namespace"], "app");
        assert_eq!(json["target"]["kind"], "Node");
        assert_eq!(json["target"]["name"], "singapore-worker1");
    }
}
