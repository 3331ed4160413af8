//! Pending pod buffer
//!
//! Accumulates pods delivered by the watch between scheduling rounds. The
//! lock guards only the append and the swap-out on drain; it is never held
//! while optimizing or talking to the API server.

use crate::models::PodRef;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Concurrency-safe accumulator of pods awaiting a scheduling round
#[derive(Debug)]
pub struct PodBuffer {
    /// Scheduler name a pod must request to be accepted
    scheduler_name: String,
    pods: Mutex<Vec<PodRef>>,
}

impl PodBuffer {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
            pods: Mutex::new(Vec::new()),
        }
    }

    pub fn scheduler_name(&self) -> &str {
        &self.scheduler_name
    }

    /// Append a pod if it requests this scheduler
    ///
    /// Returns `true` when the pod was buffered.
    pub fn enqueue(&self, pod: PodRef) -> bool {
        if pod.scheduler_name != self.scheduler_name {
            debug!(pod = %pod, scheduler = %pod.scheduler_name, "Ignoring pod for another scheduler");
            return false;
        }

        self.lock().push(pod);
        true
    }

    /// Remove and return every buffered pod, leaving the buffer empty
    pub fn drain_all(&self) -> Vec<PodRef> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking producer cannot leave the Vec half-written, so poisoning is
    // safe to clear.
    fn lock(&self) -> MutexGuard<'_, Vec<PodRef>> {
        self.pods.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
