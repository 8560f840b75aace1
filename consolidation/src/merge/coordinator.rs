//! Merge task dispatch
//!
//! The coordinator owns the `task id -> destination geometry` map and
//! installs outputs as they arrive; completion order does not matter
//! because destinations are disjoint. With `workers == 0` tasks run
//! inline on the calling thread; otherwise a short-lived named worker
//! pool drains a shared task channel. If the pool cannot be spawned the
//! coordinator silently falls back to inline execution.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use hashbrown::HashMap;
use tracing::{debug, warn};
use vantage_common::GeometryBuffer;

use crate::error::ConsolidationError;

use super::task::{MergeOutput, MergeTask};

/// Dispatches merge tasks and installs their outputs
pub struct MergeCoordinator {
    workers: usize,
    queue: Vec<MergeTask>,
    destinations: HashMap<u32, GeometryBuffer>,
}

impl MergeCoordinator {
    /// `workers == 0` runs every task inline
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue: Vec::new(),
            destinations: HashMap::new(),
        }
    }

    /// Stage a task together with the geometry its output lands in
    pub fn enqueue(&mut self, task: MergeTask, destination: GeometryBuffer) {
        debug_assert!(!self.destinations.contains_key(&task.task_id));
        self.destinations.insert(task.task_id, destination);
        self.queue.push(task);
    }

    pub fn task_count(&self) -> usize {
        self.queue.len()
    }

    /// Run all staged tasks to completion and hand back the filled
    /// destinations keyed by task id
    ///
    /// A worker pool that dies before delivering every output is a fatal
    /// [`ConsolidationError::WorkerTask`]; partial outputs are dropped
    /// with the coordinator.
    pub fn run(mut self) -> Result<HashMap<u32, GeometryBuffer>, ConsolidationError> {
        if self.queue.is_empty() {
            return Ok(self.destinations);
        }
        if self.workers == 0 {
            return Ok(self.run_inline());
        }
        self.run_pool()
    }

    fn run_inline(mut self) -> HashMap<u32, GeometryBuffer> {
        let tasks = std::mem::take(&mut self.queue);
        for task in tasks {
            let output = task.run();
            install(&mut self.destinations, output);
        }
        self.destinations
    }

    fn run_pool(mut self) -> Result<HashMap<u32, GeometryBuffer>, ConsolidationError> {
        let total = self.queue.len();
        let (task_tx, task_rx) = mpsc::channel::<MergeTask>();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (out_tx, out_rx) = mpsc::channel::<MergeOutput>();

        let worker_count = self.workers.min(total);
        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = Arc::clone(&task_rx);
            let tx = out_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("geom-merge-{i}"))
                .spawn(move || {
                    loop {
                        let task = match rx.lock() {
                            Ok(guard) => guard.recv(),
                            Err(_) => break,
                        };
                        let Ok(task) = task else { break };
                        if tx.send(task.run()).is_err() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!("failed to spawn merge worker: {err}"),
            }
        }

        if handles.is_empty() {
            warn!("no merge workers available; merging on the control thread");
            return Ok(self.run_inline());
        }

        debug!(tasks = total, workers = handles.len(), "dispatching merge tasks");

        for task in std::mem::take(&mut self.queue) {
            // Send can only fail if every worker died; the receive loop
            // below reports that as the task failure.
            let _ = task_tx.send(task);
        }
        drop(task_tx);
        drop(out_tx);

        let mut received = 0usize;
        while received < total {
            match out_rx.recv() {
                Ok(output) => {
                    install(&mut self.destinations, output);
                    received += 1;
                }
                Err(_) => break,
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        if received < total {
            return Err(ConsolidationError::WorkerTask {
                missing: total - received,
                total,
            });
        }

        debug!(tasks = total, "all merge outputs installed");
        Ok(self.destinations)
    }
}

fn install(destinations: &mut HashMap<u32, GeometryBuffer>, output: MergeOutput) {
    if let Some(dest) = destinations.get_mut(&output.task_id) {
        dest.vb = Arc::new(output.vb);
        dest.vertex_ids = Some(output.vertex_ids);
    } else {
        warn!(task_id = output.task_id, "merge output for unknown task");
    }
}
