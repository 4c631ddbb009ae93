use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::error::ValidationError;
use super::message::validate_message;
use crate::core::util::FarcasterTime;
use crate::proto;
use crate::proto::FarcasterNetwork;

struct ValidationJob {
    id: u64,
    message: proto::Message,
    current_time: FarcasterTime,
}

/// Offloads the CPU-heavy message checks (hashing, signature verification) to
/// dedicated OS threads. Jobs carry a monotonic id and rejoin through a
/// pending map, so a caller that gives up on a job simply orphans its entry;
/// the late result is logged and dropped.
pub struct ValidationWorkerPool {
    workers: Vec<mpsc::UnboundedSender<ValidationJob>>,
    next_job_id: AtomicU64,
    next_worker: AtomicUsize,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), ValidationError>>>>>,
}

impl ValidationWorkerPool {
    pub fn new(num_workers: usize, network: FarcasterNetwork) -> Self {
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), ValidationError>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (result_tx, mut result_rx) =
            mpsc::unbounded_channel::<(u64, Result<(), ValidationError>)>();

        let mut workers = Vec::with_capacity(num_workers);
        for i in 0..num_workers.max(1) {
            let (job_tx, mut job_rx) = mpsc::unbounded_channel::<ValidationJob>();
            let result_tx = result_tx.clone();
            std::thread::Builder::new()
                .name(format!("msg-validation-{}", i))
                .spawn(move || {
                    while let Some(job) = job_rx.blocking_recv() {
                        let result = validate_message(&job.message, network, &job.current_time);
                        if result_tx.send((job.id, result)).is_err() {
                            return;
                        }
                    }
                })
                .expect("failed to spawn validation worker");
            workers.push(job_tx);
        }

        let pending_for_results = pending.clone();
        tokio::spawn(async move {
            while let Some((job_id, result)) = result_rx.recv().await {
                let waiter = pending_for_results.lock().unwrap().remove(&job_id);
                match waiter {
                    Some(tx) => {
                        // A closed receiver means the caller was cancelled
                        // after dispatch. Nothing to deliver.
                        let _ = tx.send(result);
                    }
                    None => {
                        warn!(job_id, "Discarding validation result with no waiter");
                    }
                }
            }
        });

        ValidationWorkerPool {
            workers,
            next_job_id: AtomicU64::new(1),
            next_worker: AtomicUsize::new(0),
            pending,
        }
    }

    pub async fn validate(&self, message: &proto::Message) -> Result<(), ValidationError> {
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(job_id, tx);

        let worker_index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let job = ValidationJob {
            id: job_id,
            message: message.clone(),
            current_time: FarcasterTime::current(),
        };
        if self.workers[worker_index].send(job).is_err() {
            self.pending.lock().unwrap().remove(&job_id);
            return Err(ValidationError::PoolShutdown);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ValidationError::PoolShutdown),
        }
    }
}
