use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::client::{ClientConfig, RateLimitedClient};
use crate::rate::RateMeter;
use crate::request::{ApiRequest, ApiResponse};
use crate::{CancelFlag, ClientError};

/// How often a blocked completion wait re-checks the cancel flag.
const COMPLETION_POLL: Duration = Duration::from_millis(500);

/// Pool construction settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub client: ClientConfig,
}

/// A finished request, tagged with the identifier given at submission.
#[derive(Debug)]
pub struct Completion {
    pub tag: u64,
    pub result: Result<ApiResponse, ClientError>,
}

struct Job {
    tag: u64,
    request: ApiRequest,
}

struct Worker {
    jobs: Sender<Job>,
    handle: JoinHandle<()>,
}

/// Round-robins requests across N rate-limited workers sharing one meter.
///
/// Each worker serializes its own sends and honors its delay independently;
/// the shared meter bounds the aggregate request rate. Finished responses
/// arrive on the completion channel in completion order.
pub struct ClientPool {
    workers: Vec<Worker>,
    completions: Receiver<Completion>,
    cancel: CancelFlag,
    cursor: usize,
    closed: bool,
}

impl ClientPool {
    pub fn new(config: &PoolConfig, meter: Arc<RateMeter>) -> Result<Self, ClientError> {
        let worker_count = config.workers.max(1);
        let cancel = CancelFlag::new();
        let (completion_tx, completions) = mpsc::channel();

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let mut client = RateLimitedClient::new(&config.client, Arc::clone(&meter))?;
            let (job_tx, job_rx) = mpsc::channel::<Job>();
            let tx = completion_tx.clone();
            let worker_cancel = cancel.clone();
            let handle = std::thread::Builder::new()
                .name(format!("vx-http-{id}"))
                .spawn(move || worker_loop(&mut client, &job_rx, &tx, &worker_cancel))
                .map_err(ClientError::Spawn);
            match handle {
                Ok(handle) => workers.push(Worker {
                    jobs: job_tx,
                    handle,
                }),
                Err(err) => {
                    cancel.set();
                    for worker in workers.drain(..) {
                        drop(worker.jobs);
                        let _ = worker.handle.join();
                    }
                    return Err(err);
                }
            }
        }
        drop(completion_tx);

        Ok(Self {
            workers,
            completions,
            cancel,
            cursor: 0,
            closed: false,
        })
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Hands the request to the next worker in round-robin order.
    pub fn submit(&mut self, tag: u64, request: ApiRequest) -> Result<(), ClientError> {
        if self.closed || self.cancel.is_set() {
            return Err(ClientError::Cancelled);
        }
        let worker = &self.workers[self.cursor % self.workers.len()];
        self.cursor = (self.cursor + 1) % self.workers.len();
        worker
            .jobs
            .send(Job { tag, request })
            .map_err(|_| ClientError::Cancelled)
    }

    /// Blocks until any in-flight request finishes.
    ///
    /// Returns `Cancelled` if the pool is shut down (or every worker has
    /// exited) before a completion arrives.
    pub fn next_completion(&self) -> Result<Completion, ClientError> {
        loop {
            match self.completions.recv_timeout(COMPLETION_POLL) {
                Ok(completion) => return Ok(completion),
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_set() {
                        return Err(ClientError::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ClientError::Cancelled),
            }
        }
    }

    /// Cancels pending work and joins every worker.
    ///
    /// Queued jobs that have not reached the wire are reported back as
    /// `Cancelled` completions; nothing further touches the network.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.set();
        for worker in self.workers.drain(..) {
            drop(worker.jobs);
            let _ = worker.handle.join();
        }
    }
}

impl Drop for ClientPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    client: &mut RateLimitedClient,
    jobs: &Receiver<Job>,
    completions: &Sender<Completion>,
    cancel: &CancelFlag,
) {
    while let Ok(job) = jobs.recv() {
        let result = if cancel.is_set() {
            Err(ClientError::Cancelled)
        } else {
            client.execute(&job.request, cancel)
        };
        if completions
            .send(Completion {
                tag: job.tag,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}
