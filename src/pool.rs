//! Worker pool running scoring tasks off the interactive thread.
//!
//! The pool has a fixed number of workers, a free-list of idle ones and a single FIFO queue
//! of pending tasks. A worker runs one task at a time; when it finishes and the queue is not
//! empty, it takes the next task itself instead of going back to the free-list.
//!
//! Workers share nothing with the caller: a task carries an owned copy of the items and
//! hands an owned response to its completion callback.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use kanal::Sender;
use tokio::sync::oneshot;

use crate::error::FilterError;
use crate::scorer::{LexicalScorer, ScoreRequest, ScoreResponse, Scorer};

/// Outcome of one scoring task
pub type TaskResult = Result<ScoreResponse, FilterError>;

type Completion = Box<dyn FnOnce(TaskResult) + Send + 'static>;

//------------------------------------------------------------------------------
/// One scoring request and its completion callback.
///
/// The callback fires exactly once, with the response or the error. Tasks are never retried;
/// a task dropped before running completes with [`FilterError::PoolClosed`].
#[derive(derive_more::Debug)]
pub struct WorkerTask {
    payload: ScoreRequest,
    #[debug(skip)]
    on_complete: Option<Completion>,
}

impl WorkerTask {
    /// Creates a task calling `on_complete` when done
    pub fn new<C>(payload: ScoreRequest, on_complete: C) -> Self
    where
        C: FnOnce(TaskResult) + Send + 'static,
    {
        Self {
            payload,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn complete(mut self, result: TaskResult) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(result);
        }
    }
}

impl Drop for WorkerTask {
    fn drop(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(Err(FilterError::PoolClosed));
        }
    }
}

#[derive(Default)]
struct Scheduler {
    idle: Vec<usize>,
    queue: VecDeque<WorkerTask>,
    closed: bool,
}

struct Shared {
    scheduler: Mutex<Scheduler>,
    in_flight: AtomicUsize,
    scorer: Arc<dyn Scorer>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Scheduler> {
        // tasks never run under the lock, a poisoned guard still holds consistent state
        self.scheduler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//------------------------------------------------------------------------------
/// A fixed-size pool of scoring workers
pub struct WorkerPool {
    shared: Arc<Shared>,
    senders: Vec<Sender<WorkerTask>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `size` workers running the default [`LexicalScorer`]
    pub fn new(size: usize) -> Result<Self, FilterError> {
        Self::with_scorer(size, Arc::new(LexicalScorer))
    }

    /// Start `size` workers running `scorer`. A size of 0 is raised to 1.
    pub fn with_scorer(size: usize, scorer: Arc<dyn Scorer>) -> Result<Self, FilterError> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            scheduler: Mutex::new(Scheduler {
                idle: (0..size).rev().collect(),
                ..Default::default()
            }),
            in_flight: AtomicUsize::new(0),
            scorer,
        });

        let mut senders = Vec::with_capacity(size);
        let mut threads = Vec::with_capacity(size);
        for index in 0..size {
            let (tx, rx) = kanal::unbounded::<WorkerTask>();
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("filter-worker-{index}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        work(index, task, &shared);
                    }
                    debug!("worker {index}: channel closed, exiting");
                })?;
            senders.push(tx);
            threads.push(handle);
        }
        debug!("worker pool started with {size} workers");

        Ok(Self {
            shared,
            senders,
            threads,
        })
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Number of tasks currently executing
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Number of tasks waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Hand `task` to an idle worker, or queue it.
    pub fn submit_task(&self, task: WorkerTask) {
        let mut scheduler = self.shared.lock();
        if scheduler.closed {
            drop(scheduler);
            task.complete(Err(FilterError::PoolClosed));
            return;
        }

        match scheduler.idle.pop() {
            Some(index) => {
                self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
                drop(scheduler);
                trace!("task dispatched to worker {index}");
                if let Err(err) = self.senders[index].send(task) {
                    // the task was dropped with the channel and completed as closed
                    warn!("worker {index} unreachable: {err}");
                    self.shared.lock().idle.push(index);
                    self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                }
            }
            None => {
                scheduler.queue.push_back(task);
                trace!("all workers busy, {} task(s) queued", scheduler.queue.len());
            }
        }
    }

    /// Submit a scoring request and wait for its response.
    ///
    /// There is no cancellation: dropping the future discards the result, the worker still
    /// runs the task to completion.
    pub fn submit(&self, payload: ScoreRequest) -> impl Future<Output = TaskResult> + 'static {
        let (tx, rx) = oneshot::channel();
        self.submit_task(WorkerTask::new(payload, move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.unwrap_or(Err(FilterError::PoolClosed)) }
    }
}

fn work(index: usize, mut task: WorkerTask, shared: &Shared) {
    loop {
        let result = panic::catch_unwind(AssertUnwindSafe(|| shared.scorer.score(&task.payload)))
            .map_err(|payload| {
                let message = panic_message(payload.as_ref());
                warn!("worker {index}: scoring task panicked: {message}");
                FilterError::WorkerPanicked(message)
            });
        if panic::catch_unwind(AssertUnwindSafe(|| task.complete(result))).is_err() {
            warn!("worker {index}: completion callback panicked");
        }

        let mut scheduler = shared.lock();
        match scheduler.queue.pop_front() {
            Some(next) => task = next,
            None => {
                scheduler.idle.push(index);
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let pending: Vec<WorkerTask> = {
            let mut scheduler = self.shared.lock();
            scheduler.closed = true;
            scheduler.queue.drain(..).collect()
        };
        for task in pending {
            task.complete(Err(FilterError::PoolClosed));
        }

        self.senders.clear();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}
