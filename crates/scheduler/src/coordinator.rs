//! Fixed-size worker pool with a FIFO backlog.
//!
//! The [`Coordinator`] a caller holds is only an inbox. Slot and backlog state
//! live on the dispatcher thread, which handles one event at a time:
//!
//! ```text
//!   schedule() ──Command──▶ inbox ─┐
//!                                  ├─▶ Dispatcher ──run()──▶ WorkerHandle ──▶ ExecutionContext
//!   worker ticket resolved ────────┘        │                                      │
//!                                           └──◀──────────── JobOutput ────────────┘
//! ```
//!
//! After every event the dispatch step hands the oldest queued job to the
//! lowest-numbered idle slot until either runs out. Scanning always starts at
//! slot 0, so under light load low slots do more of the work.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::num::NonZeroUsize;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Select, Sender};
use renderer::{AlgorithmSpec, PixelBuffer};

use crate::context::{JobOutput, JobRequest};
use crate::error::{JobError, PoolError};
use crate::ticket::{self, Completer, Outcome, Ticket};
use crate::worker::{Running, WorkerHandle};

/// Sequence number assigned to a job when the dispatcher accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub workers: usize,
    /// Noise seed handed to every execution context.
    pub seed: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            seed: 0,
        }
    }
}

/// A finished job with its timing annotations.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub job: JobId,
    pub slot: usize,
    pub buffer: PixelBuffer,
    pub min: u8,
    pub max: u8,
    /// Renderer time measured inside the worker.
    pub runtime: Duration,
    /// Dispatch to completion.
    pub threadtime: Duration,
    /// Schedule to completion.
    pub queuetime: Duration,
    /// Position of this job in the global dispatch sequence.
    pub dispatch_order: u64,
    pub dispatched_at: Instant,
    pub completed_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub workers: usize,
    pub running: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
}

struct Job {
    request: JobRequest,
    queued_at: Instant,
    completer: Completer<RenderReport>,
}

struct QueuedJob {
    id: JobId,
    job: Job,
}

enum Command {
    Schedule(Job),
    Stats(Completer<PoolStats>),
    Shutdown,
}

struct InFlight {
    id: JobId,
    queued_at: Instant,
    dispatch_order: u64,
    completer: Completer<RenderReport>,
    running: Running,
}

enum Slot {
    Idle(WorkerHandle),
    Busy(InFlight),
    /// The context died and could not be restarted.
    Retired,
}

enum Event {
    Inbox(Option<Command>),
    Finished { slot: usize, outcome: Outcome<JobOutput> },
}

enum Watch<'a> {
    Inbox,
    Slot(usize, &'a Receiver<Outcome<JobOutput>>),
}

/// Handle on the worker pool; the only way in is [`Coordinator::schedule`].
pub struct Coordinator {
    inbox: Sender<Command>,
    workers: usize,
    dispatcher: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(options: PoolOptions) -> Result<Self, PoolError> {
        if options.workers == 0 {
            return Err(PoolError::EmptyPool);
        }
        let workers = (0..options.workers)
            .map(|slot| WorkerHandle::spawn(slot, options.seed))
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_workers(workers, options.seed)
    }

    /// Starts the dispatcher over already spawned workers, slot `i` at index `i`.
    fn with_workers(workers: Vec<WorkerHandle>, seed: u64) -> Result<Self, PoolError> {
        if workers.is_empty() {
            return Err(PoolError::EmptyPool);
        }
        let count = workers.len();
        let slots = workers.into_iter().map(Slot::Idle).collect();

        let (sender, receiver) = unbounded();
        let dispatcher = Dispatcher {
            inbox: receiver,
            slots,
            backlog: VecDeque::new(),
            accepting: true,
            next_job: 0,
            dispatched: 0,
            completed: 0,
            failed: 0,
        };
        let name = "dyntex-dispatch".to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || dispatcher.run())
            .map_err(|source| PoolError::Spawn { name, source })?;

        tracing::info!(workers = count, seed, "worker pool started");
        Ok(Self {
            inbox: sender,
            workers: count,
            dispatcher: Some(handle),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queues a render and returns immediately with its ticket.
    pub fn schedule(
        &self,
        renderer: impl Into<String>,
        algorithm: AlgorithmSpec,
        buffer: PixelBuffer,
    ) -> Ticket<RenderReport> {
        let (completer, ticket) = ticket::pair();
        let job = Job {
            request: JobRequest::new(renderer, algorithm, buffer),
            queued_at: Instant::now(),
            completer,
        };
        if let Err(err) = self.inbox.send(Command::Schedule(job)) {
            if let Command::Schedule(job) = err.into_inner() {
                job.completer.reject(JobError::ShutDown);
            }
        }
        ticket
    }

    /// Snapshot of slot and backlog counters, answered by the dispatcher.
    pub fn stats(&self) -> Ticket<PoolStats> {
        let (completer, ticket) = ticket::pair();
        if let Err(err) = self.inbox.send(Command::Stats(completer)) {
            if let Command::Stats(completer) = err.into_inner() {
                completer.reject(JobError::ShutDown);
            }
        }
        ticket
    }

    /// Stops accepting work, lets every scheduled job finish, and joins all
    /// threads.
    pub fn shutdown(mut self) -> Result<(), PoolError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), PoolError> {
        let Some(handle) = self.dispatcher.take() else {
            return Ok(());
        };
        let _ = self.inbox.send(Command::Shutdown);
        handle
            .join()
            .map_err(|_| PoolError::Panicked("dyntex-dispatch".into()))
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Dispatcher {
    inbox: Receiver<Command>,
    slots: Vec<Slot>,
    backlog: VecDeque<QueuedJob>,
    accepting: bool,
    next_job: u64,
    dispatched: u64,
    completed: u64,
    failed: u64,
}

impl Dispatcher {
    fn run(mut self) {
        loop {
            if !self.accepting && self.backlog.is_empty() && self.running() == 0 {
                break;
            }
            match self.next_event() {
                Event::Inbox(Some(command)) => self.handle_command(command),
                Event::Inbox(None) => self.accepting = false,
                Event::Finished { slot, outcome } => self.finish(slot, outcome),
            }
            self.dispatch();
        }

        for command in self.inbox.try_iter() {
            reject_command(command);
        }
        for slot in mem::take(&mut self.slots) {
            if let Slot::Idle(worker) = slot {
                let index = worker.slot();
                if let Err(err) = worker.shutdown() {
                    tracing::error!(slot = index, error = %err, "worker did not stop cleanly");
                }
            }
        }
        tracing::info!(
            completed = self.completed,
            failed = self.failed,
            "worker pool stopped"
        );
    }

    fn running(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Busy(_)))
            .count()
    }

    /// Blocks until a command arrives or an in-flight job resolves.
    fn next_event(&self) -> Event {
        let mut select = Select::new();
        let mut watches = Vec::new();
        if self.accepting {
            let operation = select.recv(&self.inbox);
            debug_assert_eq!(operation, watches.len());
            watches.push(Watch::Inbox);
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if let Slot::Busy(flight) = slot {
                let receiver = flight.running.ticket().receiver();
                let operation = select.recv(receiver);
                debug_assert_eq!(operation, watches.len());
                watches.push(Watch::Slot(index, receiver));
            }
        }

        let operation = select.select();
        match watches[operation.index()] {
            Watch::Inbox => Event::Inbox(operation.recv(&self.inbox).ok()),
            Watch::Slot(slot, receiver) => Event::Finished {
                slot,
                outcome: operation
                    .recv(receiver)
                    .unwrap_or(Err(JobError::WorkerLost { slot })),
            },
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Schedule(job) => {
                if !self.accepting {
                    job.completer.reject(JobError::ShutDown);
                    return;
                }
                let id = JobId(self.next_job);
                self.next_job += 1;
                tracing::debug!(job = %id, renderer = %job.request.renderer, algorithm = %job.request.algorithm, "queued job");
                self.backlog.push_back(QueuedJob { id, job });
            }
            Command::Stats(completer) => completer.resolve(PoolStats {
                workers: self.slots.len(),
                running: self.running(),
                queued: self.backlog.len(),
                completed: self.completed,
                failed: self.failed,
            }),
            Command::Shutdown => {
                tracing::debug!(queued = self.backlog.len(), "shutdown requested; draining");
                self.accepting = false;
            }
        }
    }

    fn dispatch(&mut self) {
        while !self.backlog.is_empty() {
            let Some((index, worker)) = self.take_idle() else {
                break;
            };
            let Some(QueuedJob { id, job }) = self.backlog.pop_front() else {
                self.slots[index] = Slot::Idle(worker);
                break;
            };

            let dispatch_order = self.dispatched;
            self.dispatched += 1;
            tracing::debug!(job = %id, slot = index, "dispatching job");
            self.slots[index] = Slot::Busy(InFlight {
                id,
                queued_at: job.queued_at,
                dispatch_order,
                completer: job.completer,
                running: worker.run(job.request),
            });
        }

        if self.slots.iter().all(|slot| matches!(slot, Slot::Retired)) && !self.backlog.is_empty() {
            for QueuedJob { id, job } in self.backlog.drain(..) {
                tracing::error!(job = %id, "no live workers remain");
                job.completer.reject(JobError::WorkerLost { slot: 0 });
                self.failed += 1;
            }
        }

        tracing::debug!(
            running = self.running(),
            queued = self.backlog.len(),
            "pool status"
        );
    }

    /// Takes the worker out of the lowest-numbered idle slot.
    fn take_idle(&mut self) -> Option<(usize, WorkerHandle)> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Idle(_)))?;
        match mem::replace(&mut self.slots[index], Slot::Retired) {
            Slot::Idle(worker) => Some((index, worker)),
            other => {
                self.slots[index] = other;
                None
            }
        }
    }

    fn finish(&mut self, index: usize, outcome: Outcome<JobOutput>) {
        let flight = match mem::replace(&mut self.slots[index], Slot::Retired) {
            Slot::Busy(flight) => flight,
            other => {
                self.slots[index] = other;
                return;
            }
        };
        let completed_at = Instant::now();
        let InFlight {
            id,
            queued_at,
            dispatch_order,
            completer,
            running,
        } = flight;
        let dispatched_at = running.dispatched_at();
        let worker = running.into_handle();

        let mut lost = false;
        match outcome {
            Ok(output) => {
                let report = RenderReport {
                    job: id,
                    slot: index,
                    buffer: output.buffer,
                    min: output.min,
                    max: output.max,
                    runtime: output.runtime,
                    threadtime: completed_at.duration_since(dispatched_at),
                    queuetime: completed_at.duration_since(queued_at),
                    dispatch_order,
                    dispatched_at,
                    completed_at,
                };
                tracing::debug!(
                    job = %id,
                    slot = index,
                    runtime_ms = millis(report.runtime),
                    threadtime_ms = millis(report.threadtime),
                    queuetime_ms = millis(report.queuetime),
                    "job complete"
                );
                completer.resolve(report);
                self.completed += 1;
            }
            Err(err) => {
                tracing::warn!(job = %id, slot = index, error = %err, "job failed");
                lost = matches!(err, JobError::WorkerLost { .. });
                completer.reject(err);
                self.failed += 1;
            }
        }

        self.slots[index] = if lost {
            match worker.respawn() {
                Ok(worker) => {
                    tracing::warn!(slot = index, "restarted execution context");
                    Slot::Idle(worker)
                }
                Err(err) => {
                    tracing::error!(slot = index, error = %err, "failed to restart execution context");
                    Slot::Retired
                }
            }
        } else {
            Slot::Idle(worker)
        };
    }
}

fn reject_command(command: Command) {
    match command {
        Command::Schedule(job) => job.completer.reject(JobError::ShutDown),
        Command::Stats(completer) => completer.reject(JobError::ShutDown),
        Command::Shutdown => {}
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
