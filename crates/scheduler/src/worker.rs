use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};

use crate::context::{ExecutionContext, JobOutput, JobRequest};
use crate::error::{JobError, PoolError};
use crate::ticket::{self, Completer, Outcome, Ticket};

struct Assignment {
    request: JobRequest,
    completer: Completer<JobOutput>,
}

/// Proxy for one background execution context.
///
/// An idle handle is consumed by [`WorkerHandle::run`] and only comes back
/// through [`Running`], so a second job can never be issued to a busy worker.
pub struct WorkerHandle {
    slot: usize,
    seed: u64,
    assignments: Option<Sender<Assignment>>,
    join_handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(slot: usize, seed: u64) -> Result<Self, PoolError> {
        let (sender, receiver) = bounded::<Assignment>(1);
        let name = format!("dyntex-worker-{slot}");
        let join_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let context = ExecutionContext::new(slot, seed);
                tracing::debug!(worker = slot, "execution context ready");
                for Assignment { request, completer } in receiver.iter() {
                    completer.complete(context.execute(request));
                }
                tracing::debug!(worker = slot, "execution context stopped");
            })
            .map_err(|source| PoolError::Spawn { name, source })?;

        Ok(Self {
            slot,
            seed,
            assignments: Some(sender),
            join_handle: Some(join_handle),
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// A handle whose thread has already exited, as after a crashed context.
    #[cfg(test)]
    pub(crate) fn spawn_stopped(slot: usize, seed: u64) -> Result<Self, PoolError> {
        let mut handle = Self::spawn(slot, seed)?;
        handle.stop()?;
        Ok(handle)
    }

    /// Starts a fresh context in the same slot with the same seed.
    pub fn respawn(self) -> Result<Self, PoolError> {
        let (slot, seed) = (self.slot, self.seed);
        drop(self);
        Self::spawn(slot, seed)
    }

    /// Hands `request` to the worker thread.
    pub fn run(self, request: JobRequest) -> Running {
        let (completer, ticket) = ticket::pair();
        let dispatched_at = Instant::now();
        let assignment = Assignment { request, completer };
        match &self.assignments {
            Some(sender) => {
                if let Err(err) = sender.send(assignment) {
                    err.into_inner()
                        .completer
                        .reject(JobError::WorkerLost { slot: self.slot });
                }
            }
            None => assignment
                .completer
                .reject(JobError::WorkerLost { slot: self.slot }),
        }
        Running {
            handle: self,
            ticket,
            dispatched_at,
        }
    }

    /// Closes the request channel and joins the worker thread.
    pub fn shutdown(mut self) -> Result<(), PoolError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), PoolError> {
        self.assignments.take();
        if let Some(handle) = self.join_handle.take() {
            handle
                .join()
                .map_err(|_| PoolError::Panicked(format!("dyntex-worker-{}", self.slot)))?;
        }
        Ok(())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// A worker that owns an in-flight job.
pub struct Running {
    handle: WorkerHandle,
    ticket: Ticket<JobOutput>,
    dispatched_at: Instant,
}

impl Running {
    pub fn slot(&self) -> usize {
        self.handle.slot
    }

    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }

    pub fn ticket(&self) -> &Ticket<JobOutput> {
        &self.ticket
    }

    /// Blocks until the job finishes and returns the idle handle with it.
    pub fn wait(self) -> (WorkerHandle, Outcome<JobOutput>) {
        let Running { handle, ticket, .. } = self;
        let outcome = ticket.wait().map_err(|err| match err {
            JobError::Abandoned => JobError::WorkerLost { slot: handle.slot },
            other => other,
        });
        (handle, outcome)
    }

    /// Recovers the handle once the ticket's outcome has been taken.
    pub(crate) fn into_handle(self) -> WorkerHandle {
        self.handle
    }
}
