//! Single-shot completion handles.
//!
//! [`pair`] returns the producer and consumer halves of one job's outcome.
//! [`Completer`] methods take `self`, so an outcome can be delivered at most
//! once; dropping it unfulfilled resolves the ticket to
//! [`JobError::Abandoned`].

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::JobError;

pub type Outcome<T> = Result<T, JobError>;

pub fn pair<T>() -> (Completer<T>, Ticket<T>) {
    let (sender, receiver) = bounded(1);
    (Completer { sender }, Ticket { receiver })
}

pub struct Completer<T> {
    sender: Sender<Outcome<T>>,
}

impl<T> Completer<T> {
    pub fn complete(self, outcome: Outcome<T>) {
        // A disconnected receiver means the caller stopped waiting.
        let _ = self.sender.send(outcome);
    }

    pub fn resolve(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn reject(self, error: JobError) {
        self.complete(Err(error));
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").finish_non_exhaustive()
    }
}

/// Caller side of a pending job.
pub struct Ticket<T> {
    receiver: Receiver<Outcome<T>>,
}

impl<T> Ticket<T> {
    /// Blocks until the job reaches its terminal state.
    pub fn wait(self) -> Outcome<T> {
        self.receiver.recv().unwrap_or(Err(JobError::Abandoned))
    }

    /// Waits up to `timeout`; on expiry the ticket is handed back and the job
    /// keeps running.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Outcome<T>, Ticket<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(JobError::Abandoned)),
        }
    }

    /// Takes the outcome if it is already available.
    pub fn try_take(self) -> Result<Outcome<T>, Ticket<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(JobError::Abandoned)),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<Outcome<T>> {
        &self.receiver
    }
}

impl<T> fmt::Debug for Ticket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("ready", &!self.receiver.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn resolves_across_threads() {
        let (completer, ticket) = pair();
        let handle = thread::spawn(move || completer.resolve(42));
        assert_eq!(ticket.wait(), Ok(42));
        handle.join().unwrap();
    }

    #[test]
    fn dropped_completer_abandons_ticket() {
        let (completer, ticket) = pair::<u8>();
        drop(completer);
        assert_eq!(ticket.wait(), Err(JobError::Abandoned));
    }

    #[test]
    fn try_take_hands_back_pending_ticket() {
        let (completer, ticket) = pair::<u8>();
        let ticket = ticket.try_take().unwrap_err();
        completer.reject(JobError::ShutDown);
        assert_eq!(ticket.try_take().unwrap(), Err(JobError::ShutDown));
    }

    #[test]
    fn wait_timeout_expires_without_consuming() {
        let (completer, ticket) = pair();
        let ticket = ticket
            .wait_timeout(Duration::from_millis(5))
            .expect_err("nothing delivered yet");
        completer.resolve("done");
        assert_eq!(
            ticket.wait_timeout(Duration::from_secs(1)).unwrap(),
            Ok("done")
        );
    }

    #[test]
    fn completing_after_caller_left_is_harmless() {
        let (completer, ticket) = pair();
        drop(ticket);
        completer.resolve(1);
    }
}
