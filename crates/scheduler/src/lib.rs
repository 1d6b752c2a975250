//! Concurrent job dispatch for dyntex.
//!
//! A [`Coordinator`] owns a fixed pool of [`WorkerHandle`]s, each fronting an
//! [`ExecutionContext`] on its own thread. Callers [`schedule`] renders and get
//! a [`Ticket`] back immediately; jobs wait in a FIFO backlog until a slot is
//! free, and every ticket resolves exactly once with a [`RenderReport`] or a
//! [`JobError`].
//!
//! Nothing is shared between workers: a job's pixel buffer is moved to the
//! worker that renders it and moved back inside the report.
//!
//! [`schedule`]: Coordinator::schedule

pub mod context;
pub mod coordinator;
mod error;
pub mod ticket;
pub mod worker;

pub use context::{ExecutionContext, JobOutput, JobRequest};
pub use coordinator::{Coordinator, JobId, PoolOptions, PoolStats, RenderReport};
pub use error::{JobError, NameKind, PoolError};
pub use ticket::{Completer, Ticket};
pub use worker::{Running, WorkerHandle};
