use std::fmt;

use renderer::FieldError;
use thiserror::Error;

/// Which registry an unknown name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Renderer,
    Algorithm,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Renderer => f.write_str("renderer"),
            NameKind::Algorithm => f.write_str("algorithm"),
        }
    }
}

/// Terminal failure of a single job, delivered through its ticket.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: NameKind, name: String },
    #[error("computation fault: {0}")]
    ComputationFault(String),
    #[error("worker {slot} stopped before completing the job")]
    WorkerLost { slot: usize },
    #[error("job was dropped without being completed")]
    Abandoned,
    #[error("coordinator is shut down")]
    ShutDown,
}

impl From<FieldError> for JobError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::UnknownRenderer(name) => JobError::UnknownName {
                kind: NameKind::Renderer,
                name,
            },
            FieldError::UnknownAlgorithm(name) => JobError::UnknownName {
                kind: NameKind::Algorithm,
                name,
            },
            other => JobError::ComputationFault(other.to_string()),
        }
    }
}

/// Failures while building or tearing down the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    EmptyPool,
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_map_to_job_taxonomy() {
        assert_eq!(
            JobError::from(FieldError::UnknownRenderer("renderQ".into())),
            JobError::UnknownName {
                kind: NameKind::Renderer,
                name: "renderQ".into()
            }
        );
        assert!(matches!(
            JobError::from(FieldError::UnknownAlgorithm("x".into())),
            JobError::UnknownName {
                kind: NameKind::Algorithm,
                ..
            }
        ));
        assert!(matches!(
            JobError::from(FieldError::NonFinite {
                x: 0,
                y: 0,
                channel: 0
            }),
            JobError::ComputationFault(_)
        ));
    }

    #[test]
    fn unknown_name_message_names_registry() {
        let err = JobError::UnknownName {
            kind: NameKind::Algorithm,
            name: "perlin".into(),
        };
        assert_eq!(err.to_string(), "unknown algorithm 'perlin'");
    }
}
