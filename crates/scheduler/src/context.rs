use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use renderer::{AlgorithmSpec, FieldError, NoiseBank, PixelBuffer, RenderOutput, RendererKind};

use crate::error::JobError;

/// A render job as it crosses into a worker. The buffer moves with it.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub renderer: String,
    pub algorithm: AlgorithmSpec,
    pub buffer: PixelBuffer,
}

impl JobRequest {
    pub fn new(renderer: impl Into<String>, algorithm: AlgorithmSpec, buffer: PixelBuffer) -> Self {
        Self {
            renderer: renderer.into(),
            algorithm,
            buffer,
        }
    }
}

/// What a worker hands back for a successful job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub buffer: PixelBuffer,
    pub min: u8,
    pub max: u8,
    /// Time spent inside the renderer only.
    pub runtime: Duration,
}

/// The state owned by one background worker.
///
/// Every context builds its own [`NoiseBank`]; contexts share nothing.
pub struct ExecutionContext {
    slot: usize,
    noise: Arc<NoiseBank>,
}

impl ExecutionContext {
    pub fn new(slot: usize, seed: u64) -> Self {
        Self {
            slot,
            noise: Arc::new(NoiseBank::new(seed)),
        }
    }

    pub fn execute(&self, request: JobRequest) -> Result<JobOutput, JobError> {
        let JobRequest {
            renderer: renderer_name,
            algorithm,
            buffer,
        } = request;

        let kind: RendererKind = renderer_name.parse().map_err(|err: FieldError| {
            tracing::warn!(worker = self.slot, renderer = %renderer_name, "invalid renderer");
            JobError::from(err)
        })?;
        let field = renderer::resolve(&algorithm, &self.noise).map_err(|err| {
            tracing::warn!(worker = self.slot, %algorithm, error = %err, "invalid algorithm");
            JobError::from(err)
        })?;

        tracing::debug!(
            worker = self.slot,
            renderer = kind.name(),
            %algorithm,
            dimension = %buffer.dimension(),
            "rendering"
        );
        let start = Instant::now();
        let output = guarded(|| kind.render(&field, buffer))?;
        let runtime = start.elapsed();
        tracing::debug!(
            worker = self.slot,
            runtime_ms = runtime.as_secs_f64() * 1000.0,
            "render finished"
        );

        Ok(JobOutput {
            min: output.extrema.min,
            max: output.extrema.max,
            buffer: output.buffer,
            runtime,
        })
    }
}

/// Runs a render, turning both field errors and panics into job errors so
/// the worker thread survives a faulty field.
fn guarded<F>(render: F) -> Result<RenderOutput, JobError>
where
    F: FnOnce() -> Result<RenderOutput, FieldError>,
{
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(result) => result.map_err(JobError::from),
        Err(payload) => Err(JobError::ComputationFault(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("renderer panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("renderer panicked: {message}")
    } else {
        "renderer panicked".to_string()
    }
}
