use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use gallery::Gallery;
use renderer::{Algorithm, PixelBuffer, RendererKind};
use scheduler::{Coordinator, RenderReport, Ticket};
use tracing_subscriber::EnvFilter;

use crate::cli::{GalleryArgs, RenderArgs};
use crate::output::{self, PanelReport, Timing};

pub fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn list() -> Result<()> {
    println!("renderers:");
    for kind in RendererKind::all() {
        println!("  {:<14} {}", kind.name(), kind.describe());
    }
    println!("algorithms:");
    for name in Algorithm::NAMES {
        let params = Algorithm::parameters(name).unwrap_or_default();
        let signature = if params.is_empty() {
            name.to_string()
        } else {
            format!("{name}:{}", params.join(","))
        };
        println!(
            "  {:<58} {}",
            signature,
            Algorithm::describe(name).unwrap_or_default()
        );
    }
    Ok(())
}

/// Blocks on `ticket`, giving up after `limit` when one is set. A job that
/// outlives the limit keeps running in the pool.
fn wait_for(ticket: Ticket<RenderReport>, limit: Option<Duration>) -> Result<RenderReport> {
    let Some(limit) = limit else {
        return Ok(ticket.wait()?);
    };
    match ticket.wait_timeout(limit) {
        Ok(outcome) => Ok(outcome?),
        Err(_pending) => bail!(
            "no result after {}",
            humantime::format_duration(limit)
        ),
    }
}

pub fn render(args: RenderArgs) -> Result<()> {
    let buffer = PixelBuffer::new(args.size)?;
    let coordinator = Coordinator::new(args.pool.options(None, None))?;
    tracing::info!(
        workers = coordinator.workers(),
        renderer = %args.renderer,
        algorithm = %args.algorithm,
        size = %args.size,
        "rendering field"
    );

    let ticket = coordinator.schedule(args.renderer.as_str(), args.algorithm.clone(), buffer);
    let result = wait_for(ticket, args.wait)
        .with_context(|| format!("{} with {} failed", args.renderer, args.algorithm));
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            coordinator.shutdown()?;
            return Err(err);
        }
    };

    let timing = Timing::from_report(&report);
    let written = output::write_png(&args.out, report.buffer)?;
    println!(
        "{} {} {}: min {} max {}  runtime {:.2} ms  threadtime {:.2} ms  queuetime {:.2} ms",
        args.renderer,
        args.algorithm,
        args.size,
        timing.min,
        timing.max,
        timing.runtime_ms,
        timing.threadtime_ms,
        timing.queuetime_ms
    );
    if written {
        tracing::info!(path = %args.out.display(), "image written");
    }

    coordinator.shutdown()?;
    Ok(())
}

fn load_gallery(path: &Path) -> Result<Gallery> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read gallery {}", path.display()))?;
    Gallery::from_toml_str(&raw).with_context(|| format!("failed to load {}", path.display()))
}

pub fn gallery(args: GalleryArgs) -> Result<()> {
    let gallery = match &args.config {
        Some(path) => load_gallery(path)?,
        None => Gallery::builtin(),
    };
    let width = args.width.unwrap_or_else(|| gallery.width());
    let dimensions = gallery
        .panels
        .iter()
        .map(|panel| {
            panel
                .dimension(width)
                .with_context(|| format!("panel '{}' at width {width}", panel.title))
        })
        .collect::<Result<Vec<_>>>()?;
    let wait = args.wait.or(gallery.wait_timeout);
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let coordinator = Coordinator::new(args.pool.options(gallery.workers, gallery.seed))?;
    tracing::info!(
        panels = gallery.panels.len(),
        workers = coordinator.workers(),
        width,
        "rendering gallery"
    );

    // Everything is queued before the first wait so the pool stays saturated.
    let mut tickets = Vec::with_capacity(gallery.panels.len());
    for (panel, &dimension) in gallery.panels.iter().zip(&dimensions) {
        let buffer = PixelBuffer::new(dimension)?;
        tickets.push(coordinator.schedule(
            panel.renderer.as_str(),
            panel.algorithm.clone(),
            buffer,
        ));
    }

    let mut reports = Vec::with_capacity(tickets.len());
    let panels = gallery.panels.iter().zip(dimensions).zip(tickets);
    for (index, ((panel, dimension), ticket)) in panels.enumerate() {
        let mut row = PanelReport::new(index, panel, dimension);
        match wait_for(ticket, wait) {
            Ok(report) => {
                row.timing = Some(Timing::from_report(&report));
                let path = args.out_dir.join(format!("{index:02}-{}.png", panel.slug()));
                match output::write_png(&path, report.buffer) {
                    Ok(true) => row.output = Some(path),
                    Ok(false) => {}
                    Err(err) => row.error = Some(format!("{err:#}")),
                }
            }
            Err(err) => {
                tracing::warn!(panel = index, title = %panel.title, error = %err, "panel failed");
                row.error = Some(format!("{err:#}"));
            }
        }
        if !args.json {
            println!("{}", row.text_line());
        }
        reports.push(row);
    }

    match coordinator.stats().wait() {
        Ok(stats) => tracing::debug!(
            completed = stats.completed,
            failed = stats.failed,
            queued = stats.queued,
            running = stats.running,
            "pool counters"
        ),
        Err(err) => tracing::debug!(error = %err, "pool counters unavailable"),
    }
    coordinator.shutdown()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed = reports.iter().filter(|row| row.failed()).count();
    if failed > 0 {
        bail!("{failed} of {} panels failed", reports.len());
    }
    Ok(())
}
