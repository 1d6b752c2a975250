use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use renderer::{AlgorithmSpec, Dimension};
use scheduler::PoolOptions;

#[derive(Parser, Debug)]
#[command(
    name = "dyntex",
    author,
    version,
    about = "Procedural field renderer backed by a worker pool"
)]
pub struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the registered renderers and algorithms.
    List,
    /// Render one field to a PNG file.
    Render(RenderArgs),
    /// Render every panel of a gallery and print a timing report.
    Gallery(GalleryArgs),
}

#[derive(Args, Debug, Clone, Copy)]
pub struct PoolArgs {
    /// Number of worker threads (default: available parallelism).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Seed for the per-channel noise generators.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

impl PoolArgs {
    /// Command-line values win over `fallback`, which wins over defaults.
    pub fn options(&self, fallback_workers: Option<usize>, fallback_seed: Option<u64>) -> PoolOptions {
        let defaults = PoolOptions::default();
        PoolOptions {
            workers: self.workers.or(fallback_workers).unwrap_or(defaults.workers),
            seed: self.seed.or(fallback_seed).unwrap_or(defaults.seed),
        }
    }
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Renderer name: `renderX`, `renderXY`, or `renderXYC`.
    #[arg(long, value_name = "NAME", default_value = "renderXY")]
    pub renderer: String,

    /// Algorithm as `name` or `name:p0,p1,...` (e.g. `fractal2d:1,0.1,8,1`).
    #[arg(long, value_name = "SPEC", value_parser = parse_algorithm)]
    pub algorithm: AlgorithmSpec,

    /// Output size in pixels.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimension, default_value = "800x480")]
    pub size: Dimension,

    /// Destination PNG file.
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Give up waiting after this long (e.g. `30s`); the job is not cancelled.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub wait: Option<Duration>,

    #[command(flatten)]
    pub pool: PoolArgs,
}

#[derive(Args, Debug)]
pub struct GalleryArgs {
    /// Gallery TOML file; the built-in experiment page is used when omitted.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Panel width in pixels, overriding the gallery file.
    #[arg(long, value_name = "PIXELS")]
    pub width: Option<u32>,

    /// Directory that receives one PNG per panel.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Print the timing report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Per-panel wait limit, overriding the gallery file.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub wait: Option<Duration>,

    #[command(flatten)]
    pub pool: PoolArgs,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_algorithm(value: &str) -> Result<AlgorithmSpec, String> {
    value.parse().map_err(|err| format!("{err}"))
}

fn parse_dimension(value: &str) -> Result<Dimension, String> {
    value.parse().map_err(|err| format!("{err}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_render_arguments() {
        let cli = Cli::try_parse_from([
            "dyntex",
            "render",
            "--renderer",
            "renderXYC",
            "--algorithm",
            "fractal2d:1,0.1,8,1",
            "--size",
            "64x32",
            "--out",
            "out.png",
            "--workers",
            "2",
            "--wait",
            "5s",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.algorithm.params, vec![1.0, 0.1, 8.0, 1.0]);
        assert_eq!(args.size, Dimension::new(64, 32));
        assert_eq!(args.wait, Some(Duration::from_secs(5)));
        assert_eq!(args.pool.options(Some(7), Some(3)).workers, 2);
        assert_eq!(args.pool.options(Some(7), Some(3)).seed, 3);
    }

    #[test]
    fn rejects_malformed_size() {
        let err = Cli::try_parse_from([
            "dyntex", "render", "--algorithm", "cos2d", "--size", "wide", "--out", "x.png",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
