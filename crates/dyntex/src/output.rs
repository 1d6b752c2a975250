use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gallery::Panel;
use image::{ImageFormat, RgbaImage};
use renderer::{Dimension, PixelBuffer};
use scheduler::RenderReport;
use serde::Serialize;

/// Writes `buffer` as a PNG. Empty buffers are skipped and return `false`.
pub fn write_png(path: &Path, buffer: PixelBuffer) -> Result<bool> {
    let dimension = buffer.dimension();
    if dimension.is_empty() {
        tracing::warn!(path = %path.display(), %dimension, "empty image, nothing written");
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let image = RgbaImage::from_raw(dimension.width, dimension.height, buffer.into_vec())
        .ok_or_else(|| anyhow!("pixel data does not cover {dimension}"))?;
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// One line of the gallery report.
#[derive(Debug, Clone, Serialize)]
pub struct PanelReport {
    pub index: usize,
    pub title: String,
    pub renderer: String,
    pub algorithm: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Timing {
    pub job: u64,
    pub slot: usize,
    pub dispatch_order: u64,
    pub min: u8,
    pub max: u8,
    pub runtime_ms: f64,
    pub threadtime_ms: f64,
    pub queuetime_ms: f64,
}

impl Timing {
    pub fn from_report(report: &RenderReport) -> Self {
        Self {
            job: report.job.0,
            slot: report.slot,
            dispatch_order: report.dispatch_order,
            min: report.min,
            max: report.max,
            runtime_ms: millis(report.runtime),
            threadtime_ms: millis(report.threadtime),
            queuetime_ms: millis(report.queuetime),
        }
    }
}

impl PanelReport {
    pub fn new(index: usize, panel: &Panel, dimension: Dimension) -> Self {
        Self {
            index,
            title: panel.title.clone(),
            renderer: panel.renderer.clone(),
            algorithm: panel.algorithm.to_string(),
            width: dimension.width,
            height: dimension.height,
            timing: None,
            output: None,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn text_line(&self) -> String {
        let mut line = format!(
            "{:02} {:<34} {:>9}",
            self.index,
            self.title,
            format!("{}x{}", self.width, self.height)
        );
        if let Some(timing) = &self.timing {
            let _ = write!(
                line,
                "  slot {} min {:>3} max {:>3}  runtime {:>8.2} ms  threadtime {:>8.2} ms  queuetime {:>8.2} ms",
                timing.slot,
                timing.min,
                timing.max,
                timing.runtime_ms,
                timing.threadtime_ms,
                timing.queuetime_ms
            );
        }
        if let Some(error) = &self.error {
            let _ = write!(line, "  FAILED: {error}");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn panel() -> Panel {
        Panel::new("f(x) = x", "renderX", "simple1d", 0.2)
    }

    #[test]
    fn writes_png_with_buffer_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/ramp.png");
        let buffer = PixelBuffer::from_vec(Dimension::new(3, 2), vec![200; 24]).unwrap();
        assert!(write_png(&path, buffer).unwrap());

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [200, 200, 200, 200]);
    }

    #[test]
    fn empty_buffer_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.png");
        assert!(!write_png(&path, PixelBuffer::new(Dimension::new(0, 4)).unwrap()).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn failed_panel_line_carries_error() {
        let mut report = PanelReport::new(4, &panel(), Dimension::new(80, 16));
        report.error = Some("worker 1 was lost".into());
        assert!(report.failed());
        let line = report.text_line();
        assert!(line.starts_with("04 f(x) = x"));
        assert!(line.contains("80x16"));
        assert!(line.ends_with("FAILED: worker 1 was lost"));
    }

    #[test]
    fn json_omits_missing_sections() {
        let report = PanelReport::new(0, &panel(), Dimension::new(8, 1));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["algorithm"], "simple1d");
        assert!(value.get("timing").is_none());
        assert!(value.get("error").is_none());
    }
}
