//! Field rasterizer for dyntex.
//!
//! A render is the composition of a named scalar field and a named raster
//! strategy:
//!
//! ```text
//!   AlgorithmSpec ──resolve()──▶ FieldFunction ─┐
//!                                               ├─▶ RendererKind::render() ─▶ RenderOutput
//!   PixelBuffer (Dimension, RGBA8) ─────────────┘        (buffer + min/max)
//! ```
//!
//! Both lookups are closed enums validated up front, so an unknown name is a
//! [`FieldError`] rather than a fault halfway through a render. Noise based
//! fields sample a [`NoiseBank`] whose generators are seeded deterministically,
//! so two banks built from the same seed produce identical images.

pub mod algorithms;
mod error;
pub mod noise;
pub mod raster;
mod types;

pub use algorithms::{resolve, Algorithm, AlgorithmSpec, Field, FieldFunction, Octaves};
pub use error::FieldError;
pub use noise::{NoiseBank, SimplexNoise, NOISE_CHANNELS};
pub use raster::{
    render_plane, render_plane_color, render_row, Extrema, RenderOutput, RendererKind,
};
pub use types::{Dimension, PixelBuffer, CHANNELS, MAX_PIXELS};
