use std::fmt;
use std::str::FromStr;

use crate::algorithms::Field;
use crate::error::FieldError;
use crate::types::{PixelBuffer, CHANNELS};

/// Smallest and largest quantized channel value written by a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extrema {
    pub min: u8,
    pub max: u8,
}

#[derive(Default)]
struct ExtremaTracker(Option<Extrema>);

impl ExtremaTracker {
    fn observe(&mut self, value: u8) {
        self.0 = Some(match self.0 {
            None => Extrema {
                min: value,
                max: value,
            },
            Some(seen) => Extrema {
                min: seen.min.min(value),
                max: seen.max.max(value),
            },
        });
    }

    fn finish(self) -> Extrema {
        self.0.unwrap_or_default()
    }
}

/// A filled buffer together with its observed extrema.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub buffer: PixelBuffer,
    pub extrema: Extrema,
}

impl RenderOutput {
    fn untouched(buffer: PixelBuffer) -> Self {
        Self {
            buffer,
            extrema: Extrema::default(),
        }
    }
}

/// Maps a `[0, 1]` sample to a channel byte by flooring `value * 255`.
fn quantize(value: f64, x: u32, y: u32, channel: usize) -> Result<u8, FieldError> {
    if !value.is_finite() {
        return Err(FieldError::NonFinite { x, y, channel });
    }
    Ok((value * 255.0).floor().clamp(0.0, 255.0) as u8)
}

/// Samples one row along `u` and replicates it down every row.
pub fn render_row<F>(field: &F, mut buffer: PixelBuffer) -> Result<RenderOutput, FieldError>
where
    F: Field + ?Sized,
{
    let dimension = buffer.dimension();
    if dimension.is_empty() {
        return Ok(RenderOutput::untouched(buffer));
    }

    let width = dimension.width;
    let stride = width as usize * CHANNELS;
    let mut extrema = ExtremaTracker::default();
    let mut row = vec![0u8; stride];
    for (x, px) in (0..width).zip(row.chunks_exact_mut(CHANNELS)) {
        let value = quantize(field.sample(x as f64 / width as f64, 0.0, 0), x, 0, 0)?;
        extrema.observe(value);
        px.copy_from_slice(&[value, value, value, 255]);
    }
    for line in buffer.as_bytes_mut().chunks_exact_mut(stride) {
        line.copy_from_slice(&row);
    }

    Ok(RenderOutput {
        buffer,
        extrema: extrema.finish(),
    })
}

/// Samples every pixel; rows are visited from the last to the first.
fn render_plane_with<F, P>(
    field: &F,
    mut buffer: PixelBuffer,
    mut shade: P,
) -> Result<RenderOutput, FieldError>
where
    F: Field + ?Sized,
    P: FnMut(&F, f64, f64, u32, u32) -> Result<[u8; 3], FieldError>,
{
    let dimension = buffer.dimension();
    if dimension.is_empty() {
        return Ok(RenderOutput::untouched(buffer));
    }

    let (width, height) = (dimension.width, dimension.height);
    let stride = width as usize * CHANNELS;
    let mut extrema = ExtremaTracker::default();
    let data = buffer.as_bytes_mut();
    for y in (0..height).rev() {
        let line = &mut data[y as usize * stride..(y as usize + 1) * stride];
        let v = y as f64 / height as f64;
        for (x, px) in (0..width).zip(line.chunks_exact_mut(CHANNELS)) {
            let rgb = shade(field, x as f64 / width as f64, v, x, y)?;
            for value in rgb {
                extrema.observe(value);
            }
            px.copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }

    Ok(RenderOutput {
        buffer,
        extrema: extrema.finish(),
    })
}

/// Greyscale: one sample per pixel written to R, G and B.
pub fn render_plane<F>(field: &F, buffer: PixelBuffer) -> Result<RenderOutput, FieldError>
where
    F: Field + ?Sized,
{
    render_plane_with(field, buffer, |field, u, v, x, y| {
        let value = quantize(field.sample(u, v, 0), x, y, 0)?;
        Ok([value; 3])
    })
}

/// Colour: channels 0, 1 and 2 sampled independently.
pub fn render_plane_color<F>(field: &F, buffer: PixelBuffer) -> Result<RenderOutput, FieldError>
where
    F: Field + ?Sized,
{
    render_plane_with(field, buffer, |field, u, v, x, y| {
        let mut rgb = [0u8; 3];
        for (channel, slot) in rgb.iter_mut().enumerate() {
            *slot = quantize(field.sample(u, v, channel), x, y, channel)?;
        }
        Ok(rgb)
    })
}

/// Registered rasterization strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    /// `renderX`: one row replicated vertically.
    Row,
    /// `renderXY`: per-pixel greyscale.
    Plane,
    /// `renderXYC`: per-pixel three channel colour.
    PlaneColor,
}

impl RendererKind {
    pub const NAMES: [&'static str; 3] = ["renderX", "renderXY", "renderXYC"];

    pub fn name(self) -> &'static str {
        match self {
            RendererKind::Row => "renderX",
            RendererKind::Plane => "renderXY",
            RendererKind::PlaneColor => "renderXYC",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            RendererKind::Row => "1D, one row replicated for every line, greyscale",
            RendererKind::Plane => "2D, per pixel, greyscale",
            RendererKind::PlaneColor => "2D, per pixel, independent RGB channels",
        }
    }

    pub fn all() -> [RendererKind; 3] {
        [RendererKind::Row, RendererKind::Plane, RendererKind::PlaneColor]
    }

    pub fn render<F>(self, field: &F, buffer: PixelBuffer) -> Result<RenderOutput, FieldError>
    where
        F: Field + ?Sized,
    {
        match self {
            RendererKind::Row => render_row(field, buffer),
            RendererKind::Plane => render_plane(field, buffer),
            RendererKind::PlaneColor => render_plane_color(field, buffer),
        }
    }
}

impl FromStr for RendererKind {
    type Err = FieldError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "renderX" => Ok(RendererKind::Row),
            "renderXY" => Ok(RendererKind::Plane),
            "renderXYC" => Ok(RendererKind::PlaneColor),
            other => Err(FieldError::UnknownRenderer(other.to_string())),
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Arc;

    use super::*;
    use crate::algorithms::{resolve, AlgorithmSpec};
    use crate::noise::NoiseBank;
    use crate::types::Dimension;

    fn buffer(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(Dimension::new(width, height)).unwrap()
    }

    fn alphas(buffer: &PixelBuffer) -> impl Iterator<Item = u8> + '_ {
        buffer.as_bytes().chunks_exact(CHANNELS).map(|px| px[3])
    }

    #[test]
    fn row_renderer_quantizes_simple_ramp() {
        let noise = Arc::new(NoiseBank::default());
        let field = resolve(&AlgorithmSpec::named("simple1d"), &noise).unwrap();
        let out = render_row(&field, buffer(4, 1)).unwrap();
        assert_eq!(
            out.buffer.as_bytes(),
            &[0, 0, 0, 255, 63, 63, 63, 255, 127, 127, 127, 255, 191, 191, 191, 255]
        );
        assert_eq!(out.extrema, Extrema { min: 0, max: 191 });
    }

    #[test]
    fn row_renderer_replicates_every_line() {
        let out = render_row(&|u: f64, _v: f64, _c: usize| u, buffer(5, 3)).unwrap();
        let bytes = out.buffer.as_bytes();
        let stride = 5 * CHANNELS;
        assert_eq!(&bytes[..stride], &bytes[stride..2 * stride]);
        assert_eq!(&bytes[..stride], &bytes[2 * stride..]);
        assert!(alphas(&out.buffer).all(|a| a == 255));
    }

    #[test]
    fn plane_renderer_fills_bottom_row_first() {
        let calls = RefCell::new(Vec::new());
        let field = |u: f64, v: f64, _c: usize| {
            calls.borrow_mut().push((u, v));
            u * v
        };
        let out = render_plane(&field, buffer(2, 2)).unwrap();
        assert_eq!(
            calls.into_inner(),
            vec![(0.0, 0.5), (0.5, 0.5), (0.0, 0.0), (0.5, 0.0)]
        );
        assert_eq!(out.buffer.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.buffer.pixel(1, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.buffer.pixel(0, 1), Some([0, 0, 0, 255]));
        assert_eq!(out.buffer.pixel(1, 1), Some([63, 63, 63, 255]));
        assert_eq!(out.extrema, Extrema { min: 0, max: 63 });
    }

    #[test]
    fn color_renderer_samples_each_channel() {
        let field = |_u: f64, _v: f64, c: usize| [0.1, 0.5, 0.9][c];
        let out = render_plane_color(&field, buffer(3, 2)).unwrap();
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(out.buffer.pixel(x, y), Some([25, 127, 229, 255]));
            }
        }
        assert_eq!(out.extrema, Extrema { min: 25, max: 229 });
    }

    #[test]
    fn empty_dimensions_return_untouched() {
        for kind in RendererKind::all() {
            for (w, h) in [(0, 0), (0, 5), (5, 0)] {
                let out = kind
                    .render(&|_: f64, _: f64, _: usize| f64::NAN, buffer(w, h))
                    .unwrap();
                assert!(out.buffer.is_empty());
                assert_eq!(out.extrema, Extrema::default());
            }
        }
    }

    #[test]
    fn output_shape_and_extrema_hold_for_every_renderer() {
        let noise = Arc::new(NoiseBank::new(3));
        let field = resolve(&"fractal2d:1,0.3,4,0.5".parse().unwrap(), &noise).unwrap();
        for kind in RendererKind::all() {
            for (w, h) in [(1, 1), (7, 3), (16, 9)] {
                let out = kind.render(&field, buffer(w, h)).unwrap();
                assert_eq!(out.buffer.len(), (w * h * 4) as usize);
                assert!(alphas(&out.buffer).all(|a| a == 255));
                assert!(out.extrema.min <= out.extrema.max);
            }
        }
    }

    #[test]
    fn non_finite_sample_is_a_fault() {
        let field = |u: f64, _v: f64, c: usize| if u > 0.4 && c == 2 { f64::INFINITY } else { u };
        let err = render_plane_color(&field, buffer(4, 2)).unwrap_err();
        assert_eq!(err, FieldError::NonFinite { x: 2, y: 1, channel: 2 });
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let out = render_row(&|u: f64, _: f64, _: usize| u * 4.0 - 1.0, buffer(4, 1)).unwrap();
        assert_eq!(out.buffer.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.buffer.pixel(3, 0), Some([255, 255, 255, 255]));
        assert_eq!(out.extrema, Extrema { min: 0, max: 255 });
    }

    #[test]
    fn renderer_names_resolve() {
        for kind in RendererKind::all() {
            assert_eq!(kind.name().parse::<RendererKind>().unwrap(), kind);
        }
        assert_eq!(
            "renderZ".parse::<RendererKind>().unwrap_err(),
            FieldError::UnknownRenderer("renderZ".into())
        );
    }
}
