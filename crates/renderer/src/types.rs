use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Bytes per RGBA8 pixel.
pub const CHANNELS: usize = 4;

/// Largest raster a buffer may hold: 1 GiB of RGBA8.
pub const MAX_PIXELS: usize = 1 << 28;

/// Size of a raster in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels, or `None` past [`MAX_PIXELS`].
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .filter(|&count| count <= MAX_PIXELS)
    }

    /// Length of an RGBA8 buffer covering this dimension.
    pub fn byte_len(&self) -> Result<usize, FieldError> {
        self.pixel_count()
            .and_then(|count| count.checked_mul(CHANNELS))
            .ok_or(FieldError::TooLarge {
                width: self.width,
                height: self.height,
                limit: MAX_PIXELS,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimension {
    type Err = FieldError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let trimmed = spec.trim();
        let invalid = || FieldError::InvalidDimension(trimmed.to_string());
        let (width, height) = trimmed.split_once(['x', 'X', '×']).ok_or_else(invalid)?;
        let width = width.trim().parse().map_err(|_| invalid())?;
        let height = height.trim().parse().map_err(|_| invalid())?;
        let dimension = Self { width, height };
        dimension.byte_len()?;
        Ok(dimension)
    }
}

/// RGBA8 pixel storage, row-major with the origin at the top-left.
///
/// The buffer is moved into a worker for the duration of a job and handed
/// back with the result; it is never aliased between threads.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    dimension: Dimension,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocates a zero-filled buffer for `dimension`.
    pub fn new(dimension: Dimension) -> Result<Self, FieldError> {
        Ok(Self {
            dimension,
            data: vec![0; dimension.byte_len()?],
        })
    }

    /// Wraps existing bytes, checking they cover `dimension` exactly.
    pub fn from_vec(dimension: Dimension, data: Vec<u8>) -> Result<Self, FieldError> {
        let expected = dimension.byte_len()?;
        if data.len() != expected {
            return Err(FieldError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Returns the RGBA value stored at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.dimension.width || y >= self.dimension.height {
            return None;
        }
        let offset = (y as usize * self.dimension.width as usize + x as usize) * CHANNELS;
        let px = &self.data[offset..offset + CHANNELS];
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("dimension", &self.dimension)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimension_spec() {
        let dim: Dimension = "800x160".parse().unwrap();
        assert_eq!(dim, Dimension::new(800, 160));
        let dim: Dimension = " 0 X 12 ".parse().unwrap();
        assert_eq!(dim, Dimension::new(0, 12));
        assert!(matches!(
            "800".parse::<Dimension>(),
            Err(FieldError::InvalidDimension(_))
        ));
        assert!("axb".parse::<Dimension>().is_err());
    }

    #[test]
    fn buffer_length_tracks_dimension() {
        let buffer = PixelBuffer::new(Dimension::new(3, 2)).unwrap();
        assert_eq!(buffer.len(), 24);
        assert_eq!(PixelBuffer::new(Dimension::new(0, 7)).unwrap().len(), 0);
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let huge = Dimension::new(1 << 31, 1 << 31);
        assert_eq!(huge.pixel_count(), None);
        assert_eq!(
            huge.byte_len(),
            Err(FieldError::TooLarge {
                width: 1 << 31,
                height: 1 << 31,
                limit: MAX_PIXELS
            })
        );
        assert!(PixelBuffer::new(huge).is_err());
        assert!(PixelBuffer::from_vec(Dimension::new(u32::MAX, 2), Vec::new()).is_err());
        assert!(matches!(
            "2147483648x2147483648".parse::<Dimension>(),
            Err(FieldError::TooLarge { .. })
        ));

        let edge = Dimension::new(1 << 14, 1 << 14);
        assert_eq!(edge.pixel_count(), Some(MAX_PIXELS));
        assert_eq!(edge.byte_len(), Ok(MAX_PIXELS * CHANNELS));
        assert!(Dimension::new((1 << 14) + 1, 1 << 14).byte_len().is_err());
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = PixelBuffer::from_vec(Dimension::new(2, 2), vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            FieldError::BufferSize {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn pixel_lookup_is_row_major() {
        let mut data = vec![0; 16];
        data[8..12].copy_from_slice(&[1, 2, 3, 4]);
        let buffer = PixelBuffer::from_vec(Dimension::new(2, 2), data).unwrap();
        assert_eq!(buffer.pixel(0, 1), Some([1, 2, 3, 4]));
        assert_eq!(buffer.pixel(2, 0), None);
    }
}
