//! Pixel and tensor types shared across the pipeline.

use ndarray::Array3;

use crate::error::{Error, Result};

/// Number of color channels the pipeline operates on.
pub const CHANNELS: usize = 3;

/// A tile once extracted: channel-first `(3, rows, cols)` float tensor,
/// normalized to [0,1] on the input side.
pub type Tile = Array3<f32>;

/// Interleaved 8-bit RGB image, row-major.
///
/// The buffer length is validated at construction and never changes, so
/// `data()[(row * width + col) * 3 + channel]` is always in bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Image {
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = height as usize * width as usize * CHANNELS;
        if data.len() != expected {
            return Err(Error::ImageShape {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_from_raw_accepts_matching_buffer() {
        let image = Image::from_raw(vec![0u8; 2 * 3 * CHANNELS], 3, 2).unwrap();
        assert_eq!(image.width(), 3);
        assert_eq!(image.height(), 2);
        assert_eq!(image.data().len(), 18);
    }

    #[test]
    fn test_image_from_raw_rejects_short_buffer() {
        let err = Image::from_raw(vec![0u8; 10], 3, 2).unwrap_err();
        match err {
            Error::ImageShape {
                width,
                height,
                expected,
                actual,
            } => {
                assert_eq!(width, 3);
                assert_eq!(height, 2);
                assert_eq!(expected, 18);
                assert_eq!(actual, 10);
            }
            other => panic!("expected ImageShape, got {other:?}"),
        }
    }

    #[test]
    fn test_image_into_raw_returns_buffer() {
        let data: Vec<u8> = (0..12).collect();
        let image = Image::from_raw(data.clone(), 2, 2).unwrap();
        assert_eq!(image.into_raw(), data);
    }
}
