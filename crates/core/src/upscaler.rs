//! End-to-end tiled upscaling.

use tracing::debug;

use crate::dispatch::dispatch;
use crate::engine::TileEngine;
use crate::error::{Error, Result};
use crate::grid::tile_grid;
use crate::preprocess::extract_tiles;
use crate::stitch::stitch;
use crate::types::Image;

/// Construction-time parameters for an [`Upscaler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpscalerOptions {
    /// Integer ratio between output and input linear dimensions.
    pub upscale_factor: usize,
    /// Edge length of one output tile; must be divisible by the factor.
    pub output_tile_edge: usize,
    /// Tiles per inference batch.
    pub batch_size: usize,
}

impl Default for UpscalerOptions {
    fn default() -> Self {
        Self {
            upscale_factor: 2,
            output_tile_edge: 512,
            batch_size: 4,
        }
    }
}

/// Owns the scale parameters and the inference engine, and sequences
/// index → extract → dispatch → stitch for one image per call.
///
/// Parameters are immutable for the lifetime of the value; the tile grid
/// is recomputed from the image dimensions on every call, never cached, so
/// repeated calls may upscale images of different sizes.
pub struct Upscaler<E> {
    engine: E,
    upscale_factor: usize,
    input_tile_edge: usize,
    output_tile_edge: usize,
    batch_size: usize,
}

impl<E: TileEngine> Upscaler<E> {
    pub fn new(engine: E, options: UpscalerOptions) -> Result<Self> {
        ensure_positive("upscale_factor", options.upscale_factor)?;
        ensure_positive("output_tile_edge", options.output_tile_edge)?;
        ensure_positive("batch_size", options.batch_size)?;

        if options.output_tile_edge % options.upscale_factor != 0 {
            return Err(Error::Config {
                name: "output_tile_edge",
                reason: format!(
                    "{} is not divisible by upscale factor {}",
                    options.output_tile_edge, options.upscale_factor
                ),
            });
        }

        Ok(Self {
            engine,
            upscale_factor: options.upscale_factor,
            input_tile_edge: options.output_tile_edge / options.upscale_factor,
            output_tile_edge: options.output_tile_edge,
            batch_size: options.batch_size,
        })
    }

    pub fn upscale_factor(&self) -> usize {
        self.upscale_factor
    }

    /// Edge length of the input-side tiles, derived from the output edge.
    pub fn input_tile_edge(&self) -> usize {
        self.input_tile_edge
    }

    /// Upscale one image to `(height * factor, width * factor)`.
    pub fn upscale(&mut self, image: &Image) -> Result<Image> {
        let height = image.height() as usize;
        let width = image.width() as usize;

        let grid = tile_grid(height, width, self.input_tile_edge);
        debug!(
            height,
            width,
            tiles = grid.len(),
            input_tile_edge = self.input_tile_edge,
            "upscaling image"
        );

        let tiles = extract_tiles(image, &grid);
        let results = dispatch(&mut self.engine, tiles, self.batch_size)?;

        stitch(
            &results,
            height * self.upscale_factor,
            width * self.upscale_factor,
            self.output_tile_edge,
        )
    }
}

fn ensure_positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::Config {
            name,
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BatchMode;
    use ndarray::{Array3, Array4};

    /// Shape- and value-preserving engine, usable with factor 1.
    struct IdentityEngine;

    impl TileEngine for IdentityEngine {
        fn batch_mode(&self) -> BatchMode {
            BatchMode::Batched
        }

        fn infer_batch(&mut self, batch: Array4<f32>) -> anyhow::Result<Array4<f32>> {
            Ok(batch)
        }

        fn infer(&mut self, tile: Array3<f32>) -> anyhow::Result<Array3<f32>> {
            Ok(tile)
        }
    }

    fn options(factor: usize, edge: usize, batch: usize) -> UpscalerOptions {
        UpscalerOptions {
            upscale_factor: factor,
            output_tile_edge: edge,
            batch_size: batch,
        }
    }

    #[test]
    fn test_rejects_zero_parameters() {
        for bad in [
            options(0, 4, 4),
            options(2, 0, 4),
            options(2, 4, 0),
        ] {
            let err = Upscaler::new(IdentityEngine, bad).err().expect("should fail");
            assert!(matches!(err, Error::Config { .. }));
        }
    }

    #[test]
    fn test_rejects_non_divisible_tile_edge() {
        let err = Upscaler::new(IdentityEngine, options(3, 8, 4))
            .err()
            .expect("should fail");
        match err {
            Error::Config { name, .. } => assert_eq!(name, "output_tile_edge"),
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[test]
    fn test_input_edge_is_derived() {
        let upscaler = Upscaler::new(IdentityEngine, options(2, 512, 4)).unwrap();
        assert_eq!(upscaler.upscale_factor(), 2);
        assert_eq!(upscaler.input_tile_edge(), 256);
    }

    #[test]
    fn test_identity_round_trip_is_exact() {
        // Factor 1 with a value-preserving engine must reproduce the image
        // bit-for-bit: u8 → f32/255 → ×255 + 0.5 → u8 is the identity.
        let data: Vec<u8> = (0..4 * 4 * 3).map(|i| (i * 5 % 256) as u8).collect();
        let image = Image::from_raw(data.clone(), 4, 4).unwrap();

        let mut upscaler = Upscaler::new(IdentityEngine, options(1, 2, 4)).unwrap();
        let output = upscaler.upscale(&image).unwrap();

        assert_eq!(output.width(), 4);
        assert_eq!(output.height(), 4);
        assert_eq!(output.data(), data.as_slice());
    }

    #[test]
    fn test_repeated_calls_with_different_sizes() {
        let mut upscaler = Upscaler::new(IdentityEngine, options(1, 2, 2)).unwrap();

        let small = Image::from_raw(vec![10u8; 2 * 2 * 3], 2, 2).unwrap();
        let large = Image::from_raw(vec![20u8; 5 * 3 * 3], 3, 5).unwrap();

        let out_small = upscaler.upscale(&small).unwrap();
        let out_large = upscaler.upscale(&large).unwrap();
        assert_eq!((out_small.width(), out_small.height()), (2, 2));
        assert_eq!((out_large.width(), out_large.height()), (3, 5));
    }
}
