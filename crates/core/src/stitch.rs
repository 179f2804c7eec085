//! Reassembly of processed tiles into the full-resolution output image.

use ndarray::{s, Array3};

use crate::error::{Error, Result};
use crate::grid::tile_grid;
use crate::types::{Image, Tile, CHANNELS};

/// Stitch `results` onto the row-major output grid of `output_edge` tiles
/// covering `out_height` × `out_width`, then quantize to 8-bit.
///
/// Each destination pixel is written by exactly one tile; the grid
/// rectangles are disjoint by construction. Quantization multiplies by
/// 255, adds 0.5 and truncates after clamping to [0, 255], so halves round
/// up instead of the systematic downward bias of plain truncation.
pub fn stitch(
    results: &[Tile],
    out_height: usize,
    out_width: usize,
    output_edge: usize,
) -> Result<Image> {
    let grid = tile_grid(out_height, out_width, output_edge);
    if grid.len() != results.len() {
        return Err(Error::GridMismatch {
            expected: grid.len(),
            actual: results.len(),
        });
    }

    let mut canvas = Array3::<f32>::zeros((out_height, out_width, CHANNELS));
    for (rect, tile) in grid.iter().zip(results) {
        let expected = (CHANNELS, rect.rows(), rect.cols());
        if tile.dim() != expected {
            return Err(Error::TileShape {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", tile.dim()),
            });
        }

        canvas
            .slice_mut(s![
                rect.row_start..rect.row_end,
                rect.col_start..rect.col_end,
                ..
            ])
            .assign(&tile.view().permuted_axes([1, 2, 0]));
    }

    let slice = canvas.as_slice().expect("canvas is C-contiguous");
    let data: Vec<u8> = slice
        .iter()
        .map(|&v| (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8)
        .collect();

    Image::from_raw(data, out_width as u32, out_height as u32)
}
