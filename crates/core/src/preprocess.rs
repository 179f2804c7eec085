//! Tile extraction: interleaved u8 RGB → channel-first normalized f32.

use ndarray::Array3;

use crate::grid::TileRect;
use crate::types::{Image, Tile, CHANNELS};

/// Copy one rectangle out of the image as an owned `(3, rows, cols)` tensor.
///
/// Reorders (row, col, channel) → (channel, row, col) and normalizes u8
/// values to [0,1] by dividing by 255. The returned tile shares nothing
/// with the source image.
pub fn extract_tile(image: &Image, rect: &TileRect) -> Tile {
    let width = image.width() as usize;
    let data = image.data();

    let mut tile = Array3::<f32>::zeros((CHANNELS, rect.rows(), rect.cols()));
    for r in 0..rect.rows() {
        let row_base = (rect.row_start + r) * width + rect.col_start;
        for c in 0..rect.cols() {
            let src = (row_base + c) * CHANNELS;
            for ch in 0..CHANNELS {
                tile[[ch, r, c]] = data[src + ch] as f32 / 255.0;
            }
        }
    }
    tile
}

/// Extract every tile of `grid` in order.
pub fn extract_tiles(image: &Image, grid: &[TileRect]) -> Vec<Tile> {
    grid.iter().map(|rect| extract_tile(image, rect)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tile_grid;

    fn checker_image(height: u32, width: u32) -> Image {
        let mut data = Vec::with_capacity((height * width * 3) as usize);
        for r in 0..height {
            for c in 0..width {
                let base = ((r * width + c) * 3) as u8;
                data.extend_from_slice(&[base, base.wrapping_add(1), base.wrapping_add(2)]);
            }
        }
        Image::from_raw(data, width, height).unwrap()
    }

    #[test]
    fn test_extract_reorders_to_channel_first() {
        let image = Image::from_raw(
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 128, 128, 128],
            2,
            2,
        )
        .unwrap();
        let rect = TileRect {
            row_start: 0,
            row_end: 2,
            col_start: 0,
            col_end: 2,
        };
        let tile = extract_tile(&image, &rect);

        assert_eq!(tile.dim(), (3, 2, 2));
        assert_eq!(tile[[0, 0, 0]], 1.0);
        assert_eq!(tile[[1, 0, 0]], 0.0);
        assert_eq!(tile[[1, 0, 1]], 1.0);
        assert_eq!(tile[[2, 1, 0]], 1.0);
        assert!((tile[[0, 1, 1]] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_extract_offset_rectangle() {
        let image = checker_image(4, 4);
        let rect = TileRect {
            row_start: 2,
            row_end: 4,
            col_start: 2,
            col_end: 4,
        };
        let tile = extract_tile(&image, &rect);

        // Pixel (2,2) starts at byte (2*4+2)*3 = 30.
        assert!((tile[[0, 0, 0]] - 30.0 / 255.0).abs() < 1e-6);
        assert!((tile[[1, 0, 0]] - 31.0 / 255.0).abs() < 1e-6);
        // Pixel (3,3) starts at byte (3*4+3)*3 = 45.
        assert!((tile[[0, 1, 1]] - 45.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_extract_ragged_tile_shape() {
        let image = checker_image(5, 5);
        let grid = tile_grid(5, 5, 2);
        let tiles = extract_tiles(&image, &grid);

        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles[0].dim(), (3, 2, 2));
        assert_eq!(tiles[2].dim(), (3, 2, 1));
        assert_eq!(tiles[6].dim(), (3, 1, 2));
        assert_eq!(tiles[8].dim(), (3, 1, 1));
    }

    #[test]
    fn test_extract_tiles_preserves_grid_order() {
        let image = checker_image(4, 4);
        let grid = tile_grid(4, 4, 2);
        let tiles = extract_tiles(&image, &grid);

        assert_eq!(tiles.len(), 4);
        // First pixel of each tile identifies its grid position.
        assert_eq!(tiles[0][[0, 0, 0]], 0.0);
        assert!((tiles[1][[0, 0, 0]] - 6.0 / 255.0).abs() < 1e-6);
        assert!((tiles[2][[0, 0, 0]] - 24.0 / 255.0).abs() < 1e-6);
        assert!((tiles[3][[0, 0, 0]] - 30.0 / 255.0).abs() < 1e-6);
    }
}
