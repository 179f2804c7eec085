//! Row-major tile grid computation.

/// Half-open rectangle of image coordinates covered by one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl TileRect {
    pub fn rows(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn cols(&self) -> usize {
        self.col_end - self.col_start
    }
}

/// Compute the row-major grid of tile rectangles covering `height` × `width`.
///
/// Steps by `edge` in each dimension, outer loop over rows, inner over
/// columns. The last tile in a row or column is clipped to the image
/// boundary, so edge tiles are smaller than `edge` when a dimension is not
/// an exact multiple — but never empty.
///
/// Pure function of its arguments; callers recompute the grid per image
/// rather than caching it.
pub fn tile_grid(height: usize, width: usize, edge: usize) -> Vec<TileRect> {
    debug_assert!(edge > 0, "tile edge must be positive");

    let mut grid = Vec::new();
    let mut row = 0;
    while row < height {
        let row_end = (row + edge).min(height);
        let mut col = 0;
        while col < width {
            grid.push(TileRect {
                row_start: row,
                row_end,
                col_start: col,
                col_end: (col + edge).min(width),
            });
            col += edge;
        }
        row += edge;
    }
    grid
}
