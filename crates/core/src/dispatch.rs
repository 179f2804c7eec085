//! Batched dispatch of tiles through an inference engine.

use ndarray::{stack, Axis};
use tracing::debug;

use crate::engine::{BatchMode, TileEngine};
use crate::error::{Error, Result};
use crate::types::Tile;

/// Run `tiles` through `engine` in consecutive chunks of `batch_size`,
/// preserving order: result `i` always corresponds to input tile `i`.
///
/// A chunk is stacked into one batch only when every tile in it has the
/// same shape as the first tile of the whole sequence. Chunks touching
/// ragged edge tiles (and every chunk, for a `SingleOnly` engine) fall
/// back to per-item submission. Engine errors are fatal and propagate
/// unchanged; nothing is retried.
pub fn dispatch<E: TileEngine>(
    engine: &mut E,
    tiles: Vec<Tile>,
    batch_size: usize,
) -> Result<Vec<Tile>> {
    debug_assert!(batch_size > 0, "batch size must be positive");

    if tiles.is_empty() {
        return Ok(Vec::new());
    }

    // Uniformity is judged against the first tile of the entire sequence,
    // not the first tile of each chunk.
    let reference_shape = tiles[0].raw_dim();
    let total = tiles.len();
    debug!(total, batch_size, "dispatching tiles");

    let mut results = Vec::with_capacity(total);
    let mut queue = tiles.into_iter();
    loop {
        let chunk: Vec<Tile> = queue.by_ref().take(batch_size).collect();
        if chunk.is_empty() {
            break;
        }

        let uniform = chunk.iter().all(|tile| tile.raw_dim() == reference_shape);
        if uniform && engine.batch_mode() == BatchMode::Batched {
            let views: Vec<_> = chunk.iter().map(|tile| tile.view()).collect();
            let batch = stack(Axis(0), &views).expect("shape-uniform chunk stacks");
            let output = engine.infer_batch(batch).map_err(Error::Inference)?;
            for tile in output.axis_iter(Axis(0)) {
                results.push(tile.to_owned());
            }
        } else {
            for tile in chunk {
                results.push(engine.infer(tile).map_err(Error::Inference)?);
            }
        }
    }

    Ok(results)
}
