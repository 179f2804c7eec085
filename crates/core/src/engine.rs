//! Inference engine boundary.
//!
//! The pipeline treats the learned transform as an opaque function over
//! tiles; [`TileEngine`] is that boundary. [`OrtEngine`] is the production
//! implementation on top of `ort::Session`, handling FP32 and FP16 models
//! (e.g. Real-ESRGAN and AnimeJaNai exports) transparently.

use anyhow::{Context, Result};
use half::f16;
use half::slice::HalfFloatSliceExt;
use ndarray::{Array3, Array4, ArrayD, Axis};
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use crate::backend::{build_session, SessionConfig};

/// Whether an engine accepts stacked multi-tile batches.
///
/// Fixed when the engine is constructed; the dispatcher never probes per
/// call. Models exported with a hard-coded unit batch dimension must use
/// `SingleOnly`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchMode {
    #[default]
    Batched,
    SingleOnly,
}

/// Opaque tile inference function.
///
/// Implementations must be shape-preserving up to the model's scale factor
/// and must keep tiles in submission order; the pipeline verifies neither
/// and treats any violation as a broken invariant downstream.
pub trait TileEngine {
    /// Batch capability, decided at configuration time.
    fn batch_mode(&self) -> BatchMode;

    /// Run one stacked `(n, 3, rows, cols)` batch. The returned tensor
    /// carries the same leading dimension, tiles in input order.
    fn infer_batch(&mut self, batch: Array4<f32>) -> Result<Array4<f32>>;

    /// Run a single `(3, rows, cols)` tile.
    fn infer(&mut self, tile: Array3<f32>) -> Result<Array3<f32>>;
}

impl<E: TileEngine + ?Sized> TileEngine for &mut E {
    fn batch_mode(&self) -> BatchMode {
        (**self).batch_mode()
    }

    fn infer_batch(&mut self, batch: Array4<f32>) -> Result<Array4<f32>> {
        (**self).infer_batch(batch)
    }

    fn infer(&mut self, tile: Array3<f32>) -> Result<Array3<f32>> {
        (**self).infer(tile)
    }
}

/// ONNX Runtime backed engine.
pub struct OrtEngine {
    session: Session,
    input_name: String,
    output_name: String,
    is_fp16: bool,
    batch_mode: BatchMode,
}

impl OrtEngine {
    /// Load an ONNX model and fix the engine configuration.
    ///
    /// Input/output tensor names and the element type are read from the
    /// session metadata, so mixed FP32/FP16 model zoos work without flags.
    pub fn load(config: &SessionConfig<'_>, batch_mode: BatchMode) -> Result<Self> {
        let session = build_session(config)?;

        let input_name = session.inputs()[0].name().to_string();
        let output_name = session.outputs()[0].name().to_string();
        let is_fp16 = match session.inputs()[0].dtype() {
            ort::value::ValueType::Tensor { ty, .. } => {
                *ty == ort::tensor::TensorElementType::Float16
            }
            _ => false,
        };

        debug!(%input_name, %output_name, is_fp16, ?batch_mode, "Detected model IO");

        Ok(Self {
            session,
            input_name,
            output_name,
            is_fp16,
            batch_mode,
        })
    }
}

impl TileEngine for OrtEngine {
    fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    fn infer_batch(&mut self, batch: Array4<f32>) -> Result<Array4<f32>> {
        let output = run_inference(
            &mut self.session,
            &self.input_name,
            &self.output_name,
            self.is_fp16,
            batch.into_dyn(),
        )?;
        output
            .into_dimensionality::<ndarray::Ix4>()
            .context("model output is not a rank-4 batch tensor")
    }

    fn infer(&mut self, tile: Array3<f32>) -> Result<Array3<f32>> {
        let unit_batch = tile.insert_axis(Axis(0));
        let output = run_inference(
            &mut self.session,
            &self.input_name,
            &self.output_name,
            self.is_fp16,
            unit_batch.into_dyn(),
        )?;
        let output = output
            .into_dimensionality::<ndarray::Ix4>()
            .context("model output is not a rank-4 tensor")?;
        Ok(output.index_axis_move(Axis(0), 0))
    }
}

fn run_inference(
    session: &mut Session,
    input_name: &str,
    output_name: &str,
    is_fp16: bool,
    input: ArrayD<f32>,
) -> Result<ArrayD<f32>> {
    if is_fp16 {
        run_fp16_inference(session, input_name, output_name, input)
    } else {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = session.run(ort::inputs![input_name => &input_tensor])?;
        let output_view = outputs[output_name].try_extract_array::<f32>()?;
        Ok(output_view.to_owned())
    }
}

/// FP16 models get f32 ↔ f16 conversion at the session boundary; the rest
/// of the pipeline only ever sees f32.
fn run_fp16_inference(
    session: &mut Session,
    input_name: &str,
    output_name: &str,
    input: ArrayD<f32>,
) -> Result<ArrayD<f32>> {
    let f32_slice = input
        .as_slice()
        .context("input tensor must be contiguous for f16 conversion")?;
    let mut fp16_data = vec![f16::ZERO; f32_slice.len()];
    fp16_data.convert_from_f32_slice(f32_slice);

    let fp16_array = ArrayD::from_shape_vec(input.shape().to_vec(), fp16_data)?;
    let input_tensor = Tensor::from_array(fp16_array)?;
    let outputs = session.run(ort::inputs![input_name => &input_tensor])?;
    let output_view = outputs[output_name].try_extract_array::<f16>()?;

    let fp16_owned;
    let fp16_slice = if let Some(s) = output_view.as_slice() {
        s
    } else {
        fp16_owned = output_view.as_standard_layout().into_owned();
        fp16_owned.as_slice().unwrap()
    };
    let mut f32_data = vec![0.0f32; fp16_slice.len()];
    fp16_slice.convert_to_f32_slice(&mut f32_data);

    Ok(ArrayD::from_shape_vec(
        output_view.shape().to_vec(),
        f32_data,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_mode_defaults_to_batched() {
        assert_eq!(BatchMode::default(), BatchMode::Batched);
    }
}
