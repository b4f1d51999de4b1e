//! Forward / gradient orchestration over host buffers.
//!
//! Order of one call: validate everything → build descriptors (worker pool) →
//! pack metadata → one fused kernel call → padding fill / accumulate. Nothing
//! is written before validation passes.

use log::{debug, warn};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

use super::config::ContextProjectConfig;
use super::descriptor::{RowAddressing, build_descriptors};
use super::launch::WindowLaunch;
use super::metadata::{PackedMetadata, SegmentArrays};
use super::padding::{PaddingPlan, accumulate_padding_grad, fill_padding};
use super::window::ContextWindow;
use crate::error::{Error, Result};
use crate::ops::cpu::kernels::context_window::{columnize_f32, decolumnize_f32};

/// Check `boundary` describes `rows` batch rows: starts at 0, never decreases,
/// ends at `rows`.
pub fn check_boundary(boundary: &[usize], rows: usize) -> Result<()> {
    let (Some(&first), Some(&last)) = (boundary.first(), boundary.last()) else {
        return Err(Error::invalid("boundary", "needs at least one offset"));
    };
    if first != 0 {
        return Err(Error::invalid(
            "boundary",
            format!("first offset must be 0, got {first}"),
        ));
    }
    if let Some(i) = boundary.windows(2).position(|w| w[0] > w[1]) {
        return Err(Error::invalid(
            "boundary",
            format!(
                "offsets must not decrease: boundary[{i}]={} > boundary[{}]={}",
                boundary[i],
                i + 1,
                boundary[i + 1]
            ),
        ));
    }
    if last != rows {
        return Err(Error::ShapeMismatch {
            arg: "boundary",
            expected: vec![rows],
            got: vec![last],
        });
    }
    Ok(())
}

/// Shape of a 2-D F32 tensor as `(rows, width)`.
pub(crate) fn check_f32_matrix<R: Runtime>(
    arg: &'static str,
    t: &Tensor<R>,
) -> Result<(usize, usize)> {
    if t.dtype() != DType::F32 {
        return Err(Error::DTypeMismatch {
            expected: DType::F32,
            got: t.dtype(),
        });
    }
    match t.shape() {
        &[rows, width] => Ok((rows, width)),
        other => Err(Error::invalid(
            arg,
            format!("expected a 2-D [rows, width] tensor, got shape {other:?}"),
        )),
    }
}

/// Check a padding tensor is exactly `[up_pad + down_pad, width]`.
pub(crate) fn check_padding_shape(
    pad_rows: usize,
    pad_width: usize,
    window: &ContextWindow,
    width: usize,
) -> Result<()> {
    let expected = [window.padding_rows(), width];
    if [pad_rows, pad_width] != expected {
        return Err(Error::ShapeMismatch {
            arg: "padding",
            expected: expected.to_vec(),
            got: vec![pad_rows, pad_width],
        });
    }
    Ok(())
}

pub(crate) fn check_len(arg: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(Error::ShapeMismatch {
            arg,
            expected: vec![expected],
            got: vec![got],
        });
    }
    Ok(())
}

/// Descriptors packed and sized for one kernel call.
#[derive(Debug, Clone)]
pub struct ContextPlan {
    pub arrays: SegmentArrays,
    pub meta: PackedMetadata,
    pub launch: WindowLaunch,
}

impl ContextPlan {
    /// Build descriptors on the worker pool, then pack them.
    ///
    /// `input` / `output` give the addressing of the batch-shaped and the
    /// context-shaped buffer the kernel will touch.
    pub fn build(
        boundary: &[usize],
        window: &ContextWindow,
        config: &ContextProjectConfig,
        width: usize,
        input: RowAddressing,
        output: RowAddressing,
    ) -> Result<Self> {
        let descriptors = build_descriptors(boundary, window, input, output, config.workers)?;
        let arrays = SegmentArrays::from_descriptors(&descriptors, boundary)?;
        let meta = PackedMetadata::pack(&arrays)?;
        let launch = WindowLaunch::new(&meta, window, width);

        debug!(
            "context plan: {} segments, max output rows {}, metadata {} bytes, {} workers",
            launch.segments,
            launch.max_output_rows,
            meta.layout().bytes(),
            config.workers
        );
        if launch.segments > 0 && launch.is_empty() {
            warn!(
                "context projection over {} segments has no kernel work",
                launch.segments
            );
        }
        Ok(Self {
            arrays,
            meta,
            launch,
        })
    }
}

/// Context projection functor over host `f32` buffers.
///
/// Buffers are row-major: the batch is `rows × width`, the context output is
/// `rows × (context_length * width)`, the padding parameter is
/// `(up_pad + down_pad) × width`.
#[derive(Debug, Clone, Copy)]
pub struct ContextProjector {
    window: ContextWindow,
    config: ContextProjectConfig,
}

impl ContextProjector {
    pub fn new(window: ContextWindow, config: ContextProjectConfig) -> Result<Self> {
        window.validate()?;
        config.validate()?;
        Ok(Self { window, config })
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn config(&self) -> &ContextProjectConfig {
        &self.config
    }

    /// Fill `output` with the context windows of `input`.
    ///
    /// Output rows of segments whose window reads no input row are only
    /// touched by trainable padding; pass a zeroed buffer for zero padding.
    pub fn forward(
        &self,
        input: &[f32],
        width: usize,
        boundary: &[usize],
        padding: Option<&[f32]>,
        output: &mut [f32],
    ) -> Result<()> {
        let window = &self.window;
        let padding = if window.padding_trainable {
            Some(padding.ok_or_else(|| {
                Error::invalid("padding", "trainable padding requires a padding parameter")
            })?)
        } else {
            None
        };
        let rows = rows_of(input.len(), width, "input")?;
        check_boundary(boundary, rows)?;
        let out_width = window.output_width(width);
        check_len("output", output.len(), rows * out_width)?;
        if let Some(padding) = padding {
            check_len("padding", padding.len(), window.padding_rows() * width)?;
        }
        let pad_plan = match padding {
            Some(_) => {
                let plan = PaddingPlan::new(boundary, window);
                plan.check_bounds(rows * window.context_length, window.padding_rows())?;
                plan
            }
            None => PaddingPlan::default(),
        };

        let plan = ContextPlan::build(
            boundary,
            window,
            &self.config,
            width,
            RowAddressing::host(width),
            RowAddressing::host(out_width),
        )?;
        if !plan.launch.is_empty() {
            columnize_f32(&plan.meta, &plan.launch, input, output);
        }

        if let Some(padding) = padding {
            fill_padding(&pad_plan, padding, output, width);
        }
        Ok(())
    }

    /// Accumulate `output_grad` into `input_grad` and, when padding is
    /// trainable, into `padding_grad`. Both targets are `+=`; zero them first
    /// for a plain gradient.
    pub fn backward(
        &self,
        output_grad: &[f32],
        width: usize,
        boundary: &[usize],
        input_grad: Option<&mut [f32]>,
        padding_grad: Option<&mut [f32]>,
    ) -> Result<()> {
        let window = &self.window;
        let out_width = window.output_width(width);
        let rows = rows_of(output_grad.len(), out_width, "output_grad")?;
        check_boundary(boundary, rows)?;
        if let Some(input_grad) = input_grad.as_deref() {
            check_len("input_grad", input_grad.len(), rows * width)?;
        }
        let padding_grad = match padding_grad {
            Some(grad) if window.padding_trainable => {
                check_len("padding_grad", grad.len(), window.padding_rows() * width)?;
                Some(grad)
            }
            Some(_) => {
                debug!("padding gradient requested for zero padding, skipping");
                None
            }
            None => None,
        };
        let pad_plan = match padding_grad {
            Some(_) => {
                let plan = PaddingPlan::new(boundary, window);
                plan.check_bounds(rows * window.context_length, window.padding_rows())?;
                plan
            }
            None => PaddingPlan::default(),
        };

        if let Some(input_grad) = input_grad {
            let plan = ContextPlan::build(
                boundary,
                window,
                &self.config,
                width,
                RowAddressing::host(width),
                RowAddressing::host(out_width),
            )?;
            if !plan.launch.is_empty() {
                decolumnize_f32(&plan.meta, &plan.launch, output_grad, input_grad);
            }
        }

        if let Some(padding_grad) = padding_grad {
            accumulate_padding_grad(&pad_plan, output_grad, padding_grad, width);
        }
        Ok(())
    }
}

fn rows_of(len: usize, row_width: usize, arg: &'static str) -> Result<usize> {
    if row_width == 0 {
        return Err(Error::invalid("width", "feature width must be positive"));
    }
    if len % row_width != 0 {
        return Err(Error::invalid(
            arg,
            format!("{len} elements is not a whole number of rows of width {row_width}"),
        ));
    }
    Ok(len / row_width)
}
