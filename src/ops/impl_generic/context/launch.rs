//! Argument set for the fused windowing kernel.

use super::metadata::PackedMetadata;
use super::window::ContextWindow;

/// Shape arguments shared by the columnize and decolumnize launches.
///
/// Slot `f` of output row `r` reads input row `r * stride + f * dilation - pad_up`
/// of its segment; rows outside `[0, input_height)` are not read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLaunch {
    /// Segments in the packed metadata block (grid x)
    pub segments: usize,
    /// Largest output height of any segment (grid y)
    pub max_output_rows: usize,
    /// Window slots per output row (filter height)
    pub context_length: usize,
    /// Feature width of one row (filter width)
    pub width: usize,
    pub stride: usize,
    pub dilation: usize,
    pub pad_up: usize,
    pub pad_down: usize,
}

impl WindowLaunch {
    pub fn new(meta: &PackedMetadata, window: &ContextWindow, width: usize) -> Self {
        Self {
            segments: meta.segments(),
            max_output_rows: meta.max_output_height(),
            context_length: window.context_length,
            width,
            stride: window.context_stride,
            dilation: 1,
            pad_up: window.up_pad,
            pad_down: window.down_pad,
        }
    }

    /// No segment has output rows to produce.
    pub fn is_empty(&self) -> bool {
        self.segments == 0 || self.max_output_rows == 0
    }

    /// Input row for slot `slot` of output row `row`, or `None` when it falls
    /// outside `[0, input_height)`.
    #[inline]
    pub fn source_row(&self, row: usize, slot: usize, input_height: usize) -> Option<usize> {
        let im_row = (row * self.stride + slot * self.dilation) as i64 - self.pad_up as i64;
        if im_row >= 0 && (im_row as usize) < input_height {
            Some(im_row as usize)
        } else {
            None
        }
    }

    /// Elements in one output row.
    pub fn output_width(&self) -> usize {
        self.context_length * self.width
    }
}
