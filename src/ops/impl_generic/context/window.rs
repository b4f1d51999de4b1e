//! Context window shape parameters

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest `|context_start|` and `context_length` accepted; kernels take them as `i32`.
pub const MAX_CONTEXT_EXTENT: usize = i32::MAX as usize;

/// Shape of the context window slid over every segment.
///
/// Output row `i` of a segment is the concatenation of the `context_length`
/// rows `[i + context_start, i + context_start + context_length)` relative to
/// the segment start. Rows left of the segment come from the first `up_pad`
/// padding rows, rows right of it from the following `down_pad` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Offset of the first window slot relative to the current row (may be negative)
    pub context_start: i64,
    /// Number of rows concatenated per output row
    pub context_length: usize,
    /// Row stride of the window; only 1 is supported
    pub context_stride: usize,
    /// Padding rows needed left of a segment
    pub up_pad: usize,
    /// Padding rows needed right of a segment
    pub down_pad: usize,
    /// Pad from a learned parameter instead of zeros
    pub padding_trainable: bool,
}

impl ContextWindow {
    /// Window with zero padding, unit stride and pads derived from start/length.
    pub fn new(context_start: i64, context_length: usize) -> Self {
        Self {
            context_start,
            context_length,
            context_stride: 1,
            up_pad: Self::derived_up_pad(context_start),
            down_pad: Self::derived_down_pad(context_start, context_length),
            padding_trainable: false,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.context_stride = stride;
        self
    }

    pub fn with_trainable_padding(mut self, trainable: bool) -> Self {
        self.padding_trainable = trainable;
        self
    }

    /// Override the pads with caller-supplied values. `validate` checks them.
    pub fn with_pads(mut self, up_pad: usize, down_pad: usize) -> Self {
        self.up_pad = up_pad;
        self.down_pad = down_pad;
        self
    }

    /// `max(0, -context_start)`
    pub fn derived_up_pad(context_start: i64) -> usize {
        context_start.saturating_neg().max(0) as usize
    }

    /// `max(0, context_start + context_length - 1)`
    pub fn derived_down_pad(context_start: i64, context_length: usize) -> usize {
        context_start
            .saturating_add_unsigned(context_length as u64)
            .saturating_sub(1)
            .max(0) as usize
    }

    /// Rows in the padding parameter: `up_pad + down_pad`.
    pub fn padding_rows(&self) -> usize {
        self.up_pad + self.down_pad
    }

    /// Width of one output row for feature width `width`.
    pub fn output_width(&self, width: usize) -> usize {
        self.context_length * width
    }

    pub fn validate(&self) -> Result<()> {
        if self.context_length == 0 {
            return Err(Error::invalid("context_length", "must be positive"));
        }
        if self.context_length > MAX_CONTEXT_EXTENT {
            return Err(Error::invalid(
                "context_length",
                format!("must not exceed {MAX_CONTEXT_EXTENT}"),
            ));
        }
        if self.context_start.unsigned_abs() > MAX_CONTEXT_EXTENT as u64 {
            return Err(Error::invalid(
                "context_start",
                format!("magnitude must not exceed {MAX_CONTEXT_EXTENT}"),
            ));
        }
        // Output row i reads rows [i + start, i + start + length); padding spans assume this.
        if self.context_stride != 1 {
            return Err(Error::invalid(
                "context_stride",
                format!("only unit stride is supported, got {}", self.context_stride),
            ));
        }
        let up = Self::derived_up_pad(self.context_start);
        if self.up_pad != up {
            return Err(Error::invalid(
                "up_pad",
                format!(
                    "context_start {} requires up_pad {up}, got {}",
                    self.context_start, self.up_pad
                ),
            ));
        }
        let down = Self::derived_down_pad(self.context_start, self.context_length);
        if self.down_pad != down {
            return Err(Error::invalid(
                "down_pad",
                format!(
                    "context_start {} with context_length {} requires down_pad {down}, got {}",
                    self.context_start, self.context_length, self.down_pad
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_pads() {
        let w = ContextWindow::new(-1, 3);
        assert_eq!((w.up_pad, w.down_pad), (1, 1));
        assert_eq!(w.padding_rows(), 2);

        let w = ContextWindow::new(0, 1);
        assert_eq!((w.up_pad, w.down_pad), (0, 0));

        let w = ContextWindow::new(2, 2);
        assert_eq!((w.up_pad, w.down_pad), (0, 3));

        let w = ContextWindow::new(-4, 2);
        assert_eq!((w.up_pad, w.down_pad), (4, 0));
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(ContextWindow::new(0, 0).validate().is_err());
        assert!(ContextWindow::new(-1, 3).with_stride(0).validate().is_err());
        assert!(ContextWindow::new(-1, 3).with_stride(1).validate().is_ok());
        assert!(ContextWindow::new(-1, 3).with_pads(2, 1).validate().is_err());
        assert!(ContextWindow::new(-1, 3).with_pads(1, 0).validate().is_err());
        assert!(ContextWindow::new(-1, 3).with_pads(1, 1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_unit_stride() {
        let err = ContextWindow::new(-2, 3)
            .with_stride(2)
            .with_trainable_padding(true)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument {
                arg: "context_stride",
                ..
            }
        ));
    }

    #[test]
    fn test_extreme_start_does_not_overflow() {
        let w = ContextWindow::new(i64::MIN, 3);
        assert_eq!(w.up_pad, i64::MAX as usize);
        assert_eq!(w.down_pad, 0);
        assert!(matches!(
            w.validate().unwrap_err(),
            Error::InvalidArgument {
                arg: "context_start",
                ..
            }
        ));

        let w = ContextWindow::new(i64::MAX, usize::MAX);
        assert_eq!(w.down_pad, (i64::MAX - 1) as usize);
        assert!(w.validate().is_err());

        let edge = MAX_CONTEXT_EXTENT as i64;
        assert!(ContextWindow::new(-edge, 3).validate().is_ok());
        assert!(ContextWindow::new(edge, 3).validate().is_ok());
        assert!(ContextWindow::new(edge + 1, 3).validate().is_err());
    }

    #[test]
    fn test_output_width() {
        assert_eq!(ContextWindow::new(-1, 3).output_width(2), 6);
    }
}
