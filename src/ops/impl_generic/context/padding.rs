//! Boundary padding: which output slots take which padding-parameter rows.
//!
//! The output of a segment with `h` rows is viewed as `h * context_length`
//! logical rows of width `W`; logical row `r * context_length + f` is slot `f`
//! of output row `r`. A [`PadSpan`] names a run of logical rows and the
//! padding rows that fill them.

use log::trace;

use super::window::ContextWindow;
use crate::error::{Error, Result};

/// `rows` consecutive logical output rows starting at `out_row`, paired with
/// padding-parameter rows starting at `pad_row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadSpan {
    pub out_row: usize,
    pub pad_row: usize,
    pub rows: usize,
}

/// Spans for the left edge of a segment of `height` rows.
///
/// Output row `k` takes `min(context_length, up_pad - k)` padding rows starting
/// at padding row `k`. Capped at `height` so a short segment is not over-padded.
fn up_pad_spans(height: usize, window: &ContextWindow, spans: &mut Vec<PadSpan>) {
    if window.up_pad == 0 {
        return;
    }
    let length = window.context_length;
    for k in 0..window.up_pad.min(height) {
        let rows = if k + length < window.up_pad {
            length
        } else {
            window.up_pad - k
        };
        spans.push(PadSpan {
            out_row: k * length,
            pad_row: k,
            rows,
        });
    }
}

/// Spans for the right edge of a segment of `height` rows.
///
/// Walks the output rows whose window runs past the segment end. `size` is
/// the number of trailing slots that fall outside the segment and grows by one
/// per row until it saturates at `context_length`; from then on the first
/// padding row used (`idx`) advances instead. When the window starts past the
/// segment end every slot is padding and `idx` tracks the row directly.
/// This must agree with the slots the columnize kernel leaves without input.
fn down_pad_spans(height: usize, window: &ContextWindow, spans: &mut Vec<PadSpan>) {
    if window.down_pad == 0 {
        return;
    }
    let h = height as i64;
    let start = window.context_start;
    let length = window.context_length as i64;
    let up = window.up_pad as i64;

    let begin_row = (h - start - length + 1).max(0) + 1;
    let padding_begin = (start - h).max(0);
    let window_past_end = start >= h;

    let mut size = if window_past_end {
        length
    } else if h - start >= length {
        1
    } else {
        length - (h - start)
    };
    let mut idx = padding_begin;

    let mut t = 0i64;
    while t + begin_row <= h {
        if window_past_end {
            size = length;
        }
        if size > length {
            size = length;
            idx += 1;
        }
        if padding_begin > 0 || h == start {
            idx = padding_begin + t;
        }
        spans.push(PadSpan {
            out_row: ((begin_row + t) * length - size) as usize,
            pad_row: (up + idx) as usize,
            rows: size as usize,
        });
        t += 1;
        size += 1;
    }
}

/// Padding spans of one segment with `height` rows, relative to the segment.
pub fn segment_pad_spans(height: usize, window: &ContextWindow) -> Vec<PadSpan> {
    let mut spans = Vec::new();
    up_pad_spans(height, window, &mut spans);
    down_pad_spans(height, window, &mut spans);
    spans
}

/// Padding spans of a whole batch, with `out_row` absolute in the batch's
/// logical-row view. Empty segments contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaddingPlan {
    pub spans: Vec<PadSpan>,
}

impl PaddingPlan {
    pub fn new(boundary: &[usize], window: &ContextWindow) -> Self {
        let mut spans = Vec::new();
        if window.up_pad == 0 && window.down_pad == 0 {
            return Self { spans };
        }
        for seg in boundary.windows(2) {
            let (begin, end) = (seg[0], seg[1]);
            if begin == end {
                continue;
            }
            let base = begin * window.context_length;
            for span in segment_pad_spans(end - begin, window) {
                trace!(
                    "pad span: out rows {}..{} <- pad rows {}..{}",
                    base + span.out_row,
                    base + span.out_row + span.rows,
                    span.pad_row,
                    span.pad_row + span.rows
                );
                spans.push(PadSpan {
                    out_row: base + span.out_row,
                    ..span
                });
            }
        }
        Self { spans }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Check every span lies inside an output of `output_rows` logical rows and
    /// a padding parameter of `padding_rows` rows.
    pub fn check_bounds(&self, output_rows: usize, padding_rows: usize) -> Result<()> {
        for span in &self.spans {
            if span.out_row + span.rows > output_rows || span.pad_row + span.rows > padding_rows {
                return Err(Error::invalid(
                    "padding",
                    format!(
                        "pad span {span:?} out of range (output rows {output_rows}, padding rows {padding_rows})"
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Copy padding rows into the output (forward).
pub fn fill_padding(plan: &PaddingPlan, padding: &[f32], output: &mut [f32], width: usize) {
    for span in &plan.spans {
        let n = span.rows * width;
        let src = span.pad_row * width;
        let dst = span.out_row * width;
        output[dst..dst + n].copy_from_slice(&padding[src..src + n]);
    }
}

/// `pad_grad[span] += output_grad[span]` for every span (gradient).
///
/// Several segments hit the same padding rows, so this accumulates.
pub fn accumulate_padding_grad(
    plan: &PaddingPlan,
    output_grad: &[f32],
    pad_grad: &mut [f32],
    width: usize,
) {
    for span in &plan.spans {
        let n = span.rows * width;
        let src = span.out_row * width;
        let dst = span.pad_row * width;
        for (g, &o) in pad_grad[dst..dst + n]
            .iter_mut()
            .zip(&output_grad[src..src + n])
        {
            *g += o;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(out_row: usize, pad_row: usize, rows: usize) -> PadSpan {
        PadSpan {
            out_row,
            pad_row,
            rows,
        }
    }

    #[test]
    fn test_symmetric_window() {
        // start=-1, length=3: first row slot 0 <- up[0], last row slot 2 <- down[0]
        let w = ContextWindow::new(-1, 3).with_trainable_padding(true);
        assert_eq!(segment_pad_spans(3, &w), vec![span(0, 0, 1), span(8, 1, 1)]);
    }

    #[test]
    fn test_single_row_segment() {
        let w = ContextWindow::new(-1, 3);
        assert_eq!(segment_pad_spans(1, &w), vec![span(0, 0, 1), span(2, 1, 1)]);
    }

    #[test]
    fn test_down_pad_grows_per_row() {
        // start=0, length=3, 5 rows: row 3 needs 1 pad slot, row 4 needs 2
        let w = ContextWindow::new(0, 3);
        assert_eq!(w.down_pad, 2);
        assert_eq!(segment_pad_spans(5, &w), vec![span(11, 0, 1), span(13, 0, 2)]);
    }

    #[test]
    fn test_down_pad_saturates_and_advances() {
        // start=2, length=2: rows 2,3,4 of a 5-row segment look past the end
        let w = ContextWindow::new(2, 2);
        assert_eq!(w.down_pad, 3);
        assert_eq!(
            segment_pad_spans(5, &w),
            vec![span(5, 0, 1), span(6, 0, 2), span(8, 1, 2)]
        );
    }

    #[test]
    fn test_window_entirely_past_segment() {
        // start=2 on a 1-row segment: both slots come from down rows 1 and 2
        let w = ContextWindow::new(2, 2);
        assert_eq!(segment_pad_spans(1, &w), vec![span(0, 1, 2)]);
    }

    #[test]
    fn test_wide_up_pad_on_short_segment() {
        // start=-3, length=2: up_pad 3, but a 2-row segment only pads rows 0 and 1
        let w = ContextWindow::new(-3, 2);
        assert_eq!((w.up_pad, w.down_pad), (3, 0));
        assert_eq!(segment_pad_spans(2, &w), vec![span(0, 0, 2), span(2, 1, 2)]);
    }

    #[test]
    fn test_plan_skips_empty_segments() {
        let w = ContextWindow::new(-1, 3);
        let plan = PaddingPlan::new(&[0, 0, 2], &w);
        assert_eq!(plan.spans, vec![span(0, 0, 1), span(5, 1, 1)]);
        assert!(plan.check_bounds(6, 2).is_ok());
        assert!(plan.check_bounds(5, 2).is_err());
    }

    #[test]
    fn test_fill_and_accumulate() {
        let w = ContextWindow::new(-1, 3);
        let plan = PaddingPlan::new(&[0, 1, 2], &w);
        let padding = [9.0f32, 8.0];
        let mut out = vec![0.0f32; 6];
        fill_padding(&plan, &padding, &mut out, 1);
        assert_eq!(out, vec![9.0, 0.0, 8.0, 9.0, 0.0, 8.0]);

        let grad = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut pad_grad = vec![0.5f32, 0.5];
        accumulate_padding_grad(&plan, &grad, &mut pad_grad, 1);
        assert_eq!(pad_grad, vec![0.5 + 1.0 + 4.0, 0.5 + 3.0 + 6.0]);
    }
}
