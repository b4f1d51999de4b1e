//! Per-segment descriptors, built in parallel over static worker ranges.
//!
//! Every segment `t` of the boundary vector gets one slot. A slot is `None`
//! when the segment is empty or its window reads no input row; later stages
//! skip `None` slots without further checks.

use std::ops::Range;

use log::trace;

use super::window::ContextWindow;
use crate::error::{Error, Result};

/// Addressing of a row-major buffer: `row(r) = base + r * row_pitch`.
///
/// Host buffers use element offsets (`base = 0`, pitch in elements); device
/// buffers use raw device addresses with a pitch in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowAddressing {
    pub base: u64,
    pub row_pitch: u64,
}

impl RowAddressing {
    /// Element offsets into a host buffer whose rows hold `width` values.
    pub fn host(width: usize) -> Self {
        Self {
            base: 0,
            row_pitch: width as u64,
        }
    }

    /// Byte addresses into an f32 device buffer starting at `base`.
    pub fn device_f32(base: u64, width: usize) -> Self {
        Self {
            base,
            row_pitch: (width * std::mem::size_of::<f32>()) as u64,
        }
    }

    #[inline]
    pub fn row(&self, row: usize) -> u64 {
        self.base + row as u64 * self.row_pitch
    }
}

/// Where one segment reads its input rows and writes its output rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// First batch row the window may read
    pub input_row_begin: usize,
    /// Readable input rows, starting at `input_row_begin`
    pub input_row_count: usize,
    /// First output row (equals the segment's boundary offset)
    pub output_row_begin: usize,
    /// Output rows of the segment
    pub output_row_count: usize,
    /// Address of `input_row_begin`
    pub input_addr: u64,
    /// Address of `output_row_begin`
    pub output_addr: u64,
}

/// Split `n` segments into `workers` contiguous ranges.
///
/// The first `n % workers` ranges hold `ceil(n / workers)` segments, the rest
/// `floor(n / workers)`. Ranges are returned in order and cover `[0, n)` once.
pub fn worker_ranges(n: usize, workers: usize) -> Vec<Range<usize>> {
    debug_assert!(workers > 0);
    let avg = n / workers;
    let left = n % workers;
    (0..workers)
        .map(|i| {
            let start = if i < left {
                i * (avg + 1)
            } else {
                (i - left) * avg + left * (avg + 1)
            };
            let len = if i < left { avg + 1 } else { avg };
            start..start + len
        })
        .collect()
}

/// Describe segment `t`; `None` marks it as skipped.
pub fn describe_segment(
    t: usize,
    boundary: &[usize],
    window: &ContextWindow,
    input: RowAddressing,
    output: RowAddressing,
) -> Option<SegmentDescriptor> {
    let begin = boundary[t];
    let end = boundary[t + 1];
    if begin == end {
        return None;
    }

    let input_row_begin = if window.context_start > 0 {
        begin.saturating_add(window.context_start as usize)
    } else {
        begin
    };
    let input_row_end = end;
    if input_row_begin >= input_row_end {
        return None;
    }

    Some(SegmentDescriptor {
        input_row_begin,
        input_row_count: input_row_end - input_row_begin,
        output_row_begin: begin,
        output_row_count: end - begin,
        input_addr: input.row(input_row_begin),
        output_addr: output.row(begin),
    })
}

/// Build descriptors for every segment of `boundary` on a pool of `workers`
/// threads that lives for this call only.
///
/// Each worker owns one range from [`worker_ranges`] and writes only into the
/// matching chunk of the result.
pub fn build_descriptors(
    boundary: &[usize],
    window: &ContextWindow,
    input: RowAddressing,
    output: RowAddressing,
    workers: usize,
) -> Result<Vec<Option<SegmentDescriptor>>> {
    let n = boundary.len().saturating_sub(1);
    let mut slots: Vec<Option<SegmentDescriptor>> = vec![None; n];
    if n == 0 {
        return Ok(slots);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("seqctx-segments-{i}"))
        .build()
        .map_err(|e| Error::SchedulerError {
            reason: format!("failed to build descriptor worker pool: {e}"),
        })?;

    let ranges = worker_ranges(n, workers);
    pool.scope(|scope| {
        let mut rest: &mut [Option<SegmentDescriptor>] = &mut slots;
        for (worker, range) in ranges.into_iter().enumerate() {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            rest = tail;
            if range.is_empty() {
                continue;
            }
            trace!("descriptor worker {worker}: segments {range:?}");
            scope.spawn(move |_| {
                for (slot, t) in chunk.iter_mut().zip(range) {
                    *slot = describe_segment(t, boundary, window, input, output);
                }
            });
        }
    });

    Ok(slots)
}
