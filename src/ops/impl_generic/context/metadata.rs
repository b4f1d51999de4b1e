//! Packed per-segment metadata: five arrays in one allocation.
//!
//! Layout for `n` segments, in bytes from the block base:
//!
//! ```text
//! [0,        4n)        input heights   (u32 × n)
//! [4n,       8n)        output heights  (u32 × n)
//! [8n,       16n + 8)   boundary        (u64 × (n + 1))
//! [16n + 8,  24n + 8)   input addrs     (u64 × n)
//! [24n + 8,  32n + 8)   output addrs    (u64 × n)
//! ```
//!
//! The block is `4n + 1` machine words rounded up to an even word count, so
//! every offset follows from `n` alone and a kernel can find each array from
//! the base address.

use super::descriptor::SegmentDescriptor;
use crate::error::{Error, Result};

const WORD: usize = std::mem::size_of::<u64>();
const HEIGHT: usize = std::mem::size_of::<u32>();

/// Offsets of the five arrays inside a packed block for `segments` segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataLayout {
    pub segments: usize,
}

impl MetadataLayout {
    pub fn new(segments: usize) -> Self {
        Self { segments }
    }

    /// Total 64-bit words: `4n + 1` plus one parity word when odd.
    pub fn words(&self) -> usize {
        let words = 4 * self.segments + 1;
        words + words % 2
    }

    pub fn bytes(&self) -> usize {
        self.words() * WORD
    }

    pub fn input_heights_offset(&self) -> usize {
        0
    }

    pub fn output_heights_offset(&self) -> usize {
        self.segments * HEIGHT
    }

    pub fn boundary_offset(&self) -> usize {
        2 * self.segments * HEIGHT
    }

    pub fn input_addrs_offset(&self) -> usize {
        self.boundary_offset() + (self.segments + 1) * WORD
    }

    pub fn output_addrs_offset(&self) -> usize {
        self.input_addrs_offset() + self.segments * WORD
    }
}

/// Host staging arrays flattened from the descriptors.
///
/// Skipped segments contribute zero heights and null addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentArrays {
    pub input_heights: Vec<u32>,
    pub output_heights: Vec<u32>,
    pub boundary: Vec<u64>,
    pub input_addrs: Vec<u64>,
    pub output_addrs: Vec<u64>,
}

impl SegmentArrays {
    pub fn from_descriptors(
        descriptors: &[Option<SegmentDescriptor>],
        boundary: &[usize],
    ) -> Result<Self> {
        if boundary.len() != descriptors.len() + 1 {
            return Err(Error::ShapeMismatch {
                arg: "boundary",
                expected: vec![descriptors.len() + 1],
                got: vec![boundary.len()],
            });
        }
        let n = descriptors.len();
        let mut arrays = Self {
            input_heights: vec![0; n],
            output_heights: vec![0; n],
            boundary: boundary.iter().map(|&b| b as u64).collect(),
            input_addrs: vec![0; n],
            output_addrs: vec![0; n],
        };
        for (t, desc) in descriptors.iter().enumerate() {
            if let Some(d) = desc {
                arrays.input_heights[t] = to_height(d.input_row_count)?;
                arrays.output_heights[t] = to_height(d.output_row_count)?;
                arrays.input_addrs[t] = d.input_addr;
                arrays.output_addrs[t] = d.output_addr;
            }
        }
        Ok(arrays)
    }

    pub fn segments(&self) -> usize {
        self.input_heights.len()
    }
}

fn to_height(rows: usize) -> Result<u32> {
    u32::try_from(rows)
        .map_err(|_| Error::invalid("boundary", format!("segment of {rows} rows exceeds u32")))
}

/// Host-resident packed metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedMetadata {
    layout: MetadataLayout,
    block: Vec<u64>,
}

impl PackedMetadata {
    /// Allocate the block once and copy each staging array into its range.
    pub fn pack(arrays: &SegmentArrays) -> Result<Self> {
        let layout = MetadataLayout::new(arrays.segments());
        let words = layout.words();

        let mut block: Vec<u64> = Vec::new();
        block
            .try_reserve_exact(words)
            .map_err(|e| Error::AllocationFailed {
                bytes: layout.bytes(),
                reason: e.to_string(),
            })?;
        block.resize(words, 0);

        let mut packed = Self { layout, block };
        packed.write_heights(layout.input_heights_offset(), &arrays.input_heights);
        packed.write_heights(layout.output_heights_offset(), &arrays.output_heights);
        packed.write_words(layout.boundary_offset(), &arrays.boundary);
        packed.write_words(layout.input_addrs_offset(), &arrays.input_addrs);
        packed.write_words(layout.output_addrs_offset(), &arrays.output_addrs);
        Ok(packed)
    }

    fn write_heights(&mut self, byte_offset: usize, heights: &[u32]) {
        for (i, &h) in heights.iter().enumerate() {
            let byte = byte_offset + i * HEIGHT;
            let word = &mut self.block[byte / WORD];
            let shift = (byte % WORD) * 8;
            *word = (*word & !(0xFFFF_FFFFu64 << shift)) | ((h as u64) << shift);
        }
    }

    fn write_words(&mut self, byte_offset: usize, values: &[u64]) {
        let start = byte_offset / WORD;
        self.block[start..start + values.len()].copy_from_slice(values);
    }

    fn read_height(&self, byte_offset: usize, index: usize) -> usize {
        let byte = byte_offset + index * HEIGHT;
        let shift = (byte % WORD) * 8;
        ((self.block[byte / WORD] >> shift) & 0xFFFF_FFFF) as usize
    }

    fn words_at(&self, byte_offset: usize, len: usize) -> &[u64] {
        let start = byte_offset / WORD;
        &self.block[start..start + len]
    }

    pub fn layout(&self) -> MetadataLayout {
        self.layout
    }

    pub fn segments(&self) -> usize {
        self.layout.segments
    }

    /// Whole block as words, in device layout.
    pub fn as_words(&self) -> &[u64] {
        &self.block
    }

    pub fn input_height(&self, t: usize) -> usize {
        self.read_height(self.layout.input_heights_offset(), t)
    }

    pub fn output_height(&self, t: usize) -> usize {
        self.read_height(self.layout.output_heights_offset(), t)
    }

    pub fn boundary(&self) -> &[u64] {
        self.words_at(self.layout.boundary_offset(), self.layout.segments + 1)
    }

    pub fn input_addrs(&self) -> &[u64] {
        self.words_at(self.layout.input_addrs_offset(), self.layout.segments)
    }

    pub fn output_addrs(&self) -> &[u64] {
        self.words_at(self.layout.output_addrs_offset(), self.layout.segments)
    }

    /// Largest output height in the block; sizes the kernel launch.
    pub fn max_output_height(&self) -> usize {
        (0..self.segments())
            .map(|t| self.output_height(t))
            .max()
            .unwrap_or(0)
    }
}
