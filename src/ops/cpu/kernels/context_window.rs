//! CPU columnize / decolumnize kernels over packed segment metadata
//!
//! Host counterpart of the fused device kernels: one call walks every segment
//! in the metadata block. Addresses in the block are element offsets into the
//! `im` (batch) and `col` (context output) buffers.
//!
//! For segment `t`, output row `r` and window slot `f`:
//! `col[out_addr + r*L*W + f*W .. +W]` <-> `im[in_addr + src*W .. +W]`
//! with `src = r*stride + f - pad_up`, valid when `0 <= src < input_height`.

use crate::ops::impl_generic::context::launch::WindowLaunch;
use crate::ops::impl_generic::context::metadata::PackedMetadata;

/// im → col. Slots without a source row are zeroed.
pub fn columnize_f32(meta: &PackedMetadata, launch: &WindowLaunch, im: &[f32], col: &mut [f32]) {
    let width = launch.width;
    let out_width = launch.output_width();
    let in_addrs = meta.input_addrs();
    let out_addrs = meta.output_addrs();

    for t in 0..launch.segments {
        let input_height = meta.input_height(t);
        let output_height = meta.output_height(t);
        if input_height == 0 || output_height == 0 {
            continue;
        }
        let in_base = in_addrs[t] as usize;
        let out_base = out_addrs[t] as usize;

        for r in 0..output_height {
            for f in 0..launch.context_length {
                let dst = out_base + r * out_width + f * width;
                let dst = &mut col[dst..dst + width];
                match launch.source_row(r, f, input_height) {
                    Some(src) => {
                        let src = in_base + src * width;
                        dst.copy_from_slice(&im[src..src + width]);
                    }
                    None => dst.fill(0.0),
                }
            }
        }
    }
}

/// col → im, accumulating: every window slot adds into its source row.
pub fn decolumnize_f32(meta: &PackedMetadata, launch: &WindowLaunch, col: &[f32], im: &mut [f32]) {
    let width = launch.width;
    let out_width = launch.output_width();
    let in_addrs = meta.input_addrs();
    let out_addrs = meta.output_addrs();

    for t in 0..launch.segments {
        let input_height = meta.input_height(t);
        let output_height = meta.output_height(t);
        if input_height == 0 || output_height == 0 {
            continue;
        }
        let in_base = in_addrs[t] as usize;
        let out_base = out_addrs[t] as usize;

        for r in 0..output_height {
            for f in 0..launch.context_length {
                let Some(src) = launch.source_row(r, f, input_height) else {
                    continue;
                };
                let from = out_base + r * out_width + f * width;
                let to = in_base + src * width;
                for (g, &c) in im[to..to + width]
                    .iter_mut()
                    .zip(&col[from..from + width])
                {
                    *g += c;
                }
            }
        }
    }
}
