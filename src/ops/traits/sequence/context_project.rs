//! Context projection over packed variable-length sequences

use crate::error::Result;
use crate::ops::impl_generic::context::{ContextProjectConfig, ContextWindow};
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Context projection: per-row concatenation of neighbouring rows within
/// each sequence of a packed batch
///
/// # Layout contract
///
/// - `input`: `[total_rows, width]` F32, sequences packed back to back
/// - `boundary`: `[batch_size + 1]` host offsets, `boundary[0] = 0`,
///   non-decreasing, `boundary[batch_size] = total_rows`
/// - `padding`: `[up_pad + down_pad, width]` F32, required when
///   `window.padding_trainable`, ignored otherwise
/// - Output: `[total_rows, context_length * width]`
///
/// Row `i` of sequence `s` in the output is rows
/// `[i + context_start, i + context_start + context_length)` of `s`,
/// concatenated. Rows outside `s` come from `padding` (trainable) or are zero.
///
/// For `boundary = [0, 3, 4]`, `context_start = -1`, `context_length = 3`:
///
/// ```text
/// input  = [a; b; c; d]
/// output = [[0, a, b]; [a, b, c]; [b, c, 0]; [0, d, 0]]
/// ```
pub trait ContextProjectOps<R: Runtime> {
    /// Forward pass. Returns the `[total_rows, context_length * width]` output.
    fn context_project_fwd(
        &self,
        input: &Tensor<R>,
        boundary: &[usize],
        padding: Option<&Tensor<R>>,
        window: &ContextWindow,
        config: &ContextProjectConfig,
    ) -> Result<Tensor<R>>;

    /// Gradient pass.
    ///
    /// Returns `(d_input, d_padding)`; each is `Some` only when requested via
    /// `input_grad` / `pad_grad` (and, for `d_padding`, when padding is
    /// trainable).
    #[allow(clippy::too_many_arguments)]
    fn context_project_bwd(
        &self,
        output_grad: &Tensor<R>,
        boundary: &[usize],
        width: usize,
        window: &ContextWindow,
        config: &ContextProjectConfig,
        input_grad: bool,
        pad_grad: bool,
    ) -> Result<(Option<Tensor<R>>, Option<Tensor<R>>)>;
}
