//! Context projection layer for packed variable-length sequences

use crate::error::{Error, Result};
use crate::nn::Module;
use crate::ops::impl_generic::context::{ContextProjectConfig, ContextWindow};
use crate::ops::traits::ContextProjectOps;
use numr::autograd::Var;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Gradients produced by [`ContextProjection::backward`].
pub struct ContextProjectionGrads<R: Runtime> {
    /// `[total_rows, width]`, present when requested
    pub input: Option<Tensor<R>>,
    /// `[up_pad + down_pad, width]`, present when padding is trainable
    pub padding: Option<Tensor<R>>,
}

/// Context projection: output row `i` of each sequence concatenates its
/// `context_length` neighbours starting at offset `context_start`.
///
/// Input:  `[total_rows, width]` with a `[batch + 1]` boundary
/// Output: `[total_rows, context_length * width]`
///
/// With trainable padding the layer owns a `[up_pad + down_pad, width]`
/// parameter whose rows fill window slots that fall outside a sequence.
pub struct ContextProjection<R: Runtime> {
    window: ContextWindow,
    config: ContextProjectConfig,
    padding: Option<Var<R>>,
}

impl<R: Runtime> ContextProjection<R> {
    /// `padding` is required when `window.padding_trainable` and dropped otherwise.
    pub fn new(
        window: ContextWindow,
        config: ContextProjectConfig,
        padding: Option<Tensor<R>>,
    ) -> Result<Self> {
        window.validate()?;
        config.validate()?;
        let padding = if window.padding_trainable {
            let padding = padding.ok_or_else(|| {
                Error::invalid("padding", "trainable padding requires a padding parameter")
            })?;
            match padding.shape() {
                &[rows, _] if rows == window.padding_rows() => {}
                other => {
                    return Err(Error::ShapeMismatch {
                        arg: "padding",
                        expected: vec![window.padding_rows()],
                        got: other.to_vec(),
                    });
                }
            }
            Some(Var::new(padding, true))
        } else {
            None
        };
        Ok(Self {
            window,
            config,
            padding,
        })
    }

    /// Forward pass over a packed batch.
    pub fn forward<C>(&self, client: &C, input: &Tensor<R>, boundary: &[usize]) -> Result<Tensor<R>>
    where
        C: ContextProjectOps<R>,
    {
        client.context_project_fwd(
            input,
            boundary,
            self.padding.as_ref().map(|p| p.tensor()),
            &self.window,
            &self.config,
        )
    }

    /// Gradient pass. The padding gradient is produced whenever the padding
    /// is trainable.
    pub fn backward<C>(
        &self,
        client: &C,
        output_grad: &Tensor<R>,
        boundary: &[usize],
        width: usize,
        input_grad: bool,
    ) -> Result<ContextProjectionGrads<R>>
    where
        C: ContextProjectOps<R>,
    {
        let (input, padding) = client.context_project_bwd(
            output_grad,
            boundary,
            width,
            &self.window,
            &self.config,
            input_grad,
            self.padding.is_some(),
        )?;
        Ok(ContextProjectionGrads { input, padding })
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn config(&self) -> &ContextProjectConfig {
        &self.config
    }

    pub fn padding(&self) -> Option<&Var<R>> {
        self.padding.as_ref()
    }
}

impl<R: Runtime> Module<R> for ContextProjection<R> {
    fn parameters(&self) -> Vec<&Var<R>> {
        self.padding.iter().collect()
    }

    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        self.padding
            .iter()
            .map(|p| ("padding".to_string(), p))
            .collect()
    }
}
