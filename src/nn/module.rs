//! Parameter access for layers.

use numr::autograd::Var;
use numr::runtime::Runtime;

/// Trainable parameter access for optimizers and checkpointing.
///
/// Forward passes stay as inherent methods on each layer because
/// signatures differ (different client bounds, input types).
pub trait Module<R: Runtime> {
    /// All trainable parameters.
    fn parameters(&self) -> Vec<&Var<R>>;

    /// Named parameters, dot notation for nested layers.
    fn named_parameters(&self) -> Vec<(String, &Var<R>)>;

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|v| v.tensor().numel()).sum()
    }
}
