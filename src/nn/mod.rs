pub mod module;
pub mod sequence_conv;

pub use module::Module;
pub use sequence_conv::{ContextProjection, ContextProjectionGrads};
