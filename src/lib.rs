//! # seqctx
//!
//! **Batched context-window projection over packed variable-length sequences, built on numr.**
//!
//! A batch of sequences is stored as one `[total_rows, width]` matrix plus a
//! boundary vector of row offsets. Context projection turns every row into the
//! concatenation of its `context_length` neighbours, starting `context_start`
//! rows away and never crossing a sequence boundary. Window slots that fall
//! outside a sequence are zero or come from a trainable padding parameter.
//!
//! ## Pipeline
//!
//! ```text
//! boundary ─► segment descriptors (worker pool)
//!          ─► packed metadata block (one allocation)
//!          ─► one fused windowing kernel over all segments
//!          ─► boundary padding fill / gradient accumulate
//! ```
//!
//! ## Design
//!
//! - **Extension trait**: [`ContextProjectOps`] implemented on numr's CPU and CUDA clients
//! - **impl_generic**: descriptor, metadata and padding planning shared by every backend
//! - **Custom kernels**: columnize / decolumnize on host slices and in PTX

pub mod error;
pub mod nn;
pub mod ops;

pub use error::{Error, Result};
pub use nn::{ContextProjection, ContextProjectionGrads, Module};
pub use ops::impl_generic::context::{ContextProjectConfig, ContextProjector, ContextWindow};
pub use ops::traits::ContextProjectOps;

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::runtime::{Runtime, RuntimeClient};
pub use numr::tensor::Tensor;
