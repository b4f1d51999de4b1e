pub mod kernels;
pub mod sequence;
