//! Backend-independent pieces of context projection: window shape, segment
//! descriptors, packed metadata, padding spans and the host functor.

pub mod config;
pub mod descriptor;
pub mod launch;
pub mod metadata;
pub mod padding;
pub mod projector;
pub mod window;

pub use config::{ContextProjectConfig, DEFAULT_WORKERS};
pub use descriptor::{RowAddressing, SegmentDescriptor, build_descriptors, worker_ranges};
pub use launch::WindowLaunch;
pub use metadata::{MetadataLayout, PackedMetadata, SegmentArrays};
pub use padding::{PadSpan, PaddingPlan};
pub use projector::{ContextPlan, ContextProjector, check_boundary};
pub use window::ContextWindow;
