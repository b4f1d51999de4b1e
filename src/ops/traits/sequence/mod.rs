pub mod context_project;

pub use context_project::ContextProjectOps;
