pub mod context_project;
