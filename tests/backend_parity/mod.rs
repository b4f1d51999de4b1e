pub mod helpers;

pub mod context_project;
