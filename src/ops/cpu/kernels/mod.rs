pub mod context_window;
