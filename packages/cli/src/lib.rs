// ABOUTME: Library half of the Task Master command line client
// ABOUTME: Backend wiring and terminal rendering shared by the binary's commands

pub mod app;
pub mod display;

pub use app::{init_tracing, App};
