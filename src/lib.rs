//! Tracks the time spent working in a set of workspaces, attributing it to the checked out git
//! branches. A daemon records intervals into yearly JSON files, the cli reports on them.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod utils;
