//! Shared helpers

pub mod depfile;
pub mod helpers;

pub use depfile::DependencyTracker;
