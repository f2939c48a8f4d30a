//! Core data models for jar packaging

pub mod jar_info;
pub mod options;

pub use jar_info::*;
pub use options::*;
