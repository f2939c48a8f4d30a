//! Chrome package builder
//!
//! Reads `jar.mn` manifests describing how files in a source tree map into
//! chrome packages, and produces those packages as jar archives, flat
//! directories or symlink trees, together with their chrome registration
//! manifests.

pub mod error;
pub mod models;
pub mod packager;
pub mod parser;
pub mod preprocessor;
pub mod registration;
pub mod utils;

pub use error::{JarError, Result};
pub use models::{JarInfo, JarMakerOptions, JarManifestEntry, OutputFormat};
pub use packager::{package, JarMaker, PackageStats};
pub use parser::parse_jar_manifest;
pub use preprocessor::Preprocessor;
