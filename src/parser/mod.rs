//! Parsing of jar manifests

pub mod jar_manifest;

pub use jar_manifest::{classify_line, parse_jar_manifest, JarManifestParser, ManifestLine};
