//! Jar packaging: output backends, locale resolution and the builder

pub mod archive;
pub mod builder;
pub mod locale;
pub mod output;

pub use archive::JarOutput;
pub use builder::{JarMaker, PackageStats};
pub use output::{FlatOutput, OutputBackend, OutputStream, SymlinkOutput};

use crate::error::Result;
use crate::models::JarMakerOptions;
use std::path::Path;

/// Package the jar manifest at `manifest` into `output_root`
pub fn package(
    manifest: &Path,
    output_root: &Path,
    options: JarMakerOptions,
) -> Result<PackageStats> {
    let mut maker = JarMaker::new(options)?;
    maker.make_jar_from_path(manifest, output_root)
}
