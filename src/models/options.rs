//! Packaging options

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jar,
    Flat,
    Symlink,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jar => "jar",
            OutputFormat::Flat => "flat",
            OutputFormat::Symlink => "symlink",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jar" => Ok(OutputFormat::Jar),
            "flat" => Ok(OutputFormat::Flat),
            "symlink" => Ok(OutputFormat::Symlink),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarMakerOptions {
    pub output_format: OutputFormat,
    pub use_jarfile_manifest: bool,
    pub use_chrome_manifest: bool,

    /// Anchor for `/`-prefixed sources.
    pub top_source_dir: PathBuf,
    /// Fallback roots for relative sources, in search order.
    #[serde(default)]
    pub source_dirs: Vec<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub l10n_base: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l10n_merge: Option<PathBuf>,
    /// Explicit locale roots. Replaces the derived list when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale_dirs: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relativesrcdir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_manifest_app_id: Option<String>,

    /// Preprocessor defines, applied to the manifest and to `*` entries.
    #[serde(default)]
    pub defines: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deps_file: Option<PathBuf>,
}

impl JarMakerOptions {
    pub fn new(output_format: OutputFormat) -> Self {
        Self {
            output_format,
            ..Default::default()
        }
    }
}

impl Default for JarMakerOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Jar,
            use_jarfile_manifest: true,
            use_chrome_manifest: false,
            top_source_dir: PathBuf::from("."),
            source_dirs: Vec::new(),
            l10n_base: None,
            l10n_merge: None,
            locale_dirs: None,
            relativesrcdir: None,
            root_manifest_app_id: None,
            defines: BTreeMap::new(),
            deps_file: None,
        }
    }
}
