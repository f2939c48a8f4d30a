//! Chrome registration manifests
//!
//! After a jar section is packaged, its `%` lines are written to
//! `<name>.manifest` (referenced from `chrome.manifest`) and/or directly to
//! `chrome.manifest`, with `%` rewritten to the chrome base path.

pub mod list_file;

pub use list_file::add_entries_to_list_file;

use crate::error::Result;
use crate::models::{JarInfo, OutputFormat};
use crate::utils::helpers::{basename, dirname, normalize, to_native};
use std::path::{Path, PathBuf};

const PLACEHOLDER: &str = "{0}";

/// `{0}<name>/`, or `jar:{0}<name>.jar!/` for jar output.
pub fn chrome_base_path_template(name: &str, format: OutputFormat) -> String {
    let mut template = format!("{}{}", PLACEHOLDER, basename(name));
    if format == OutputFormat::Jar {
        template = format!("jar:{}.jar!", template);
    }
    template.push('/');
    template
}

pub fn resolve_template(template: &str, prefix: &str) -> String {
    template.replace(PLACEHOLDER, prefix)
}

/// Replace a leading `%` on each whitespace separated token with `base`.
pub fn rewrite_registration_line(line: &str, base: &str) -> String {
    line.split_whitespace()
        .map(|token| match token.strip_prefix('%') {
            Some(rest) => format!("{}{}", base, rest),
            None => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct ChromeManifestWriter {
    pub use_jarfile_manifest: bool,
    pub use_chrome_manifest: bool,
    pub root_manifest_app_id: Option<String>,
}

impl ChromeManifestWriter {
    /// Register `jar`'s chrome lines below `output_root`. Returns the manifests written.
    pub fn finalize(
        &self,
        output_root: &Path,
        jar: &JarInfo,
        template: &str,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        if jar.chrome_manifests.is_empty() {
            return Ok(written);
        }

        let jar_dir = to_native(output_root, &jar.base);
        let chrome_manifest = jar_dir.join("chrome.manifest");

        if self.use_jarfile_manifest {
            let jar_manifest = to_native(&jar_dir, &format!("{}.manifest", jar.name));
            let base = resolve_template(template, "");
            if update_manifest(&jar_manifest, &base, &jar.chrome_manifests)? {
                written.push(jar_manifest);
            }
            if jar.name != "chrome" {
                let line = format!("manifest {}.manifest", jar.name);
                if add_entries_to_list_file(&chrome_manifest, [line])? {
                    written.push(chrome_manifest.clone());
                }
            }
        }

        if self.use_chrome_manifest {
            let dir = dirname(&jar.name);
            let prefix = if dir.is_empty() {
                String::new()
            } else {
                format!("{}/", dir)
            };
            let base = resolve_template(template, &prefix);
            if update_manifest(&chrome_manifest, &base, &jar.chrome_manifests)? {
                written.push(chrome_manifest.clone());
            }
        }

        if let Some(app_id) = &self.root_manifest_app_id {
            let chrome_dir = normalize(&jar_dir);
            let dir_name = chrome_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let root_manifest = match chrome_dir.parent() {
                Some(parent) => parent.join("chrome.manifest"),
                None => chrome_dir.join("chrome.manifest"),
            };
            log::info!(
                "adding '{}' entry to root chrome manifest appid={}",
                dir_name,
                app_id
            );
            let line = format!("manifest {}/chrome.manifest application={}", dir_name, app_id);
            if add_entries_to_list_file(&root_manifest, [line])? {
                written.push(root_manifest);
            }
        }

        Ok(written)
    }
}

fn update_manifest(path: &Path, base: &str, register: &[String]) -> Result<bool> {
    let lines: Vec<String> = register
        .iter()
        .map(|line| rewrite_registration_line(line, base))
        .collect();
    add_entries_to_list_file(path, lines)
}
