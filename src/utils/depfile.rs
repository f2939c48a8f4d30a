//! Make-style dependency files

use crate::error::{IoResultExt, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Collects outputs and the inputs they were built from during a run.
#[derive(Debug, Default, Clone)]
pub struct DependencyTracker {
    targets: BTreeSet<PathBuf>,
    prerequisites: BTreeSet<PathBuf>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_target(&mut self, path: impl Into<PathBuf>) {
        self.targets.insert(path.into());
    }

    pub fn add_prerequisite(&mut self, path: impl Into<PathBuf>) {
        self.prerequisites.insert(path.into());
    }

    pub fn targets(&self) -> impl Iterator<Item = &PathBuf> {
        self.targets.iter()
    }

    pub fn prerequisites(&self) -> impl Iterator<Item = &PathBuf> {
        self.prerequisites.iter()
    }

    /// Render the rule plus an empty rule per prerequisite, so deleted inputs don't break make.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.targets.is_empty() {
            return out;
        }

        let targets: Vec<String> = self.targets.iter().map(|p| escape(p)).collect();
        let prerequisites: Vec<String> = self.prerequisites.iter().map(|p| escape(p)).collect();

        out.push_str(&targets.join(" "));
        out.push(':');
        for prerequisite in &prerequisites {
            out.push(' ');
            out.push_str(prerequisite);
        }
        out.push('\n');

        for prerequisite in &prerequisites {
            out.push('\n');
            out.push_str(prerequisite);
            out.push_str(":\n");
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).at_path(parent)?;
            }
        }
        fs::write(path, self.render()).at_path(path)
    }
}

fn escape(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(' ', "\\ ")
        .replace('$', "$$")
}
