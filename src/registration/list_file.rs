//! Line-set files: append lines that are missing, keep the rest as is

use crate::error::{IoResultExt, JarError, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Add `entries` that are not yet in the file at `path`. The file is treated
/// as an ordered set of lines. Returns whether the file was written.
pub fn add_entries_to_list_file<I, S>(path: &Path, entries: I) -> Result<bool>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(JarError::io(path, e)),
    };

    let mut lines: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for line in existing.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if seen.insert(line.to_string()) {
            lines.push(line.to_string());
        }
    }

    let mut added = false;
    for entry in entries {
        let entry = entry.as_ref().trim();
        if entry.is_empty() || seen.contains(entry) {
            continue;
        }
        seen.insert(entry.to_string());
        lines.push(entry.to_string());
        added = true;
    }

    if !added {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).at_path(path)?;
    log::debug!("updated {}", path.display());
    Ok(true)
}
