//! Locale root derivation

use crate::utils::helpers::{basename, dirname, to_native};
use std::path::{Path, PathBuf};

/// Drop a trailing `locales` component: `browser/locales` becomes `browser`.
pub fn l10n_relative_dir(relativesrcdir: &str) -> &str {
    let trimmed = relativesrcdir.trim_end_matches('/');
    if basename(trimmed) == "locales" {
        dirname(trimmed)
    } else {
        trimmed
    }
}

/// Where locale files for `relativesrcdir` are searched, in order: the merge
/// dir, the l10n base, and the en-US sources (only when merging or not
/// localizing).
pub fn generate_locale_dirs(
    relativesrcdir: &str,
    top_source_dir: &Path,
    l10n_base: Option<&Path>,
    l10n_merge: Option<&Path>,
) -> Vec<PathBuf> {
    let l10n_rel = l10n_relative_dir(relativesrcdir);
    let mut dirs = Vec::new();

    if let Some(merge) = l10n_merge {
        dirs.push(to_native(merge, l10n_rel));
    }
    if let Some(base) = l10n_base {
        dirs.push(to_native(base, l10n_rel));
    }
    if l10n_merge.is_some() || l10n_base.is_none() {
        dirs.push(to_native(top_source_dir, l10n_rel).join("en-US"));
    }

    dirs
}

/// Whether a locale root is an en-US source directory.
pub fn is_en_us_root(root: &Path) -> bool {
    root.components().any(|c| c.as_os_str() == "en-US")
}
