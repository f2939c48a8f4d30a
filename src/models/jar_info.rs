//! Jar manifest sections and entries

use serde::{Deserialize, Serialize};

/// One file to place in a jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarManifestEntry {
    /// Destination path inside the jar, `/` separated.
    pub output: String,
    /// Source path. May contain `*` wildcards or start with `/` to anchor at the top source dir.
    pub source: String,
    #[serde(default)]
    pub is_locale: bool,
    #[serde(default)]
    pub preprocess: bool,
}

impl JarManifestEntry {
    pub fn new(output: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            source: source.into(),
            is_locale: false,
            preprocess: false,
        }
    }

    pub fn locale(mut self, is_locale: bool) -> Self {
        self.is_locale = is_locale;
        self
    }

    pub fn preprocessed(mut self, preprocess: bool) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.source.contains('*')
    }
}

/// A section of a jar manifest: everything that goes into one jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarInfo {
    pub base: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relativesrcdir: Option<String>,
    #[serde(default)]
    pub chrome_manifests: Vec<String>,
    #[serde(default)]
    pub entries: Vec<JarManifestEntry>,
}

impl JarInfo {
    /// Start a new section. Without a base, the jar lives under `chrome/`.
    pub fn new(base: Option<&str>, name: &str) -> Self {
        let base = base.unwrap_or_default().to_string();
        let name = if base.is_empty() {
            format!("chrome/{}", name)
        } else {
            name.to_string()
        };

        Self {
            base,
            name,
            relativesrcdir: None,
            chrome_manifests: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Start a sibling section targeting the same jar.
    pub fn sibling(&self) -> Self {
        Self {
            base: self.base.clone(),
            name: self.name.clone(),
            relativesrcdir: None,
            chrome_manifests: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chrome_manifests.is_empty() && self.entries.is_empty()
    }

    /// Record a registration line, keeping first-seen order and dropping duplicates.
    pub fn add_chrome_manifest(&mut self, line: impl Into<String>) -> bool {
        let line = line.into();
        if self.chrome_manifests.contains(&line) {
            return false;
        }
        self.chrome_manifests.push(line);
        true
    }
}
