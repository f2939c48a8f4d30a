//! jar.mn parsing
//!
//! A jar manifest is a sequence of sections, each starting with a
//! `[base] name.jar:` header, followed by `relativesrcdir` switches,
//! `%` chrome registration lines and file entries.

use crate::error::{JarError, Result};
use crate::models::{JarInfo, JarManifestEntry};
use crate::utils::helpers::basename;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IGNORE_PATTERN: Regex = Regex::new(r"^\s*(#.*)?$").unwrap();

    // [base/path] name.jar:
    static ref SECTION_PATTERN: Regex = Regex::new(
        r"^(?:\[(?P<base>[\w.\-\\/{}@]+)\]\s*)?(?P<name>[\w.\-\\/{}]+)\.jar:\s*$"
    ).unwrap();

    static ref RELATIVESRCDIR_PATTERN: Regex = Regex::new(
        r"^relativesrcdir\s+(?P<dir>.+?):\s*$"
    ).unwrap();

    static ref REGISTRATION_PATTERN: Regex = Regex::new(r"^%\s+(?P<line>.*)$").unwrap();

    // [*][+] [%]dest [([%]source)]
    static ref ENTRY_PATTERN: Regex = Regex::new(
        r"^(?P<preprocess>\*)?(?P<overwrite>\+)?\s+(?P<dest_locale>%)?(?P<output>[\w.\-\\/+@]+)\s*(?:\((?P<locale>%?)(?P<source>[\w.\-\\/@*]+)\))?\s*$"
    ).unwrap();

    static ref DEPRECATED_PATTERN: Regex = Regex::new(r"^\*?\+").unwrap();
}

/// A single classified manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    Ignored,
    Section { base: Option<String>, name: String },
    RelativeSrcDir(String),
    Registration(String),
    Entry(JarManifestEntry),
}

/// Classify one line. Does not need any parser state.
pub fn classify_line(line: &str, line_number: usize) -> Result<ManifestLine> {
    let line = line.trim_end();

    if IGNORE_PATTERN.is_match(line) {
        return Ok(ManifestLine::Ignored);
    }

    if let Some(caps) = SECTION_PATTERN.captures(line) {
        return Ok(ManifestLine::Section {
            base: caps.name("base").map(|m| m.as_str().to_string()),
            name: caps["name"].to_string(),
        });
    }

    if let Some(caps) = RELATIVESRCDIR_PATTERN.captures(line) {
        return Ok(ManifestLine::RelativeSrcDir(caps["dir"].to_string()));
    }

    if let Some(caps) = REGISTRATION_PATTERN.captures(line) {
        let collapsed = caps["line"].split_whitespace().collect::<Vec<_>>().join(" ");
        return Ok(ManifestLine::Registration(collapsed));
    }

    if DEPRECATED_PATTERN.is_match(line) {
        return Err(JarError::DeprecatedPrefix {
            line_number,
            line: line.to_string(),
        });
    }

    if let Some(caps) = ENTRY_PATTERN.captures(line) {
        if caps.name("overwrite").is_some() {
            return Err(JarError::DeprecatedPrefix {
                line_number,
                line: line.to_string(),
            });
        }

        let output = caps["output"].to_string();
        let source = match caps.name("source") {
            Some(source) => source.as_str().to_string(),
            None => basename(&output).to_string(),
        };
        let is_locale = caps.name("dest_locale").is_some()
            || caps.name("locale").map_or(false, |m| !m.as_str().is_empty());

        return Ok(ManifestLine::Entry(
            JarManifestEntry::new(output, source)
                .locale(is_locale)
                .preprocessed(caps.name("preprocess").is_some()),
        ));
    }

    Err(JarError::ManifestSyntax {
        line_number,
        line: line.to_string(),
        reason: "unrecognized jar manifest line".to_string(),
    })
}

/// Accumulates classified lines into jar sections.
#[derive(Debug, Default)]
pub struct JarManifestParser {
    jars: Vec<JarInfo>,
    line_number: usize,
}

impl JarManifestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.line_number += 1;
        let line_number = self.line_number;

        match classify_line(line, line_number)? {
            ManifestLine::Ignored => {}
            ManifestLine::Section { base, name } => {
                self.jars.push(JarInfo::new(base.as_deref(), &name));
            }
            ManifestLine::RelativeSrcDir(dir) => {
                let current = self.current(line, line_number)?;
                if !current.is_empty() {
                    let sibling = current.sibling();
                    self.jars.push(sibling);
                }
                self.current(line, line_number)?.relativesrcdir = Some(dir);
            }
            ManifestLine::Registration(rline) => {
                self.current(line, line_number)?.add_chrome_manifest(rline);
            }
            ManifestLine::Entry(entry) => {
                self.current(line, line_number)?.entries.push(entry);
            }
        }
        Ok(())
    }

    pub fn write(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            self.write_line(line)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<JarInfo> {
        self.jars
    }

    fn current(&mut self, line: &str, line_number: usize) -> Result<&mut JarInfo> {
        self.jars
            .last_mut()
            .ok_or_else(|| JarError::ManifestSyntax {
                line_number,
                line: line.trim_end().to_string(),
                reason: "line outside of a jar section".to_string(),
            })
    }
}

/// Parse an already preprocessed jar manifest.
pub fn parse_jar_manifest(text: &str) -> Result<Vec<JarInfo>> {
    let mut parser = JarManifestParser::new();
    parser.write(text)?;
    Ok(parser.finish())
}
