//! Line-oriented text preprocessor
//!
//! Understands the `#define`/`#ifdef`/`#filter` family of directives used in
//! jar manifests and chrome sources. The directive marker is configurable;
//! CSS files use `%` so that `#id` selectors are left alone.

pub mod expression;

use crate::error::{IoResultExt, JarError, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use expression::evaluate;

const MAX_INCLUDE_DEPTH: usize = 32;

/// Only the stylesheet marker expands `%NAME` references inside text lines.
const INLINE_REFERENCE_MARKER: char = '%';

lazy_static! {
    static ref SUBSTITUTION_PATTERN: Regex = Regex::new(r"@(\w+)@").unwrap();
    static ref EXPAND_PATTERN: Regex = Regex::new(r"__(\w+)__").unwrap();
    static ref SLASHSLASH_PATTERN: Regex = Regex::new(r"(^|[^:])\s*//.*$").unwrap();
    static ref SPACES_PATTERN: Regex = Regex::new(r" +").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Filter {
    AttemptSubstitution,
    EmptyLines,
    SlashSlash,
    Spaces,
    Substitution,
}

impl Filter {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "attemptSubstitution" => Some(Filter::AttemptSubstitution),
            "emptyLines" => Some(Filter::EmptyLines),
            "slashslash" => Some(Filter::SlashSlash),
            "spaces" => Some(Filter::Spaces),
            "substitution" => Some(Filter::Substitution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    active: bool,
    taken: bool,
    parent_active: bool,
    seen_else: bool,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    defines: BTreeMap<String, String>,
    marker: char,
    filters: Vec<Filter>,
    included: Vec<PathBuf>,
    actions: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            defines: BTreeMap::new(),
            marker: '#',
            filters: Vec::new(),
            included: Vec::new(),
            actions: 0,
        }
    }

    pub fn with_defines(defines: &BTreeMap<String, String>) -> Self {
        Self {
            defines: defines.clone(),
            ..Self::new()
        }
    }

    pub fn set_marker(&mut self, marker: char) {
        self.marker = marker;
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defines.insert(name.into(), value.into());
    }

    pub fn undefine(&mut self, name: &str) {
        self.defines.remove(name);
    }

    pub fn defines(&self) -> &BTreeMap<String, String> {
        &self.defines
    }

    /// Files pulled in through `include` directives.
    pub fn included_files(&self) -> &[PathBuf] {
        &self.included
    }

    /// Number of directives and substitutions performed so far.
    pub fn action_count(&self) -> usize {
        self.actions
    }

    pub fn process_file(&mut self, path: &Path) -> Result<String> {
        let text = fs::read_to_string(path).at_path(path)?;
        self.process_str(&text, path)
    }

    /// Process `text`; `path` is used for diagnostics and relative includes.
    pub fn process_str(&mut self, text: &str, path: &Path) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        self.process_into(text, path, 0, &mut out)?;
        Ok(out)
    }

    /// Error out when a file marked for preprocessing had nothing to preprocess.
    pub fn fail_unused(&self, path: &Path) -> Result<()> {
        if self.actions == 0 {
            return Err(JarError::Preprocessor {
                path: path.to_path_buf(),
                line_number: 0,
                reason: "no preprocessor directives found".to_string(),
            });
        }
        Ok(())
    }

    fn process_into(
        &mut self,
        text: &str,
        path: &Path,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        let mut stack: Vec<Conditional> = Vec::new();

        for (idx, raw) in text.split_inclusive('\n').enumerate() {
            let line_number = idx + 1;
            let (line, ending) = split_line_ending(raw);
            let error = |reason: String| JarError::Preprocessor {
                path: path.to_path_buf(),
                line_number,
                reason,
            };

            let active = stack.last().map_or(true, |c| c.active);

            if let Some((cmd, args)) = self.parse_directive(line) {
                match cmd {
                    "if" | "ifdef" | "ifndef" => {
                        self.actions += 1;
                        let value = if active {
                            self.condition(cmd, args).map_err(&error)?
                        } else {
                            false
                        };
                        stack.push(Conditional {
                            active: value,
                            taken: value,
                            parent_active: active,
                            seen_else: false,
                        });
                    }
                    "elif" | "elifdef" | "elifndef" => {
                        self.actions += 1;
                        let frame = stack
                            .last()
                            .copied()
                            .ok_or_else(|| error(format!("{} without if", cmd)))?;
                        if frame.seen_else {
                            return Err(error(format!("{} after else", cmd)));
                        }
                        let value = if frame.parent_active && !frame.taken {
                            self.condition(&cmd[2..], args).map_err(&error)?
                        } else {
                            false
                        };
                        if let Some(top) = stack.last_mut() {
                            top.active = value;
                            top.taken |= value;
                        }
                    }
                    "else" => {
                        self.actions += 1;
                        let top = stack
                            .last_mut()
                            .ok_or_else(|| error("else without if".to_string()))?;
                        if top.seen_else {
                            return Err(error("duplicate else".to_string()));
                        }
                        top.active = top.parent_active && !top.taken;
                        top.taken = true;
                        top.seen_else = true;
                    }
                    "endif" => {
                        self.actions += 1;
                        stack
                            .pop()
                            .ok_or_else(|| error("endif without if".to_string()))?;
                    }
                    _ if !active => {}
                    "define" => {
                        self.actions += 1;
                        let (name, value) = split_first_word(args);
                        if name.is_empty() {
                            return Err(error("define without a name".to_string()));
                        }
                        let value = if value.is_empty() { "1" } else { value };
                        self.defines.insert(name.to_string(), value.to_string());
                    }
                    "undef" => {
                        self.actions += 1;
                        self.defines.remove(args.trim());
                    }
                    "filter" | "unfilter" => {
                        self.actions += 1;
                        for name in args.split_whitespace() {
                            let filter = Filter::from_name(name)
                                .ok_or_else(|| error(format!("unknown filter {}", name)))?;
                            if cmd == "filter" {
                                if !self.filters.contains(&filter) {
                                    self.filters.push(filter);
                                    self.filters.sort();
                                }
                            } else {
                                self.filters.retain(|f| *f != filter);
                            }
                        }
                    }
                    "expand" => {
                        self.actions += 1;
                        let expanded = EXPAND_PATTERN.replace_all(args, |caps: &Captures| {
                            self.defines.get(&caps[1]).cloned().unwrap_or_default()
                        });
                        out.push_str(&expanded);
                        out.push_str(ending);
                    }
                    "literal" => {
                        self.actions += 1;
                        out.push_str(args);
                        out.push_str(ending);
                    }
                    "include" => {
                        self.actions += 1;
                        if depth >= MAX_INCLUDE_DEPTH {
                            return Err(error("includes nested too deeply".to_string()));
                        }
                        let target = args.trim();
                        let include_path = match path.parent() {
                            Some(parent) => parent.join(target),
                            None => PathBuf::from(target),
                        };
                        let included = fs::read_to_string(&include_path).at_path(&include_path)?;
                        self.included.push(include_path.clone());
                        self.process_into(&included, &include_path, depth + 1, out)?;
                    }
                    "error" => {
                        return Err(error(format!("error directive: {}", args)));
                    }
                    _ => unreachable!("parse_directive only returns known commands"),
                }
                continue;
            }

            if !active {
                continue;
            }

            if let Some(filtered) = self.apply_filters(line).map_err(&error)? {
                out.push_str(&filtered);
                out.push_str(ending);
            }
        }

        if !stack.is_empty() {
            return Err(JarError::Preprocessor {
                path: path.to_path_buf(),
                line_number: text.lines().count(),
                reason: "unterminated if".to_string(),
            });
        }
        Ok(())
    }

    fn parse_directive<'l>(&self, line: &'l str) -> Option<(&'l str, &'l str)> {
        let rest = line.strip_prefix(self.marker)?;
        let cmd_len = rest
            .find(|c: char| !c.is_ascii_lowercase())
            .unwrap_or(rest.len());
        let (cmd, args) = rest.split_at(cmd_len);
        if !args.is_empty() && !args.starts_with(char::is_whitespace) {
            return None;
        }
        let known = matches!(
            cmd,
            "if" | "ifdef"
                | "ifndef"
                | "elif"
                | "elifdef"
                | "elifndef"
                | "else"
                | "endif"
                | "define"
                | "undef"
                | "filter"
                | "unfilter"
                | "expand"
                | "literal"
                | "include"
                | "error"
        );
        if !known {
            return None;
        }
        Some((cmd, args.trim()))
    }

    fn condition(&self, cmd: &str, args: &str) -> Result<bool, String> {
        match cmd {
            "if" => evaluate(args, &self.defines),
            "ifdef" | "ifndef" => {
                let name = args.trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(format!("{} expects a single name", cmd));
                }
                Ok(self.defines.contains_key(name) == (cmd == "ifdef"))
            }
            other => Err(format!("unknown condition {}", other)),
        }
    }

    /// Returns `None` when the line is dropped.
    fn apply_filters(&mut self, line: &str) -> Result<Option<String>, String> {
        let mut line = line.to_string();

        for filter in self.filters.clone() {
            match filter {
                Filter::AttemptSubstitution => {
                    line = self.substitute(&line, false)?;
                }
                Filter::EmptyLines => {
                    if line.trim().is_empty() {
                        return Ok(None);
                    }
                }
                Filter::SlashSlash => {
                    line = SLASHSLASH_PATTERN.replace(&line, "$1").into_owned();
                }
                Filter::Spaces => {
                    line = SPACES_PATTERN.replace_all(&line, " ").trim_matches(' ').to_string();
                }
                Filter::Substitution => {
                    line = self.substitute(&line, true)?;
                }
            }
        }

        Ok(Some(self.expand_marker_references(&line)))
    }

    fn substitute(&mut self, line: &str, strict: bool) -> Result<String, String> {
        let mut missing = None;
        let mut count = 0;
        let replaced = SUBSTITUTION_PATTERN.replace_all(line, |caps: &Captures| {
            count += 1;
            match self.defines.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    if strict && missing.is_none() {
                        missing = Some(caps[1].to_string());
                    }
                    String::new()
                }
            }
        });
        if let Some(name) = missing {
            return Err(format!("undefined variable {} in substitution", name));
        }
        let replaced = replaced.into_owned();
        self.actions += count;
        Ok(replaced)
    }

    /// Replace `%NAME` with the value of `NAME` when it is defined.
    fn expand_marker_references(&mut self, line: &str) -> String {
        if self.marker != INLINE_REFERENCE_MARKER || !line.contains(self.marker) {
            return line.to_string();
        }

        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(pos) = rest.find(self.marker) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + self.marker.len_utf8()..];
            let name_len = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..name_len];
            match self.defines.get(name) {
                Some(value) if !name.is_empty() => {
                    out.push_str(value);
                    self.actions += 1;
                    rest = &after[name_len..];
                }
                _ => {
                    out.push(self.marker);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

fn split_first_word(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.find(char::is_whitespace) {
        Some(idx) => (&args[..idx], args[idx..].trim()),
        None => (args, ""),
    }
}
