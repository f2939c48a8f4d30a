//! Chrome package builder
//!
//! Walks the sections of a jar manifest, resolves every entry against the
//! source, top source and locale directories, and writes the result through
//! an [`OutputBackend`].

use super::archive::JarOutput;
use super::locale::{generate_locale_dirs, is_en_us_root};
use super::output::{is_newer, FlatOutput, OutputBackend, SymlinkOutput};
use crate::error::{IoResultExt, JarError, Result};
use crate::models::{JarInfo, JarMakerOptions, JarManifestEntry, OutputFormat};
use crate::parser::parse_jar_manifest;
use crate::preprocessor::Preprocessor;
use crate::registration::{chrome_base_path_template, ChromeManifestWriter};
use crate::utils::helpers::{join, normalize, to_native, to_slash};
use crate::utils::DependencyTracker;
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What a run did, per entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackageStats {
    pub jars: usize,
    pub copied: usize,
    pub linked: usize,
    pub preprocessed: usize,
    pub up_to_date: usize,
}

impl PackageStats {
    pub fn writes(&self) -> usize {
        self.copied + self.linked + self.preprocessed
    }
}

/// Output location of the section currently being packaged.
struct JarTarget {
    stem: PathBuf,
    jar_path: Option<PathBuf>,
}

impl JarTarget {
    fn dependency_for(&self, output: &str) -> PathBuf {
        match &self.jar_path {
            Some(jar) => jar.clone(),
            None => to_native(&self.stem, output),
        }
    }
}

pub struct JarMaker {
    options: JarMakerOptions,
    registration: ChromeManifestWriter,
    preprocessor: Preprocessor,
    top_source_dir: PathBuf,
    source_dirs: Vec<PathBuf>,
    manifest_dir: Option<PathBuf>,
    default_locale_dirs: Vec<PathBuf>,
    locale_dirs: Vec<PathBuf>,
    seen_outputs: HashSet<(PathBuf, String)>,
    deps: DependencyTracker,
    stats: PackageStats,
}

impl JarMaker {
    pub fn new(options: JarMakerOptions) -> Result<Self> {
        if options.l10n_base.is_some() && options.relativesrcdir.is_none() {
            return Err(JarError::InvalidOptions(
                "--l10n-base requires --relativesrcdir".to_string(),
            ));
        }
        if options.l10n_base.is_some() && options.locale_dirs.is_some() {
            return Err(JarError::InvalidOptions(
                "--l10n-base and --l10n-src are mutually exclusive".to_string(),
            ));
        }

        let top_source_dir = normalize(&options.top_source_dir);
        let source_dirs = options.source_dirs.iter().map(|p| normalize(p)).collect();
        let default_locale_dirs = match (&options.locale_dirs, &options.relativesrcdir) {
            (Some(dirs), _) => dirs.iter().map(|p| normalize(p)).collect(),
            (None, Some(relativesrcdir)) => generate_locale_dirs(
                relativesrcdir,
                &top_source_dir,
                options.l10n_base.as_deref().map(normalize).as_deref(),
                options.l10n_merge.as_deref().map(normalize).as_deref(),
            ),
            (None, None) => Vec::new(),
        };

        Ok(Self {
            registration: ChromeManifestWriter {
                use_jarfile_manifest: options.use_jarfile_manifest,
                use_chrome_manifest: options.use_chrome_manifest,
                root_manifest_app_id: options.root_manifest_app_id.clone(),
            },
            preprocessor: Preprocessor::with_defines(&options.defines),
            top_source_dir,
            source_dirs,
            manifest_dir: None,
            locale_dirs: default_locale_dirs.clone(),
            default_locale_dirs,
            seen_outputs: HashSet::new(),
            deps: DependencyTracker::new(),
            stats: PackageStats::default(),
            options,
        })
    }

    pub fn options(&self) -> &JarMakerOptions {
        &self.options
    }

    pub fn source_dirs(&self) -> &[PathBuf] {
        &self.source_dirs
    }

    pub fn locale_dirs(&self) -> &[PathBuf] {
        &self.locale_dirs
    }

    pub fn stats(&self) -> PackageStats {
        self.stats
    }

    pub fn dependencies(&self) -> &DependencyTracker {
        &self.deps
    }

    /// Package the manifest read from `manifest` into `output_root`.
    pub fn make_jar<R: Read>(
        &mut self,
        mut manifest: R,
        output_root: &Path,
    ) -> Result<PackageStats> {
        let mut text = String::new();
        manifest
            .read_to_string(&mut text)
            .at_path("<stdin>")?;
        self.make_jar_from_str(&text, None, output_root)
    }

    /// Package a manifest file. Its directory is searched before the source dirs.
    pub fn make_jar_from_path(
        &mut self,
        manifest: &Path,
        output_root: &Path,
    ) -> Result<PackageStats> {
        let text = fs::read_to_string(manifest).at_path(manifest)?;
        self.make_jar_from_str(&text, Some(manifest), output_root)
    }

    pub fn make_jar_from_str(
        &mut self,
        text: &str,
        manifest_path: Option<&Path>,
        output_root: &Path,
    ) -> Result<PackageStats> {
        let display_path = manifest_path.unwrap_or_else(|| Path::new("<stdin>"));
        log::info!("processing {}", display_path.display());

        self.manifest_dir = None;
        if let Some(path) = manifest_path {
            let path = normalize(path);
            self.manifest_dir = path.parent().map(Path::to_path_buf);
            self.deps.add_prerequisite(path);
        }

        let jars = self.parse_manifest(text, display_path)?;
        for jar in &jars {
            self.process_jar_section(jar, output_root)?;
        }

        if let Some(deps_file) = &self.options.deps_file {
            self.deps.write(deps_file)?;
        }

        Ok(self.stats)
    }

    /// Preprocess and parse a manifest without packaging anything.
    pub fn parse_manifest(&mut self, text: &str, path: &Path) -> Result<Vec<JarInfo>> {
        let mut pp = self.preprocessor.clone();
        let preprocessed = pp.process_str(text, path)?;
        for included in pp.included_files() {
            self.deps.add_prerequisite(included.clone());
        }
        parse_jar_manifest(&preprocessed)
    }

    pub fn process_jar_section(&mut self, jar: &JarInfo, output_root: &Path) -> Result<()> {
        let format = self.options.output_format;
        let template = chrome_base_path_template(&jar.name, format);
        let stem = to_native(&to_native(output_root, &jar.base), &jar.name);

        let (mut backend, jar_path): (Box<dyn OutputBackend>, Option<PathBuf>) = match format {
            OutputFormat::Jar => {
                let mut path = stem.clone().into_os_string();
                path.push(".jar");
                let path = PathBuf::from(path);
                (Box::new(JarOutput::open(&path)?), Some(path))
            }
            OutputFormat::Flat => (Box::new(FlatOutput::new(&stem)), None),
            OutputFormat::Symlink => (Box::new(SymlinkOutput::new(&stem)), None),
        };
        log::info!("packaging {} ({})", stem.display(), format);

        self.locale_dirs = match &jar.relativesrcdir {
            Some(relativesrcdir) => generate_locale_dirs(
                relativesrcdir,
                &self.top_source_dir,
                self.options.l10n_base.as_deref().map(normalize).as_deref(),
                self.options.l10n_merge.as_deref().map(normalize).as_deref(),
            ),
            None => self.default_locale_dirs.clone(),
        };

        let target = JarTarget { stem, jar_path };
        let result = jar
            .entries
            .iter()
            .try_for_each(|entry| self.process_entry(entry, backend.as_mut(), &target))
            .and_then(|()| self.registration.finalize(output_root, jar, &template));

        match result {
            Ok(_) => {
                backend.finish()?;
                self.stats.jars += 1;
                Ok(())
            }
            Err(err) => {
                if let Err(close_err) = backend.finish() {
                    log::warn!("failed to close {}: {}", target.stem.display(), close_err);
                }
                Err(err)
            }
        }
    }

    /// Roots to search for an entry, plus the source path relative to them.
    fn search_roots(&self, entry: &JarManifestEntry) -> Result<(Vec<PathBuf>, String)> {
        if entry.is_locale {
            // Fluent files have no en-US fallback.
            let mut roots = self.locale_dirs.clone();
            if entry.source.ends_with(".ftl")
                && roots.len() > 1
                && roots.last().map_or(false, |r| is_en_us_root(r))
            {
                roots.pop();
            }
            Ok((roots, entry.source.clone()))
        } else if let Some(anchored) = entry.source.strip_prefix('/') {
            Ok((vec![self.top_source_dir.clone()], anchored.to_string()))
        } else {
            let mut roots: Vec<PathBuf> = self
                .manifest_dir
                .iter()
                .chain(&self.source_dirs)
                .cloned()
                .collect();
            roots.push(std::env::current_dir().at_path(".")?);
            Ok((roots, entry.source.clone()))
        }
    }

    fn process_entry(
        &mut self,
        entry: &JarManifestEntry,
        backend: &mut dyn OutputBackend,
        target: &JarTarget,
    ) -> Result<()> {
        let (roots, source) = self.search_roots(entry)?;

        if source.contains('*') {
            return self.expand_wildcard(entry, &roots, &source, backend, target);
        }

        let real_source = roots
            .iter()
            .map(|root| to_native(root, &source))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| JarError::SourceNotFound {
                source_path: source.clone(),
                roots: roots.clone(),
            })?;

        if !self
            .seen_outputs
            .insert((target.stem.clone(), entry.output.clone()))
        {
            return Err(JarError::DuplicateOutput {
                output: entry.output.clone(),
            });
        }

        self.deps.add_prerequisite(real_source.clone());
        self.deps.add_target(target.dependency_for(&entry.output));

        let source_mtime = fs::metadata(&real_source)
            .and_then(|m| m.modified())
            .at_path(&real_source)?;

        if entry.preprocess {
            return self.preprocess_entry(entry, &real_source, source_mtime, backend);
        }

        let dest_mtime = backend.dest_mtime(&entry.output)?;
        if !is_newer(source_mtime, dest_mtime, backend.mtime_resolution()) {
            log::debug!("{} is up to date", entry.output);
            self.stats.up_to_date += 1;
            return Ok(());
        }

        if backend.supports_symlinks() {
            log::debug!("linking {} -> {}", entry.output, real_source.display());
            backend.symlink(&real_source, &entry.output)?;
            self.stats.linked += 1;
            return Ok(());
        }

        log::debug!("copying {} -> {}", real_source.display(), entry.output);
        let mut input = File::open(&real_source).at_path(&real_source)?;
        let mut output = backend.get_output(&entry.output, source_mtime)?;
        io::copy(&mut input, &mut output).at_path(&real_source)?;
        output.commit()?;
        self.stats.copied += 1;
        Ok(())
    }

    fn preprocess_entry(
        &mut self,
        entry: &JarManifestEntry,
        real_source: &Path,
        source_mtime: std::time::SystemTime,
        backend: &mut dyn OutputBackend,
    ) -> Result<()> {
        let mut pp = self.preprocessor.clone();
        if entry.source.ends_with(".css") {
            pp.set_marker('%');
        }
        let content = pp.process_file(real_source)?;
        pp.fail_unused(real_source)?;
        for included in pp.included_files() {
            self.deps.add_prerequisite(included.clone());
        }

        if backend.existing_content(&entry.output)?.as_deref() == Some(content.as_bytes()) {
            log::debug!("{} is up to date (preprocessed)", entry.output);
            self.stats.up_to_date += 1;
            return Ok(());
        }

        log::debug!("preprocessing {} -> {}", real_source.display(), entry.output);
        let mut output = backend.get_output(&entry.output, source_mtime)?;
        output.write_all(content.as_bytes()).at_path(real_source)?;
        output.commit()?;
        self.stats.preprocessed += 1;
        Ok(())
    }

    fn expand_wildcard(
        &mut self,
        entry: &JarManifestEntry,
        roots: &[PathBuf],
        source: &str,
        backend: &mut dyn OutputBackend,
        target: &JarTarget,
    ) -> Result<()> {
        let pattern = Pattern::new(source).map_err(|e| JarError::ManifestSyntax {
            line_number: 0,
            line: entry.source.clone(),
            reason: format!("invalid wildcard: {}", e.msg),
        })?;
        let match_options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let prefix = wildcard_prefix(source);
        let anchored = !entry.is_locale && entry.source.starts_with('/');

        let mut emitted = HashSet::new();
        for root in roots {
            let walk_root = to_native(root, &prefix);
            if !walk_root.is_dir() {
                continue;
            }

            for found in WalkDir::new(&walk_root).follow_links(true).sort_by_file_name() {
                let found = found.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| walk_root.clone());
                    JarError::io(path, io::Error::from(e))
                })?;
                if !found.file_type().is_file() {
                    continue;
                }
                let relative = match found.path().strip_prefix(root) {
                    Ok(relative) => to_slash(relative),
                    Err(_) => continue,
                };
                if !pattern.matches_with(&relative, match_options) {
                    continue;
                }

                let reduced = match relative.strip_prefix(prefix.as_str()) {
                    Some(reduced) => reduced.to_string(),
                    None => continue,
                };
                if !emitted.insert(reduced.clone()) {
                    continue;
                }

                let source = if anchored {
                    format!("/{}", relative)
                } else {
                    relative
                };
                let expanded = JarManifestEntry::new(join(&[&entry.output, &reduced]), source)
                    .locale(entry.is_locale)
                    .preprocessed(entry.preprocess);
                self.process_entry(&expanded, backend, target)?;
            }
        }

        if emitted.is_empty() {
            log::warn!("{} did not match any file", entry.source);
        }
        Ok(())
    }
}

/// Leading path components without wildcards, each followed by `/`.
pub fn wildcard_prefix(source: &str) -> String {
    source
        .split('/')
        .take_while(|component| !component.contains('*'))
        .map(|component| format!("{}/", component))
        .collect()
}
