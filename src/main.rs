//! jarmaker CLI

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use jarmaker::{JarError, JarMaker, JarMakerOptions, OutputFormat};
use log::LevelFilter;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "jarmaker")]
#[command(about = "Package chrome files described by a jar manifest", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format: jar, flat or symlink
    #[arg(short = 'f', long = "format")]
    format: OutputFormat,

    /// More logging; repeat for debug output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Register in chrome.manifest only, without per-jar manifests
    #[arg(short = 'e')]
    chrome_manifest_only: bool,

    /// Source directory (repeatable)
    #[arg(short = 's', value_name = "DIR")]
    source_dirs: Vec<PathBuf>,

    /// Top source directory
    #[arg(short = 't', value_name = "DIR", default_value = ".")]
    top_source_dir: PathBuf,

    /// Localization directory (repeatable)
    #[arg(short = 'c', long = "l10n-src", value_name = "DIR")]
    l10n_src: Vec<PathBuf>,

    /// Merged localization base directory
    #[arg(long, value_name = "DIR", requires = "relativesrcdir", conflicts_with = "l10n_src")]
    l10n_base: Option<PathBuf>,

    /// Localization merge directory, searched before --l10n-base
    #[arg(long = "locale-mergedir", value_name = "DIR")]
    locale_mergedir: Option<PathBuf>,

    /// Relative source directory used for locale resolution
    #[arg(long, value_name = "PATH")]
    relativesrcdir: Option<String>,

    /// Output directory
    #[arg(short = 'd', value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Add an application-specific entry to the root chrome manifest
    #[arg(long = "root-manifest-entry-appid", value_name = "ID")]
    root_manifest_entry_appid: Option<String>,

    /// Preprocessor define, NAME or NAME=VALUE (repeatable)
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Preprocessor undefine (repeatable)
    #[arg(short = 'U', value_name = "NAME")]
    undefines: Vec<String>,

    /// Write a make dependency file
    #[arg(long = "deps-file", value_name = "FILE")]
    deps_file: Option<PathBuf>,

    /// Print the parsed manifest as JSON and exit
    #[arg(long)]
    print_manifest: bool,

    /// Jar manifest; `-` or nothing reads stdin
    manifest: Option<PathBuf>,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }

    fn options(&self) -> JarMakerOptions {
        let mut options = JarMakerOptions::new(self.format);
        if self.chrome_manifest_only {
            options.use_chrome_manifest = true;
            options.use_jarfile_manifest = false;
        }
        options.top_source_dir = self.top_source_dir.clone();
        options.source_dirs = self.source_dirs.clone();
        if !self.l10n_src.is_empty() {
            options.locale_dirs = Some(self.l10n_src.clone());
        }
        options.l10n_base = self.l10n_base.clone();
        options.l10n_merge = self.locale_mergedir.clone();
        options.relativesrcdir = self.relativesrcdir.clone();
        options.root_manifest_app_id = self.root_manifest_entry_appid.clone();
        options.deps_file = self.deps_file.clone();

        for define in &self.defines {
            let (name, value) = match define.split_once('=') {
                Some((name, value)) => (name, value),
                None => (define.as_str(), "1"),
            };
            options.defines.insert(name.to_string(), value.to_string());
        }
        for name in &self.undefines {
            options.defines.remove(name);
        }
        options
    }

    fn manifest_path(&self) -> Option<&Path> {
        self.manifest
            .as_deref()
            .filter(|path| path.as_os_str() != "-")
    }
}

fn init_logging(level: LevelFilter) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()));

    // Disable log context except at higher log levels.
    if level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut maker = JarMaker::new(cli.options())?;

    let (text, manifest_path) = match cli.manifest_path() {
        Some(path) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            Some(path),
        ),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read manifest from stdin")?;
            (text, None)
        }
    };
    let display = manifest_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_string());

    if cli.print_manifest {
        let jars = maker
            .parse_manifest(&text, manifest_path.unwrap_or_else(|| Path::new("<stdin>")))
            .with_context(|| format!("failed to parse {}", display))?;
        println!("{}", serde_json::to_string_pretty(&jars)?);
        return Ok(());
    }

    let stats = maker
        .make_jar_from_str(&text, manifest_path, &cli.output_dir)
        .with_context(|| format!("failed to package {}", display))?;

    log::info!(
        "{} jar section(s): {} copied, {} linked, {} preprocessed, {} up to date",
        stats.jars,
        stats.copied,
        stats.linked,
        stats.preprocessed,
        stats.up_to_date
    );
    Ok(())
}

/// One-line diagnostic naming the error kind.
fn error_line(err: &anyhow::Error) -> String {
    let kind = err
        .downcast_ref::<JarError>()
        .map(|e| e.kind())
        .unwrap_or("Error");
    format!("{} {}: {:#}", "error:".red().bold(), kind, err)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    if let Err(err) = run(&cli) {
        eprintln!("{}", error_line(&err));
        std::process::exit(1);
    }
}
