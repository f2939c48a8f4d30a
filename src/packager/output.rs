//! Output destinations for packaged entries

use crate::error::{IoResultExt, JarError, Result};
use crate::utils::helpers::to_native;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A writable output entry. Dropping it without `commit` abandons the write.
pub trait OutputStream: Write {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Where the entries of one jar section end up.
pub trait OutputBackend {
    /// Modification time of an entry, `None` when it does not exist.
    fn dest_mtime(&mut self, name: &str) -> Result<Option<SystemTime>>;

    /// Smallest time difference the backend can store.
    fn mtime_resolution(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Current bytes of an entry, if it exists.
    fn existing_content(&mut self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Open an entry for writing. `modified` is recorded where the backend stores timestamps.
    fn get_output<'a>(
        &'a mut self,
        name: &str,
        modified: SystemTime,
    ) -> Result<Box<dyn OutputStream + 'a>>;

    fn supports_symlinks(&self) -> bool {
        false
    }

    fn symlink(&mut self, source: &Path, name: &str) -> Result<()> {
        let _ = source;
        Err(JarError::io(
            name,
            io::Error::new(io::ErrorKind::Unsupported, "backend does not support symlinks"),
        ))
    }

    /// Flush and release the destination.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Compare timestamps at the backend's resolution: rewrite only when the
/// source is strictly newer. A missing destination is always stale.
pub fn is_newer(source: SystemTime, dest: Option<SystemTime>, resolution: Duration) -> bool {
    match dest {
        Some(dest) => truncate(source, resolution) > truncate(dest, resolution),
        None => true,
    }
}

fn truncate(time: SystemTime, resolution: Duration) -> u64 {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let step = resolution.as_secs().max(1);
    secs - secs % step
}

fn file_mtime(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => metadata.modified().map(Some).at_path(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(JarError::io(path, e)),
    }
}

/// Create parent directories and get rid of whatever is at `path`.
fn prepare_destination(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    match fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.is_dir() => fs::remove_file(path).at_path(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JarError::io(path, e)),
    }
}

struct FileStream {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl OutputStream for FileStream {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.writer.flush().at_path(&self.path)
    }
}

/// Entries written as plain files below `<root>/`.
#[derive(Debug)]
pub struct FlatOutput {
    root: PathBuf,
}

impl FlatOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        to_native(&self.root, name)
    }
}

impl OutputBackend for FlatOutput {
    fn dest_mtime(&mut self, name: &str) -> Result<Option<SystemTime>> {
        file_mtime(&self.entry_path(name))
    }

    fn existing_content(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(name);
        match fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(JarError::io(path, e)),
        }
    }

    fn get_output<'a>(
        &'a mut self,
        name: &str,
        _modified: SystemTime,
    ) -> Result<Box<dyn OutputStream + 'a>> {
        let path = self.entry_path(name);
        prepare_destination(&path)?;
        let file = File::create(&path).at_path(&path)?;
        Ok(Box::new(FileStream {
            path,
            writer: BufWriter::new(file),
        }))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Like [`FlatOutput`], but unmodified files are linked instead of copied.
#[derive(Debug)]
pub struct SymlinkOutput {
    flat: FlatOutput,
}

impl SymlinkOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            flat: FlatOutput::new(root),
        }
    }
}

impl OutputBackend for SymlinkOutput {
    fn dest_mtime(&mut self, name: &str) -> Result<Option<SystemTime>> {
        self.flat.dest_mtime(name)
    }

    fn existing_content(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        // A link to the source is not generated content.
        let path = self.flat.entry_path(name);
        match fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.file_type().is_symlink() => Ok(None),
            _ => self.flat.existing_content(name),
        }
    }

    fn get_output<'a>(
        &'a mut self,
        name: &str,
        modified: SystemTime,
    ) -> Result<Box<dyn OutputStream + 'a>> {
        self.flat.get_output(name, modified)
    }

    fn supports_symlinks(&self) -> bool {
        true
    }

    fn symlink(&mut self, source: &Path, name: &str) -> Result<()> {
        let dest = self.flat.entry_path(name);
        prepare_destination(&dest)?;
        link(source, &dest).at_path(&dest)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn link(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

// Symlinks need special privileges on Windows; hard links don't.
#[cfg(windows)]
fn link(source: &Path, dest: &Path) -> io::Result<()> {
    fs::hard_link(source, dest)
}
