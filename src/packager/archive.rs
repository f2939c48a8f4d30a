//! Jar (zip) output

use super::output::{OutputBackend, OutputStream};
use crate::error::{IoResultExt, JarError, Result};
use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zip::result::ZipResult;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime, ZipArchive};

/// Convert a filesystem time to a zip (DOS, local time) timestamp.
pub fn to_zip_datetime(time: SystemTime) -> DateTime {
    let local: chrono::DateTime<Local> = time.into();
    DateTime::from_date_and_time(
        local.year().clamp(1980, 2107) as u16,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

/// Convert a zip timestamp back to a filesystem time.
pub fn from_zip_datetime(datetime: &DateTime) -> SystemTime {
    NaiveDate::from_ymd_opt(
        datetime.year() as i32,
        datetime.month() as u32,
        datetime.day() as u32,
    )
    .and_then(|date| {
        date.and_hms_opt(
            datetime.hour() as u32,
            datetime.minute() as u32,
            datetime.second() as u32,
        )
    })
    .and_then(|naive| Local.from_local_datetime(&naive).earliest())
    .map(SystemTime::from)
    .unwrap_or(UNIX_EPOCH)
}

#[derive(Debug)]
struct PendingEntry {
    name: String,
    data: Vec<u8>,
    modified: DateTime,
}

/// Entries collected for one jar; the archive is written by `finish`.
///
/// New entries are appended to an existing jar. When an entry that is
/// already in the jar gets rewritten, the whole jar is rebuilt so that it
/// never holds two entries with the same name.
///
/// A jar that cannot be read is treated as absent and written from scratch.
#[derive(Debug)]
pub struct JarOutput {
    path: PathBuf,
    existing: HashMap<String, DateTime>,
    pending: Vec<PendingEntry>,
    fresh: bool,
}

impl JarOutput {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }

        let mut existing = HashMap::new();
        let mut fresh = true;
        if path.exists() {
            let file = File::open(&path).at_path(&path)?;
            match read_index(file) {
                Ok(index) => {
                    existing = index;
                    fresh = false;
                }
                Err(e) => {
                    log::warn!("{} is not a valid jar, recreating it: {}", path.display(), e)
                }
            }
        }

        Ok(Self {
            path,
            existing,
            pending: Vec::new(),
            fresh,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn options(modified: DateTime) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(modified)
            .unix_permissions(0o644)
    }

    fn write_pending<W: Write + Seek>(&self, zip: &mut ZipWriter<W>) -> Result<()> {
        for entry in &self.pending {
            zip.start_file(entry.name.as_str(), Self::options(entry.modified))
                .map_err(|e| JarError::zip(&self.path, e))?;
            zip.write_all(&entry.data).at_path(&self.path)?;
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        PathBuf::from(tmp_name)
    }

    fn create(&self) -> Result<()> {
        let tmp_path = self.tmp_path();
        {
            let file = File::create(&tmp_path).at_path(&tmp_path)?;
            let mut zip = ZipWriter::new(file);
            self.write_pending(&mut zip)?;
            zip.finish().map_err(|e| JarError::zip(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &self.path).at_path(&self.path)
    }

    fn append(&self) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .at_path(&self.path)?;
        let mut zip = ZipWriter::new_append(file).map_err(|e| JarError::zip(&self.path, e))?;
        self.write_pending(&mut zip)?;
        zip.finish().map_err(|e| JarError::zip(&self.path, e))?;
        Ok(())
    }

    fn rebuild(&self) -> Result<()> {
        let tmp_path = self.tmp_path();

        {
            let file = File::open(&self.path).at_path(&self.path)?;
            let mut archive = ZipArchive::new(file).map_err(|e| JarError::zip(&self.path, e))?;
            let out = File::create(&tmp_path).at_path(&tmp_path)?;
            let mut zip = ZipWriter::new(out);

            for i in 0..archive.len() {
                let entry = archive.by_index(i).map_err(|e| JarError::zip(&self.path, e))?;
                if self.pending.iter().any(|p| p.name == entry.name()) {
                    continue;
                }
                zip.raw_copy_file(entry)
                    .map_err(|e| JarError::zip(&tmp_path, e))?;
            }

            self.write_pending(&mut zip)?;
            zip.finish().map_err(|e| JarError::zip(&tmp_path, e))?;
        }

        fs::rename(&tmp_path, &self.path).at_path(&self.path)
    }
}

fn read_index(file: File) -> ZipResult<HashMap<String, DateTime>> {
    let mut archive = ZipArchive::new(file)?;
    let mut index = HashMap::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        index.insert(entry.name().to_string(), entry.last_modified());
    }
    Ok(index)
}

struct ZipEntryStream<'a> {
    name: String,
    modified: DateTime,
    buffer: Vec<u8>,
    pending: &'a mut Vec<PendingEntry>,
}

impl Write for ZipEntryStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputStream for ZipEntryStream<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        let ZipEntryStream {
            name,
            modified,
            buffer,
            pending,
        } = *self;
        pending.retain(|p| p.name != name);
        pending.push(PendingEntry {
            name,
            data: buffer,
            modified,
        });
        Ok(())
    }
}

impl OutputBackend for JarOutput {
    fn dest_mtime(&mut self, name: &str) -> Result<Option<SystemTime>> {
        if let Some(entry) = self.pending.iter().find(|p| p.name == name) {
            return Ok(Some(from_zip_datetime(&entry.modified)));
        }
        Ok(self.existing.get(name).map(from_zip_datetime))
    }

    fn mtime_resolution(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn existing_content(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.pending.iter().find(|p| p.name == name) {
            return Ok(Some(entry.data.clone()));
        }
        if !self.existing.contains_key(name) {
            return Ok(None);
        }

        let file = File::open(&self.path).at_path(&self.path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| JarError::zip(&self.path, e))?;
        let mut entry = archive
            .by_name(name)
            .map_err(|e| JarError::zip(&self.path, e))?;
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content).at_path(&self.path)?;
        Ok(Some(content))
    }

    fn get_output<'a>(
        &'a mut self,
        name: &str,
        modified: SystemTime,
    ) -> Result<Box<dyn OutputStream + 'a>> {
        Ok(Box::new(ZipEntryStream {
            name: name.to_string(),
            modified: to_zip_datetime(modified),
            buffer: Vec::new(),
            pending: &mut self.pending,
        }))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        if self.fresh {
            return self.create();
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        let replaces = self
            .pending
            .iter()
            .any(|p| self.existing.contains_key(&p.name));
        if replaces {
            log::debug!("rebuilding {}", self.path.display());
            self.rebuild()
        } else {
            self.append()
        }
    }
}
