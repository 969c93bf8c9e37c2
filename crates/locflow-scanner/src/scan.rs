//! The scan engine.

use std::fs::Metadata;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, Local};
use locflow_core::{FileRecord, FileType};
use tracing::{debug, warn};

use crate::error::{ScanError, ScanResult};

/// Symlink frames a single walk may hold open at once.
const MAX_LINK_FRAMES: usize = 64;

/// Manifest flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Wall-clock header, five columns per row.
    Short,
    /// Scan-root header, eight columns per row.
    Long,
}

/// Walks directories and emits manifest rows.
#[derive(Debug, Clone)]
pub struct Scanner {
    mode: ScanMode,
    local_root: PathBuf,
}

impl Scanner {
    /// Scanner for the given mode and node-local storage root.
    #[must_use]
    pub fn new(mode: ScanMode, local_root: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            local_root: local_root.into(),
        }
    }

    /// Scan `dirs` and write the manifest to `output`.
    ///
    /// Directory rows precede their contents. Symbolic links pointing at
    /// directories under the local root but outside the scanned directory
    /// are descended into, with descendant paths rewritten under the link
    /// source, so staged inputs keep their virtual-path view.
    ///
    /// # Errors
    ///
    /// Fails fast on an unknown scan directory, a scan directory outside
    /// the local root, or any unreadable entry.
    pub fn scan(&self, output: &Path, dirs: &[PathBuf]) -> ScanResult<()> {
        for dir in dirs {
            if !dir.is_dir() {
                return Err(ScanError::UnknownScanDir(dir.clone()));
            }
            if !dir.starts_with(&self.local_root) {
                return Err(ScanError::OutsideLocalRoot {
                    dir: dir.clone(),
                    root: self.local_root.clone(),
                });
            }
        }

        let file = std::fs::File::create(output)?;
        let mut out = BufWriter::new(file);
        match self.mode {
            ScanMode::Short => writeln!(out, "{}", wall_clock_millis())?,
            ScanMode::Long => {
                // The root-directory header; lookups translate workdir paths
                // against it.
                let root = dirs.first().map_or(self.local_root.as_path(), PathBuf::as_path);
                writeln!(out, "{}", root.display())?;
            }
        }

        for dir in dirs {
            let mut frames = Vec::new();
            self.walk_dir(dir, dir, dir, &mut frames, &mut out)?;
        }
        out.flush()?;
        debug!(output = %output.display(), "manifest written");
        Ok(())
    }

    fn walk_dir(
        &self,
        real_dir: &Path,
        virtual_dir: &Path,
        scan_dir: &Path,
        frames: &mut Vec<PathBuf>,
        out: &mut impl Write,
    ) -> ScanResult<()> {
        let reader = std::fs::read_dir(real_dir).map_err(|source| ScanError::Unreadable {
            path: real_dir.to_path_buf(),
            source,
        })?;
        let mut entries: Vec<_> = reader
            .collect::<Result<_, _>>()
            .map_err(|source| ScanError::Unreadable {
                path: real_dir.to_path_buf(),
                source,
            })?;
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let real = entry.path();
            let virtual_path = virtual_dir.join(entry.file_name());
            let meta = std::fs::symlink_metadata(&real).map_err(|source| ScanError::Unreadable {
                path: real.clone(),
                source,
            })?;

            if meta.is_symlink() {
                self.emit_symlink(&real, virtual_path, scan_dir, frames, out)?;
            } else if meta.is_dir() {
                self.emit(out, &record_from(virtual_path.clone(), None, &meta))?;
                self.walk_dir(&real, &virtual_path, scan_dir, frames, out)?;
            } else {
                self.emit(out, &record_from(virtual_path, None, &meta))?;
            }
        }
        Ok(())
    }

    fn emit_symlink(
        &self,
        real: &Path,
        virtual_path: PathBuf,
        scan_dir: &Path,
        frames: &mut Vec<PathBuf>,
        out: &mut impl Write,
    ) -> ScanResult<()> {
        let Ok(target) = std::fs::canonicalize(real) else {
            // Target gone: record the dangling link with the two-column row.
            self.emit(out, &FileRecord {
                virtual_path,
                exists: false,
                real_path: None,
                size: 0,
                file_type: None,
                creation_time: None,
                access_time: None,
                modification_time: None,
            })?;
            return Ok(());
        };
        let target_meta = std::fs::metadata(real).map_err(|source| ScanError::Unreadable {
            path: real.to_path_buf(),
            source,
        })?;
        self.emit(
            out,
            &record_from(virtual_path.clone(), Some(target.clone()), &target_meta),
        )?;

        let descend = target_meta.is_dir()
            && target.starts_with(&self.local_root)
            && !target.starts_with(scan_dir);
        if !descend {
            return Ok(());
        }
        if frames.iter().any(|frame| frame == &target) || frames.len() >= MAX_LINK_FRAMES {
            warn!(link = %virtual_path.display(), target = %target.display(), "symlink frame limit or cycle, not descending");
            return Ok(());
        }
        frames.push(target.clone());
        let walked = self.walk_dir(&target, &virtual_path, scan_dir, frames, out);
        frames.pop();
        walked
    }

    fn emit(&self, out: &mut impl Write, record: &FileRecord) -> ScanResult<()> {
        let line = match self.mode {
            ScanMode::Short => record.to_short_line(),
            ScanMode::Long => record.to_long_line(),
        };
        writeln!(out, "{line}")?;
        Ok(())
    }
}

/// Build a record from stat results. `real_path` is set for symlinks, in
/// which case the metadata is the followed target's.
fn record_from(virtual_path: PathBuf, real_path: Option<PathBuf>, meta: &Metadata) -> FileRecord {
    let file_type = if real_path.is_some() {
        FileType::SymbolicLink
    } else if meta.is_dir() {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    FileRecord {
        virtual_path,
        exists: true,
        real_path,
        size: meta.len(),
        file_type: Some(file_type),
        creation_time: to_file_time(meta.created().ok()),
        access_time: to_file_time(meta.accessed().ok()),
        modification_time: to_file_time(meta.modified().ok()),
    }
}

fn to_file_time(time: Option<SystemTime>) -> Option<DateTime<FixedOffset>> {
    time.map(|t| DateTime::<Local>::from(t).fixed_offset())
}

fn wall_clock_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
