//! Manifest records.
//!
//! One record per scanned filesystem entry, semicolon-delimited:
//!
//! ```text
//! '<virtual_path>';<exists>;<real_path>;<size>;<file_type>;<ctime>;<atime>;<mtime>
//! ```
//!
//! A dangling symlink is recorded with exactly two columns (`'<path>';0`).
//! The short form drops the three timestamp columns.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::error::{ManifestError, ManifestResult};
use crate::time::{format_file_time, parse_file_time};

/// Column delimiter of the manifest wire format.
pub const DELIMITER: char = ';';

/// Kind of a scanned filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A plain regular file.
    RegularFile,
    /// A directory.
    Directory,
    /// A symbolic link (the record's `real_path` holds the target).
    SymbolicLink,
}

impl FileType {
    /// Parse the wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownFileType`] for any string other than
    /// the three known type names.
    pub fn parse(value: &str) -> ManifestResult<Self> {
        match value {
            "regular file" => Ok(Self::RegularFile),
            "directory" => Ok(Self::Directory),
            "symbolic link" => Ok(Self::SymbolicLink),
            other => Err(ManifestError::UnknownFileType(other.to_owned())),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RegularFile => "regular file",
            Self::Directory => "directory",
            Self::SymbolicLink => "symbolic link",
        };
        f.write_str(name)
    }
}

/// One row of a scanner manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path as observed by the scanning task.
    pub virtual_path: PathBuf,
    /// Whether the entry (or its link target) exists.
    pub exists: bool,
    /// Link target when `virtual_path` is a symbolic link.
    pub real_path: Option<PathBuf>,
    /// Size in bytes.
    pub size: u64,
    /// Entry kind; absent on dangling-symlink rows.
    pub file_type: Option<FileType>,
    /// Creation time, if the platform reports one.
    pub creation_time: Option<DateTime<FixedOffset>>,
    /// Last access time.
    pub access_time: Option<DateTime<FixedOffset>>,
    /// Last modification time.
    pub modification_time: Option<DateTime<FixedOffset>>,
}

impl FileRecord {
    /// Parse a long-form record line: 8 columns, or 2 columns for a dangling
    /// symlink.
    ///
    /// # Errors
    ///
    /// Any other column count is a hard parse error, as are malformed flag,
    /// size, type or timestamp columns.
    pub fn parse(line: &str) -> ManifestResult<Self> {
        let columns: Vec<&str> = line.split(DELIMITER).collect();
        match columns.len() {
            2 => Self::parse_dangling(&columns, line),
            8 => {
                let mut record = Self::parse_common(&columns, line)?;
                record.creation_time = parse_time_column(columns[5])?;
                record.access_time = parse_time_column(columns[6])?;
                record.modification_time = parse_time_column(columns[7])?;
                Ok(record)
            }
            count => Err(ManifestError::BadArity {
                count,
                line: line.to_owned(),
            }),
        }
    }

    /// Parse a short-form record line: 5 columns, or 2 for a dangling symlink.
    ///
    /// # Errors
    ///
    /// Same policy as [`FileRecord::parse`].
    pub fn parse_short(line: &str) -> ManifestResult<Self> {
        let columns: Vec<&str> = line.split(DELIMITER).collect();
        match columns.len() {
            2 => Self::parse_dangling(&columns, line),
            5 => Self::parse_common(&columns, line),
            count => Err(ManifestError::BadArity {
                count,
                line: line.to_owned(),
            }),
        }
    }

    fn parse_dangling(columns: &[&str], line: &str) -> ManifestResult<Self> {
        if columns[1] != "0" {
            return Err(ManifestError::BadExistsFlag {
                flag: columns[1].to_owned(),
                line: line.to_owned(),
            });
        }
        Ok(Self {
            virtual_path: PathBuf::from(strip_quotes(columns[0])),
            exists: false,
            // Two-column rows denote a symlink whose target is gone; the
            // target itself was never resolvable.
            real_path: None,
            size: 0,
            file_type: None,
            creation_time: None,
            access_time: None,
            modification_time: None,
        })
    }

    /// Parse the five columns shared by both record forms.
    fn parse_common(columns: &[&str], line: &str) -> ManifestResult<Self> {
        let exists = match columns[1] {
            "1" => true,
            "0" => false,
            flag => {
                return Err(ManifestError::BadExistsFlag {
                    flag: flag.to_owned(),
                    line: line.to_owned(),
                });
            }
        };
        let size = columns[3]
            .parse::<u64>()
            .map_err(|_| ManifestError::BadSize {
                size: columns[3].to_owned(),
                line: line.to_owned(),
            })?;
        Ok(Self {
            virtual_path: PathBuf::from(strip_quotes(columns[0])),
            exists,
            real_path: (!columns[2].is_empty()).then(|| PathBuf::from(columns[2])),
            size,
            file_type: Some(FileType::parse(columns[4])?),
            creation_time: None,
            access_time: None,
            modification_time: None,
        })
    }

    /// Emit the long-form line.
    #[must_use]
    pub fn to_long_line(&self) -> String {
        if !self.exists && self.file_type.is_none() {
            return self.dangling_line();
        }
        format!(
            "'{}';{};{};{};{};{};{};{}",
            self.virtual_path.display(),
            u8::from(self.exists),
            self.real_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.size,
            self.file_type.map(|t| t.to_string()).unwrap_or_default(),
            format_file_time(self.creation_time.as_ref()),
            format_file_time(self.access_time.as_ref()),
            format_file_time(self.modification_time.as_ref()),
        )
    }

    /// Emit the short-form line (no timestamp columns).
    #[must_use]
    pub fn to_short_line(&self) -> String {
        if !self.exists && self.file_type.is_none() {
            return self.dangling_line();
        }
        format!(
            "'{}';{};{};{};{}",
            self.virtual_path.display(),
            u8::from(self.exists),
            self.real_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.size,
            self.file_type.map(|t| t.to_string()).unwrap_or_default(),
        )
    }

    fn dangling_line(&self) -> String {
        format!("'{}';0", self.virtual_path.display())
    }

    /// Whether the record describes a symbolic link, including a dangling one.
    #[must_use]
    pub fn is_link(&self) -> bool {
        !self.exists || self.real_path.is_some() || self.file_type == Some(FileType::SymbolicLink)
    }

    /// Whether the record describes a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.file_type == Some(FileType::Directory)
    }

    /// Creation time, substituting the modification time when the scanner
    /// could not determine one.
    #[must_use]
    pub fn creation_or_modification(&self) -> Option<DateTime<FixedOffset>> {
        self.creation_time.or(self.modification_time)
    }

    /// Whether `self.virtual_path` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Path) -> bool {
        self.virtual_path != ancestor && self.virtual_path.starts_with(ancestor)
    }
}

fn parse_time_column(column: &str) -> ManifestResult<Option<DateTime<FixedOffset>>> {
    parse_file_time(column)
}

/// Strip one leading and one trailing single quote, if present.
fn strip_quotes(column: &str) -> &str {
    let column = column.strip_prefix('\'').unwrap_or(column);
    column.strip_suffix('\'').unwrap_or(column)
}
