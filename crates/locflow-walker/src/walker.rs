//! Manifest streaming and lookup.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use locflow_core::FileRecord;
use locflow_path::LocalPath;
use rayon::prelude::*;
use tracing::debug;

use crate::error::WalkResult;
use crate::factory::LocalPathFactory;
use crate::visitor::{ManifestVisitor, VisitOutcome};

/// Parser and traverser for on-disk task manifests.
#[derive(Debug, Clone)]
pub struct LocalFileWalker {
    factory: LocalPathFactory,
}

impl LocalFileWalker {
    /// Walker parameterised with a path factory.
    #[must_use]
    pub fn new(factory: LocalPathFactory) -> Self {
        Self { factory }
    }

    /// Stream the manifest, invoking the visitor once per record in input
    /// order. A `SkipSubtree` reply arms a filter that silently drops every
    /// strict descendant of the replying record's path.
    ///
    /// # Errors
    ///
    /// IO failures and malformed records are fatal for the manifest.
    pub fn walk(
        &self,
        manifest: &Path,
        visitor: &mut dyn ManifestVisitor,
        workdir: &Path,
    ) -> WalkResult<()> {
        let file = std::fs::File::open(manifest)?;
        let mut lines = BufReader::new(file).lines();
        let Some(header) = lines.next() else {
            return Ok(());
        };
        let short_form = is_wall_clock(&header?);

        let mut skip_prefix: Option<PathBuf> = None;
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_record(short_form, &line)?;
            if let Some(prefix) = &skip_prefix {
                if record.is_descendant_of(prefix) {
                    continue;
                }
                skip_prefix = None;
            }
            let path = self.factory.make(
                record.virtual_path.clone(),
                Some(record.clone()),
                Some(workdir.to_path_buf()),
            );
            let outcome = if record.is_directory() {
                visitor.pre_visit_directory(&path, &record)
            } else {
                visitor.visit_file(&path, &record)
            };
            if outcome == VisitOutcome::SkipSubtree {
                skip_prefix = Some(record.virtual_path.clone());
            }
        }
        Ok(())
    }

    /// Whether `wanted` appears in the manifest, and under which attributes.
    ///
    /// The manifest records paths as seen at scan time; `wanted` is
    /// translated through [`fake_path`] using the scan-root header before
    /// matching. Matching runs in parallel; ordering is irrelevant because
    /// only the first match is returned. An empty manifest yields `None`.
    ///
    /// # Errors
    ///
    /// IO failures and malformed records are fatal for the manifest.
    pub fn lookup(
        &self,
        manifest: &Path,
        wanted: &Path,
        workdir: &Path,
    ) -> WalkResult<Option<LocalPath>> {
        let text = std::fs::read_to_string(manifest)?;
        let mut lines = text.lines();
        let Some(header) = lines.next() else {
            return Ok(None);
        };
        let short_form = is_wall_clock(header);
        let target = if short_form {
            wanted.to_path_buf()
        } else {
            fake_path(wanted, workdir, Path::new(header.trim()))
        };

        let records = lines
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_record(short_form, line))
            .collect::<WalkResult<Vec<FileRecord>>>()?;

        let found = records
            .into_par_iter()
            .find_any(|record| record.virtual_path == target);

        Ok(found.map(|record| {
            debug!(wanted = %wanted.display(), "manifest lookup hit");
            self.factory.make(
                wanted.to_path_buf(),
                Some(record),
                Some(workdir.to_path_buf()),
            )
        }))
    }
}

/// Translate a current-workdir path into the path the scanner would have
/// recorded: a purely textual prefix substitution of the workdir by the
/// scan root.
#[must_use]
pub fn fake_path(wanted: &Path, workdir: &Path, scan_root: &Path) -> PathBuf {
    match wanted.strip_prefix(workdir) {
        Ok(rest) => scan_root.join(rest),
        Err(_) => wanted.to_path_buf(),
    }
}

/// Short-form manifests carry a numeric wall-clock header instead of the
/// scan-root line.
fn is_wall_clock(header: &str) -> bool {
    let header = header.trim();
    !header.is_empty() && header.bytes().all(|b| b.is_ascii_digit())
}

fn parse_record(short_form: bool, line: &str) -> WalkResult<FileRecord> {
    let record = if short_form {
        FileRecord::parse_short(line)?
    } else {
        FileRecord::parse(line)?
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use locflow_core::FileType;

    /// Collects visitor calls as `(kind, path)` pairs.
    #[derive(Default)]
    struct Collector {
        calls: Vec<(&'static str, PathBuf)>,
        skip_on: Option<PathBuf>,
    }

    impl ManifestVisitor for Collector {
        fn pre_visit_directory(&mut self, path: &LocalPath, _record: &FileRecord) -> VisitOutcome {
            self.calls
                .push(("dir", path.underlying_path().to_path_buf()));
            if self.skip_on.as_deref() == Some(path.underlying_path()) {
                VisitOutcome::SkipSubtree
            } else {
                VisitOutcome::Continue
            }
        }

        fn visit_file(&mut self, path: &LocalPath, _record: &FileRecord) -> VisitOutcome {
            self.calls
                .push(("file", path.underlying_path().to_path_buf()));
            VisitOutcome::Continue
        }
    }

    fn write_manifest(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn walker() -> LocalFileWalker {
        LocalFileWalker::new(LocalPathFactory::detached())
    }

    #[test]
    fn walk_yields_one_call_per_row_in_order() {
        let manifest = write_manifest(&[
            "/scratch/task1",
            "'/w';1;;4096;directory;-;-;-",
            "'/w/a';1;;10;regular file;-;-;-",
            "'/w/b';1;;20;regular file;-;-;-",
        ]);
        let mut collector = Collector::default();
        walker()
            .walk(manifest.path(), &mut collector, Path::new("/w"))
            .unwrap();
        assert_eq!(
            collector.calls,
            vec![
                ("dir", PathBuf::from("/w")),
                ("file", PathBuf::from("/w/a")),
                ("file", PathBuf::from("/w/b")),
            ]
        );
    }

    #[test]
    fn skip_subtree_drops_descendants_only() {
        let manifest = write_manifest(&[
            "/scratch/task1",
            "'/w';1;;4096;directory;-;-;-",
            "'/w/a';1;;10;regular file;-;-;-",
            "'/w/sub';1;;4096;directory;-;-;-",
            "'/w/sub/b';1;;20;regular file;-;-;-",
            "'/w/sub/deeper';1;;4096;directory;-;-;-",
            "'/w/sub/deeper/c';1;;30;regular file;-;-;-",
            "'/w/tail';1;;5;regular file;-;-;-",
        ]);
        let mut collector = Collector {
            skip_on: Some(PathBuf::from("/w/sub")),
            ..Collector::default()
        };
        walker()
            .walk(manifest.path(), &mut collector, Path::new("/w"))
            .unwrap();
        assert_eq!(
            collector.calls,
            vec![
                ("dir", PathBuf::from("/w")),
                ("file", PathBuf::from("/w/a")),
                ("dir", PathBuf::from("/w/sub")),
                ("file", PathBuf::from("/w/tail")),
            ]
        );
    }

    #[test]
    fn dangling_symlink_row_visits_as_file() {
        let manifest = write_manifest(&["/scratch/task1", "'/w/dangling';0"]);
        let mut collector = Collector::default();
        walker()
            .walk(manifest.path(), &mut collector, Path::new("/w"))
            .unwrap();
        assert_eq!(
            collector.calls,
            vec![("file", PathBuf::from("/w/dangling"))]
        );
    }

    #[test]
    fn short_form_manifest_walks_with_wall_clock_header() {
        let manifest = write_manifest(&[
            "1709290000",
            "'/w';1;;4096;directory",
            "'/w/out.txt';1;;64;regular file",
        ]);
        let mut collector = Collector::default();
        walker()
            .walk(manifest.path(), &mut collector, Path::new("/w"))
            .unwrap();
        assert_eq!(collector.calls.len(), 2);
    }

    #[test]
    fn malformed_record_is_fatal() {
        let manifest = write_manifest(&["/scratch/task1", "'/w';1;;4096"]);
        let mut collector = Collector::default();
        let result = walker().walk(manifest.path(), &mut collector, Path::new("/w"));
        assert!(result.is_err());
    }

    #[test]
    fn lookup_translates_workdir_to_scan_root() {
        let manifest = write_manifest(&[
            "/scratch/task1",
            "'/scratch/task1/out';1;;4096;directory;-;-;-",
            "'/scratch/task1/out/data.txt';1;;128;regular file;-;-;-",
        ]);
        let found = walker()
            .lookup(
                manifest.path(),
                Path::new("/w/a1/out/data.txt"),
                Path::new("/w/a1"),
            )
            .unwrap()
            .expect("record should match after translation");
        assert_eq!(found.underlying_path(), Path::new("/w/a1/out/data.txt"));
        let attrs = found.attributes().unwrap();
        assert_eq!(attrs.size, 128);
        assert_eq!(attrs.file_type, Some(FileType::RegularFile));
    }

    #[test]
    fn lookup_misses_cleanly() {
        let manifest = write_manifest(&[
            "/scratch/task1",
            "'/scratch/task1/out/data.txt';1;;128;regular file;-;-;-",
        ]);
        let found = walker()
            .lookup(
                manifest.path(),
                Path::new("/w/a1/out/other.txt"),
                Path::new("/w/a1"),
            )
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn lookup_on_empty_manifest_is_none() {
        let manifest = write_manifest(&[]);
        let found = walker()
            .lookup(manifest.path(), Path::new("/w/a1/x"), Path::new("/w/a1"))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn fake_path_substitutes_prefix_textually() {
        assert_eq!(
            fake_path(
                Path::new("/w/a1/out/data.txt"),
                Path::new("/w/a1"),
                Path::new("/scratch/task1"),
            ),
            PathBuf::from("/scratch/task1/out/data.txt")
        );
        // Paths outside the workdir pass through untouched.
        assert_eq!(
            fake_path(
                Path::new("/elsewhere/x"),
                Path::new("/w/a1"),
                Path::new("/scratch/task1"),
            ),
            PathBuf::from("/elsewhere/x")
        );
    }
}
