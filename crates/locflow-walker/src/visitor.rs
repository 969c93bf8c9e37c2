//! Visitor seam for manifest walks.

use locflow_core::FileRecord;
use locflow_path::LocalPath;

/// Reply from a visitor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Keep walking.
    Continue,
    /// Drop every following record under the current path.
    SkipSubtree,
}

/// Callbacks invoked per manifest record, in manifest order.
///
/// Directory rows always precede their contents, so `SkipSubtree` from
/// [`ManifestVisitor::pre_visit_directory`] suppresses the whole subtree.
pub trait ManifestVisitor {
    /// Called for every directory row.
    fn pre_visit_directory(&mut self, path: &LocalPath, record: &FileRecord) -> VisitOutcome;

    /// Called for every non-directory row.
    fn visit_file(&mut self, path: &LocalPath, record: &FileRecord) -> VisitOutcome;
}
