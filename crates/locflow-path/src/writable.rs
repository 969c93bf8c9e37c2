//! Writable file guard.

use tokio::io::AsyncWriteExt;

use crate::error::PathResult;
use crate::path::{LocalPath, MutationCtx};

/// A file opened for writing through [`LocalPath::open_writable`].
///
/// The guard keeps the promotion context captured before opening; call
/// [`WritableFile::finish`] when done so the resulting location is
/// reported to the scheduler. Dropping the guard without finishing skips
/// the report.
#[derive(Debug)]
pub struct WritableFile {
    path: LocalPath,
    file: tokio::fs::File,
    ctx: MutationCtx,
}

impl WritableFile {
    pub(crate) fn new(path: LocalPath, file: tokio::fs::File, ctx: MutationCtx) -> Self {
        Self { path, file, ctx }
    }

    /// The open file handle.
    #[must_use]
    pub fn file_mut(&mut self) -> &mut tokio::fs::File {
        &mut self.file
    }

    /// Flush and close the file, then report the mutation.
    ///
    /// # Errors
    ///
    /// Fails on flush errors or when the location report is rejected.
    pub async fn finish(self) -> PathResult<()> {
        let Self { path, mut file, ctx } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        path.report_mutation(ctx).await
    }
}
