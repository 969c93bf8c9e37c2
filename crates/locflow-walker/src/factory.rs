//! LocalPath construction, bound to the run's scheduler client.

use std::path::PathBuf;
use std::sync::Weak;

use locflow_client::SchedulerClient;
use locflow_core::FileRecord;
use locflow_path::{FtpSettings, FtpTransport, LocalPath};

/// Builds [`LocalPath`]s carrying a non-owning reference to the run's
/// scheduler client.
///
/// The executor installs one factory at run start; the walker is
/// parameterised with it, which keeps path construction injectable for
/// tests.
#[derive(Debug, Clone)]
pub struct LocalPathFactory {
    client: Weak<SchedulerClient>,
    ftp: FtpTransport,
}

impl LocalPathFactory {
    /// Factory bound to a scheduler client.
    #[must_use]
    pub fn new(client: Weak<SchedulerClient>, ftp: FtpTransport) -> Self {
        Self { client, ftp }
    }

    /// Factory producing plain local paths; used before the client exists
    /// and in tests.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            client: Weak::new(),
            ftp: FtpTransport::new(
                FtpSettings::default(),
                tokio_util::sync::CancellationToken::new(),
            ),
        }
    }

    /// Wrap a path with optional manifest attributes and the task workdir.
    #[must_use]
    pub fn make(
        &self,
        path: impl Into<PathBuf>,
        attributes: Option<FileRecord>,
        workdir: Option<PathBuf>,
    ) -> LocalPath {
        LocalPath::new(path, attributes, workdir, self.client.clone(), self.ftp.clone())
    }
}
