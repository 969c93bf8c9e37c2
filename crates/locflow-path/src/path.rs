//! The location-aware path type.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as MemoryOrdering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use locflow_client::SchedulerClient;
use locflow_core::{FileLocation, FileLocationUpdate, FileRecord, RetryPolicy, SymlinkSpec};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::either::Either;
use tracing::{debug, warn};

use crate::error::PathResult;
use crate::ftp::{FtpRead, FtpSettings, FtpTransport};
use crate::writable::WritableFile;

/// Per-instance promotion state. Both flags are monotonic false to true.
#[derive(Debug, Default)]
struct PathState {
    downloaded: AtomicBool,
    symlinks_materialised: AtomicBool,
    download_lock: Mutex<()>,
    symlink_lock: Mutex<()>,
}

/// Reader over a local or remote file.
pub type LocalRead = Either<tokio::fs::File, FtpRead>;

/// Where a read resolves to.
enum ReadSource {
    Local,
    Remote(FileLocation),
}

/// Context captured before a mutating operation, consumed by the report
/// step afterwards.
#[derive(Debug)]
pub(crate) struct MutationCtx {
    pub(crate) location: Option<FileLocation>,
    pub(crate) freshly_downloaded: bool,
    pub(crate) mtime_before: Option<SystemTime>,
}

/// A task-visible file path with location-aware I/O.
///
/// Created by the walker factory (or promoted from a plain path); holds a
/// non-owning reference to the run's [`SchedulerClient`]. Paths never
/// outlive the run, so a dead client only happens during teardown, where
/// the path degrades to plain local I/O.
#[derive(Debug, Clone)]
pub struct LocalPath {
    underlying: PathBuf,
    attributes: Option<FileRecord>,
    workdir: Option<PathBuf>,
    client: Weak<SchedulerClient>,
    ftp: FtpTransport,
    retry: RetryPolicy,
    state: Arc<PathState>,
}

impl LocalPath {
    /// Wrap a path, binding it to the run's scheduler client.
    #[must_use]
    pub fn new(
        underlying: impl Into<PathBuf>,
        attributes: Option<FileRecord>,
        workdir: Option<PathBuf>,
        client: Weak<SchedulerClient>,
        ftp: FtpTransport,
    ) -> Self {
        Self {
            underlying: underlying.into(),
            attributes,
            workdir,
            client,
            ftp,
            retry: RetryPolicy::ftp(),
            state: Arc::new(PathState::default()),
        }
    }

    /// Promote a plain path with no scheduler binding. All I/O is local.
    #[must_use]
    pub fn detached(underlying: impl Into<PathBuf>) -> Self {
        Self::new(
            underlying,
            None,
            None,
            Weak::new(),
            FtpTransport::new(
                FtpSettings::default(),
                tokio_util::sync::CancellationToken::new(),
            ),
        )
    }

    /// The wrapped path.
    #[must_use]
    pub fn underlying_path(&self) -> &Path {
        &self.underlying
    }

    /// Manifest attributes attached at creation, if any.
    #[must_use]
    pub fn attributes(&self) -> Option<&FileRecord> {
        self.attributes.as_ref()
    }

    /// The task's original work directory, used for path rewriting.
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    /// Whether the file has been promoted to the local node.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.state.downloaded.load(MemoryOrdering::Acquire)
    }

    /// Whether the owning node's symlinks have been materialised here.
    #[must_use]
    pub fn symlinks_materialised(&self) -> bool {
        self.state
            .symlinks_materialised
            .load(MemoryOrdering::Acquire)
    }

    // ---- reads -----------------------------------------------------------

    /// Open a streaming reader, local or remote depending on the file's
    /// current location.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn reader(&self) -> PathResult<LocalRead> {
        match self.read_source().await? {
            ReadSource::Local => Ok(Either::Left(tokio::fs::File::open(&self.underlying).await?)),
            ReadSource::Remote(location) => {
                Ok(Either::Right(self.open_remote(&location).await?))
            }
        }
    }

    /// Read the raw bytes of the file.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn read_bytes(&self) -> PathResult<Vec<u8>> {
        let mut reader = self.reader().await?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    /// Read the file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors, or invalid UTF-8.
    pub async fn read_to_string(&self) -> PathResult<String> {
        let mut reader = self.reader().await?;
        let mut text = String::new();
        reader.read_to_string(&mut text).await?;
        Ok(text)
    }

    /// Iterate the file line by line.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn lines(&self) -> PathResult<tokio::io::Lines<BufReader<LocalRead>>> {
        Ok(BufReader::new(self.reader().await?).lines())
    }

    /// Iterate the file as a stream of byte chunks.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn byte_stream(&self) -> PathResult<tokio_util::io::ReaderStream<LocalRead>> {
        Ok(tokio_util::io::ReaderStream::new(self.reader().await?))
    }

    /// Run `f` with a reader over the file, releasing the underlying
    /// session on all exit paths.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors, or whatever `f` returns.
    pub async fn with_reader<T, F>(&self, f: F) -> PathResult<T>
    where
        F: AsyncFnOnce(LocalRead) -> std::io::Result<T>,
    {
        let reader = self.reader().await?;
        Ok(f(reader).await?)
    }

    async fn read_source(&self) -> PathResult<ReadSource> {
        let Some(client) = self.client.upgrade() else {
            debug!(path = %self.underlying.display(), "scheduler client gone, reading locally");
            return Ok(ReadSource::Local);
        };
        let absolute = self.absolute().display().to_string();
        let location = client.get_file_location(&absolute).await?;
        self.materialise_symlinks(&location).await;
        if location.same_as_engine || self.is_downloaded() {
            Ok(ReadSource::Local)
        } else {
            Ok(ReadSource::Remote(location))
        }
    }

    /// Acquire an FTP stream, re-querying the daemon address between
    /// attempts to track daemon re-scheduling.
    async fn open_remote(&self, location: &FileLocation) -> PathResult<FtpRead> {
        let mut daemon = location.daemon.clone();
        let mut attempt = 0u32;
        loop {
            match self.ftp.open_stream(&daemon, &location.path).await {
                Ok(reader) => return Ok(reader),
                Err(source) if source.is_transient() && self.retry.has_next(attempt) => {
                    warn!(attempt, daemon = %daemon, error = %source, "FTP acquisition failed, retrying");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    if let Some(fresh) = self.requery_daemon(&location.node).await {
                        daemon = fresh;
                    }
                    attempt += 1;
                }
                Err(source) => return Err(source),
            }
        }
    }

    async fn requery_daemon(&self, node: &str) -> Option<String> {
        let client = self.client.upgrade()?;
        match client.get_daemon_on_node(node).await {
            Ok(daemon) => Some(daemon),
            Err(source) => {
                debug!(node, error = %source, "daemon re-query failed");
                None
            }
        }
    }

    /// Materialise the owning node's symlinks, at most once per instance.
    /// Filesystem failures are warnings, never fatal.
    async fn materialise_symlinks(&self, location: &FileLocation) {
        if self.symlinks_materialised() {
            return;
        }
        let _guard = self.state.symlink_lock.lock().await;
        if self.symlinks_materialised() {
            return;
        }
        for link in &location.symlinks {
            if let Err(source) = materialise_one(link).await {
                warn!(src = %link.src, dst = %link.dst, error = %source, "cannot materialise symlink");
            }
        }
        self.state
            .symlinks_materialised
            .store(true, MemoryOrdering::Release);
    }

    // ---- mutations -------------------------------------------------------

    /// Overwrite the file with `data`, promoting it to the local node first.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn write_bytes(&self, data: &[u8]) -> PathResult<()> {
        self.mutate(async |path: &Path| tokio::fs::write(path, data).await)
            .await
    }

    /// Append `data` to the file, promoting it to the local node first.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn append_bytes(&self, data: &[u8]) -> PathResult<()> {
        self.mutate(async |path: &Path| {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await?;
            file.write_all(data).await?;
            file.flush().await
        })
        .await
    }

    /// Set the file's modification time, promoting it to the local node
    /// first.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn set_modified(&self, time: SystemTime) -> PathResult<()> {
        self.mutate(async |path: &Path| {
            let file = std::fs::File::options().write(true).open(path)?;
            file.set_modified(time)
        })
        .await
    }

    /// Open the file for writing, promoting it to the local node first.
    /// The caller must invoke [`WritableFile::finish`] so the resulting
    /// location gets reported.
    ///
    /// # Errors
    ///
    /// Fails on scheduler, FTP or local IO errors.
    pub async fn open_writable(&self) -> PathResult<WritableFile> {
        let ctx = self.prepare_mutation().await?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.underlying)
            .await?;
        Ok(WritableFile::new(self.clone(), file, ctx))
    }

    async fn mutate<T, F>(&self, op: F) -> PathResult<T>
    where
        F: AsyncFnOnce(&Path) -> std::io::Result<T>,
    {
        let ctx = self.prepare_mutation().await?;
        let value = op(&self.underlying).await?;
        self.report_mutation(ctx).await?;
        Ok(value)
    }

    pub(crate) async fn prepare_mutation(&self) -> PathResult<MutationCtx> {
        let location = match self.client.upgrade() {
            Some(client) => {
                let absolute = self.absolute().display().to_string();
                Some(client.get_file_location(&absolute).await?)
            }
            None => None,
        };
        let mut freshly_downloaded = false;
        if let Some(location) = &location {
            freshly_downloaded = self.download(location).await?;
        }
        let mtime_before = tokio::fs::metadata(&self.underlying)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok());
        Ok(MutationCtx {
            location,
            freshly_downloaded,
            mtime_before,
        })
    }

    /// Promote the file to the local node. No-op when the engine's node
    /// already owns it or a previous promotion completed. Returns whether a
    /// transfer actually ran.
    async fn download(&self, location: &FileLocation) -> PathResult<bool> {
        if location.same_as_engine || self.is_downloaded() {
            return Ok(false);
        }
        let _guard = self.state.download_lock.lock().await;
        if self.is_downloaded() {
            return Ok(false);
        }
        if let Some(parent) = self.underlying.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut daemon = location.daemon.clone();
        let mut attempt = 0u32;
        loop {
            match self
                .ftp
                .fetch_to_file(&daemon, &location.path, &self.underlying)
                .await
            {
                Ok(_) => break,
                Err(source) if source.is_transient() && self.retry.has_next(attempt) => {
                    warn!(attempt, daemon = %daemon, error = %source, "download failed, retrying");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    if let Some(fresh) = self.requery_daemon(&location.node).await {
                        daemon = fresh;
                    }
                    attempt += 1;
                }
                Err(source) => return Err(source),
            }
        }
        self.state.downloaded.store(true, MemoryOrdering::Release);
        debug!(path = %self.underlying.display(), "file promoted to local node");
        Ok(true)
    }

    /// Report the outcome of a mutation: an observed mtime change
    /// overwrites the scheduler's index entry, a fresh download adds a
    /// replica. Both echo the location wrapper id.
    pub(crate) async fn report_mutation(&self, ctx: MutationCtx) -> PathResult<()> {
        let Some(location) = ctx.location else {
            return Ok(());
        };
        let Some(client) = self.client.upgrade() else {
            return Ok(());
        };
        let meta = tokio::fs::metadata(&self.underlying).await?;
        let mtime = meta.modified().ok();
        let changed = match (ctx.mtime_before, mtime) {
            (Some(before), Some(after)) => before != after,
            _ => true,
        };
        if !changed && !ctx.freshly_downloaded {
            return Ok(());
        }
        let update = FileLocationUpdate {
            path: self.absolute().display().to_string(),
            size: meta.len(),
            timestamp: mtime.map(millis_since_epoch).unwrap_or_default(),
            location_wrapper_id: location.location_wrapper_id,
            node: None,
        };
        client.add_file_location(&update, changed).await?;
        Ok(())
    }

    // ---- attributes ------------------------------------------------------

    /// Whether the entry exists, answered from the attached record when
    /// present.
    pub async fn exists(&self) -> bool {
        if let Some(attrs) = &self.attributes {
            return attrs.exists;
        }
        tokio::fs::try_exists(&self.underlying).await.unwrap_or(false)
    }

    /// Whether the entry is a directory, answered from the attached record
    /// when present.
    pub async fn is_directory(&self) -> bool {
        if let Some(attrs) = &self.attributes {
            return attrs.is_directory();
        }
        tokio::fs::metadata(&self.underlying)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    /// Size in bytes, answered from the attached record when present.
    ///
    /// # Errors
    ///
    /// Fails when no record is attached and the file cannot be stat'ed.
    pub async fn size(&self) -> PathResult<u64> {
        if let Some(attrs) = &self.attributes {
            return Ok(attrs.size);
        }
        Ok(tokio::fs::metadata(&self.underlying).await?.len())
    }

    // ---- navigation ------------------------------------------------------

    /// Parent path, still bound to the same client and workdir.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.underlying
            .parent()
            .map(|parent| self.derive(parent.to_path_buf()))
    }

    /// Resolve `other` against this path. An absolute `other` replaces it.
    #[must_use]
    pub fn resolve(&self, other: impl AsRef<Path>) -> Self {
        self.derive(self.underlying.join(other))
    }

    /// Lexically normalize the path (drop `.`, fold `..`).
    #[must_use]
    pub fn normalize(&self) -> Self {
        self.derive(normalize_lexically(&self.underlying))
    }

    /// The relative path between component indices `begin..end`, root
    /// excluded.
    #[must_use]
    pub fn subpath(&self, begin: usize, end: usize) -> Self {
        let relative: PathBuf = self
            .underlying
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .skip(begin)
            .take(end.saturating_sub(begin))
            .collect();
        self.derive(relative)
    }

    /// Absolute form of this path.
    #[must_use]
    pub fn to_absolute(&self) -> Self {
        self.derive(self.absolute())
    }

    /// Filesystem root of the path, if absolute.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.underlying
            .has_root()
            .then(|| PathBuf::from(std::path::MAIN_SEPARATOR_STR))
    }

    /// Final component.
    #[must_use]
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.underlying.file_name()
    }

    /// The `index`-th component, root excluded.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<String> {
        self.underlying
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .nth(index)
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
    }

    /// The real node-local path: the link target from the attached record
    /// when available, otherwise the canonicalized underlying path.
    ///
    /// # Errors
    ///
    /// Fails when no record is attached and canonicalization fails.
    pub async fn to_real_path(&self) -> PathResult<PathBuf> {
        if let Some(real) = self.attributes.as_ref().and_then(|a| a.real_path.clone()) {
            return Ok(real);
        }
        Ok(tokio::fs::canonicalize(&self.underlying).await?)
    }

    fn absolute(&self) -> PathBuf {
        if self.underlying.is_absolute() {
            self.underlying.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&self.underlying))
                .unwrap_or_else(|_| self.underlying.clone())
        }
    }

    fn derive(&self, underlying: PathBuf) -> Self {
        Self {
            underlying,
            attributes: None,
            workdir: self.workdir.clone(),
            client: self.client.clone(),
            ftp: self.ftp.clone(),
            retry: self.retry,
            state: Arc::new(PathState::default()),
        }
    }
}

impl PartialEq for LocalPath {
    fn eq(&self, other: &Self) -> bool {
        self.underlying == other.underlying
    }
}

impl Eq for LocalPath {}

impl PartialOrd for LocalPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.underlying.cmp(&other.underlying)
    }
}

impl PartialEq<Path> for LocalPath {
    fn eq(&self, other: &Path) -> bool {
        self.underlying.as_path() == other
    }
}

impl PartialEq<PathBuf> for LocalPath {
    fn eq(&self, other: &PathBuf) -> bool {
        &self.underlying == other
    }
}

impl std::fmt::Display for LocalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.underlying.display().fmt(f)
    }
}

/// Delete whatever sits at the link source, ensure its parent exists, then
/// place the link.
async fn materialise_one(link: &SymlinkSpec) -> std::io::Result<()> {
    let src = Path::new(&link.src);
    match tokio::fs::symlink_metadata(src).await {
        Ok(meta) => {
            if meta.is_dir() {
                tokio::fs::remove_dir_all(src).await?;
            } else {
                tokio::fs::remove_file(src).await?;
            }
        }
        Err(_) => {
            if let Some(parent) = src.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }
    place_symlink(&link.dst, src).await
}

#[cfg(unix)]
async fn place_symlink(dst: &str, src: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(dst, src).await
}

#[cfg(not(unix))]
async fn place_symlink(_dst: &str, _src: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other(
        "symbolic links are unsupported on this platform",
    ))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last().copied() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(Component::ParentDir),
            },
            other => parts.push(other),
        }
    }
    parts.into_iter().collect()
}

fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
