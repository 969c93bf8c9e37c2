//! FTP data plane client.
//!
//! Daemons speak plain RFC-959; transfers run in passive mode with binary
//! type. The protocol implementation is blocking, so every session lives on
//! a `spawn_blocking` worker; streamed reads hand chunks to the async side
//! over a bounded channel.

use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{PathError, PathResult};

/// Transfer chunk size.
const CHUNK: usize = 8 * 1024;

/// Credentials and limits for the per-node daemons.
#[derive(Debug, Clone)]
pub struct FtpSettings {
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Connect timeout; `None` leaves the OS default in place.
    pub connect_timeout: Option<Duration>,
}

impl FtpSettings {
    /// Credentials from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &locflow_config::FtpConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl Default for FtpSettings {
    /// The fixed daemon credentials.
    fn default() -> Self {
        Self {
            user: "ftp".to_owned(),
            password: "nextflowClient".to_owned(),
            connect_timeout: None,
        }
    }
}

/// Streaming reader over a remote file.
pub type FtpRead = StreamReader<ReceiverStream<std::io::Result<Bytes>>, Bytes>;

/// One-shot FTP operations against a daemon address.
#[derive(Debug, Clone)]
pub struct FtpTransport {
    settings: FtpSettings,
    shutdown: CancellationToken,
}

impl FtpTransport {
    /// Create a transport with the given credentials and shutdown signal.
    #[must_use]
    pub fn new(settings: FtpSettings, shutdown: CancellationToken) -> Self {
        Self { settings, shutdown }
    }

    /// Download `remote` from `daemon` into the local file `dest`, copying
    /// in fixed-size chunks. Returns the number of bytes written.
    ///
    /// Single attempt; the caller owns the retry/re-query loop.
    ///
    /// # Errors
    ///
    /// Fails on any FTP or local IO error, or when shutdown fires.
    pub async fn fetch_to_file(
        &self,
        daemon: &str,
        remote: &str,
        dest: &Path,
    ) -> PathResult<u64> {
        let settings = self.settings.clone();
        let shutdown = self.shutdown.clone();
        let daemon = daemon.to_owned();
        let remote = remote.to_owned();
        let target = dest.to_owned();

        let copied = tokio::task::spawn_blocking(move || -> PathResult<u64> {
            let mut ftp = open_session(&settings, &daemon)?;
            let mut stream = ftp.retr_as_stream(&remote)?;
            let mut file = std::fs::File::create(&target)?;
            let mut buffer = [0u8; CHUNK];
            let mut copied = 0u64;
            loop {
                if shutdown.is_cancelled() {
                    return Err(PathError::Cancelled);
                }
                let n = stream.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                file.write_all(&buffer[..n])?;
                copied += n as u64;
            }
            file.flush()?;
            ftp.finalize_retr_stream(stream)?;
            let _ = ftp.quit();
            Ok(copied)
        })
        .await
        .map_err(|join| PathError::Worker(join.to_string()))??;

        debug!(bytes = copied, dest = %dest.display(), "file fetched from daemon");
        Ok(copied)
    }

    /// Open a streaming read over `remote` on `daemon`.
    ///
    /// Session setup happens before this returns, so connection failures are
    /// visible to the caller's retry loop; transfer failures surface through
    /// the returned reader. The session is closed when the transfer ends or
    /// the reader is dropped.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot be established or the file cannot be
    /// retrieved.
    pub async fn open_stream(&self, daemon: &str, remote: &str) -> PathResult<FtpRead> {
        let settings = self.settings.clone();
        let daemon = daemon.to_owned();
        let remote_name = remote.to_owned();

        let (mut ftp, stream) =
            tokio::task::spawn_blocking(move || open_retr(&settings, &daemon, &remote_name))
                .await
                .map_err(|join| PathError::Worker(join.to_string()))??;

        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(8);
        let shutdown = self.shutdown.clone();
        tokio::task::spawn_blocking(move || {
            let mut stream = stream;
            let mut buffer = [0u8; CHUNK];
            let result: std::io::Result<()> = loop {
                if shutdown.is_cancelled() {
                    break Err(std::io::Error::other("transfer cancelled by shutdown"));
                }
                match stream.read(&mut buffer) {
                    Ok(0) => break Ok(()),
                    Ok(n) => {
                        if tx
                            .blocking_send(Ok(Bytes::copy_from_slice(&buffer[..n])))
                            .is_err()
                        {
                            // Reader dropped; tear the session down quietly.
                            trace!("FTP reader dropped mid-transfer");
                            break Ok(());
                        }
                    }
                    Err(source) => break Err(source),
                }
            };
            match result {
                Ok(()) => {
                    let _ = ftp.finalize_retr_stream(stream);
                    let _ = ftp.quit();
                }
                Err(source) => {
                    let _ = tx.blocking_send(Err(source));
                    let _ = ftp.quit();
                }
            }
        });

        Ok(StreamReader::new(ReceiverStream::new(rx)))
    }
}

/// Establish a session and start retrieving `remote`.
fn open_retr(
    settings: &FtpSettings,
    daemon: &str,
    remote: &str,
) -> PathResult<(FtpStream, impl Read + Send + use<>)> {
    let mut ftp = open_session(settings, daemon)?;
    let stream = ftp.retr_as_stream(remote)?;
    Ok((ftp, stream))
}

/// Connect, authenticate and switch to passive binary mode.
fn open_session(settings: &FtpSettings, daemon: &str) -> PathResult<FtpStream> {
    let mut ftp = match settings.connect_timeout {
        Some(timeout) => {
            let addr = daemon
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| std::io::Error::other("daemon address did not resolve"))?;
            FtpStream::connect_timeout(addr, timeout)?
        }
        None => FtpStream::connect(daemon)?,
    };
    ftp.login(&settings.user, &settings.password)?;
    ftp.set_mode(Mode::Passive);
    ftp.transfer_type(FileType::Binary)?;
    Ok(ftp)
}
