//! End-to-end tests of location-aware reads, FTP fetches and the
//! download-on-write promotion protocol, against in-process HTTP and FTP
//! peers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use locflow_client::SchedulerClient;
use locflow_config::loader;
use locflow_path::{FtpSettings, FtpTransport, LocalPath};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

type Log = Arc<Mutex<Vec<String>>>;

/// One request as seen by the mock scheduler.
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    body: String,
}

type HttpLog = Arc<Mutex<Vec<Recorded>>>;

// ---- mock scheduler --------------------------------------------------------

async fn spawn_scheduler(location_body: String) -> (String, HttpLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let log: HttpLog = Arc::new(Mutex::new(Vec::new()));
    let server_log = Arc::clone(&log);
    let body = Arc::new(location_body);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let log = Arc::clone(&server_log);
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                while let Some(request) = read_request(&mut socket).await {
                    let response_body = if request.method == "GET" && request.path.contains("/file/")
                    {
                        body.as_str()
                    } else {
                        ""
                    };
                    log.lock().unwrap().push(request);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{response_body}",
                        response_body.len()
                    );
                    if socket.write_all(response.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (base, log)
}

/// Read one HTTP/1.1 request (head + content-length body) off the socket.
async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_owned();
    let path = parts.next()?.to_owned();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(Recorded {
        method,
        path,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

// ---- mock FTP daemon -------------------------------------------------------

async fn spawn_daemon(content: Vec<u8>) -> (String, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let server_log = Arc::clone(&log);
    let content = Arc::new(content);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_ftp(
                socket,
                Arc::clone(&content),
                Arc::clone(&server_log),
            ));
        }
    });

    (addr, log)
}

async fn serve_ftp(socket: TcpStream, content: Arc<Vec<u8>>, log: Log) {
    let (read_half, mut control) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    control.write_all(b"220 locflow test daemon\r\n").await.unwrap();

    let mut data_listener: Option<TcpListener> = None;
    while let Ok(Some(line)) = lines.next_line().await {
        log.lock().unwrap().push(line.clone());
        let command = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        match command.as_str() {
            "USER" => control.write_all(b"331 password required\r\n").await.unwrap(),
            "PASS" => control.write_all(b"230 logged in\r\n").await.unwrap(),
            "TYPE" => control.write_all(b"200 type set\r\n").await.unwrap(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                let reply = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    port / 256,
                    port % 256
                );
                data_listener = Some(listener);
                control.write_all(reply.as_bytes()).await.unwrap();
            }
            "RETR" => {
                let Some(listener) = data_listener.take() else {
                    control.write_all(b"425 use PASV first\r\n").await.unwrap();
                    continue;
                };
                control
                    .write_all(b"150 opening data connection\r\n")
                    .await
                    .unwrap();
                if let Ok((mut data, _)) = listener.accept().await {
                    data.write_all(&content).await.unwrap();
                    data.shutdown().await.unwrap();
                }
                control
                    .write_all(b"226 transfer complete\r\n")
                    .await
                    .unwrap();
            }
            "QUIT" => {
                let _ = control.write_all(b"221 bye\r\n").await;
                break;
            }
            _ => control.write_all(b"502 not implemented\r\n").await.unwrap(),
        }
    }
}

// ---- fixtures --------------------------------------------------------------

fn location_json(path: &str, daemon: &str, same_as_engine: bool, symlinks: &str) -> String {
    format!(
        r#"{{
            "path": "{path}",
            "node": "node-2",
            "daemon": "{daemon}",
            "sameAsEngine": {same_as_engine},
            "locationWrapperId": 7,
            "symlinks": {symlinks}
        }}"#
    )
}

fn client_for(base: &str) -> Arc<SchedulerClient> {
    let config = loader::load(None).unwrap();
    Arc::new(
        SchedulerClient::new(&config, "wf-ns", "run-1", CancellationToken::new())
            .unwrap()
            .with_base_url(base),
    )
}

fn bound_path(underlying: &std::path::Path, client: &Arc<SchedulerClient>) -> LocalPath {
    LocalPath::new(
        underlying,
        None,
        None,
        Arc::downgrade(client),
        FtpTransport::new(FtpSettings::default(), CancellationToken::new()),
    )
}

// ---- tests -----------------------------------------------------------------

#[tokio::test]
async fn same_as_engine_reads_locally_without_ftp() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("x");
    tokio::fs::write(&file, b"engine-local bytes").await.unwrap();

    // Daemon address points at a dead port; any FTP attempt would fail.
    let body = location_json(file.to_str().unwrap(), "127.0.0.1:1", true, "[]");
    let (base, http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = bound_path(&file, &client);
    assert_eq!(path.read_bytes().await.unwrap(), b"engine-local bytes");

    let log = http_log.lock().unwrap();
    assert!(log.iter().any(|r| r.path.contains("/file/")));
}

#[tokio::test]
async fn remote_read_streams_over_ftp() {
    let payload = b"remote payload, fetched over the wire".to_vec();
    let (daemon, ftp_log) = spawn_daemon(payload.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("x");
    let body = location_json("/scratch/node-2/w/x", &daemon, false, "[]");
    let (base, _http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = bound_path(&file, &client);
    assert_eq!(path.read_bytes().await.unwrap(), payload);

    // Reads never promote: nothing was written locally.
    assert!(!path.is_downloaded());
    assert!(!tokio::fs::try_exists(&file).await.unwrap());

    let log = ftp_log.lock().unwrap();
    assert!(log.iter().any(|l| l == "USER ftp"));
    assert!(log.iter().any(|l| l == "PASS nextflowClient"));
    assert!(log.iter().any(|l| l == "RETR /scratch/node-2/w/x"));
    assert!(log.iter().any(|l| l == "QUIT"));
}

#[tokio::test]
async fn remote_lines_stream_over_ftp() {
    let (daemon, _ftp_log) = spawn_daemon(b"alpha\nbeta\ngamma\n".to_vec()).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("rows.txt");
    let body = location_json("/scratch/node-2/rows.txt", &daemon, false, "[]");
    let (base, _http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = bound_path(&file, &client);
    let mut lines = path.lines().await.unwrap();
    let mut collected = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        collected.push(line);
    }
    assert_eq!(collected, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn mutation_downloads_then_reports_overwrite() {
    let payload = b"original remote content".to_vec();
    let (daemon, _ftp_log) = spawn_daemon(payload.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("w").join("y");
    let body = location_json("/scratch/node-2/w/y", &daemon, false, "[]");
    let (base, http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = bound_path(&file, &client);
    // A mutating operation promotes the file first.
    path.set_modified(SystemTime::now() + Duration::from_secs(120))
        .await
        .unwrap();

    assert!(path.is_downloaded());
    assert_eq!(tokio::fs::read(&file).await.unwrap(), payload);

    let log = http_log.lock().unwrap();
    let reports: Vec<&Recorded> = log
        .iter()
        .filter(|r| r.path.contains("/file/location/"))
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].method, "POST");
    assert!(reports[0].path.contains("/file/location/overwrite/wf-ns/run-1"));
    // The update echoes the wrapper id handed out by the location answer.
    let sent: serde_json::Value = serde_json::from_str(&reports[0].body).unwrap();
    assert_eq!(sent["locationWrapperId"], 7);
}

#[tokio::test]
async fn fresh_download_without_mtime_change_reports_add() {
    let (daemon, _ftp_log) = spawn_daemon(b"content".to_vec()).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("z");
    let body = location_json("/scratch/node-2/z", &daemon, false, "[]");
    let (base, http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = bound_path(&file, &client);
    // A no-op mutation: nothing is written, so the mtime stays put, but the
    // file was just promoted and the new replica still gets reported.
    let writable = path.open_writable().await.unwrap();
    writable.finish().await.unwrap();

    let log = http_log.lock().unwrap();
    let reports: Vec<&Recorded> = log
        .iter()
        .filter(|r| r.path.contains("/file/location/"))
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].path.contains("/file/location/add/wf-ns/run-1"));
}

#[tokio::test]
async fn repeated_mutations_download_at_most_once() {
    let (daemon, ftp_log) = spawn_daemon(b"seed".to_vec()).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("counter");
    let body = location_json("/scratch/node-2/counter", &daemon, false, "[]");
    let (base, _http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = bound_path(&file, &client);
    path.append_bytes(b"-1").await.unwrap();
    path.append_bytes(b"-2").await.unwrap();

    assert_eq!(tokio::fs::read(&file).await.unwrap(), b"seed-1-2");
    let retrievals = ftp_log
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.starts_with("RETR"))
        .count();
    assert_eq!(retrievals, 1);
}

#[tokio::test]
async fn symlinks_materialise_once_under_concurrent_reads() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("scratch").join("data");
    tokio::fs::create_dir_all(target.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&target, b"shared").await.unwrap();

    let link = dir.path().join("staged").join("data");
    let symlinks = format!(
        r#"[{{"src": "{}", "dst": "{}"}}]"#,
        link.display(),
        target.display()
    );
    let body = location_json(target.to_str().unwrap(), "127.0.0.1:1", true, &symlinks);
    let (base, _http_log) = spawn_scheduler(body).await;
    let client = client_for(&base);

    let path = Arc::new(bound_path(&target, &client));
    let mut joins = Vec::new();
    for _ in 0..8 {
        let path = Arc::clone(&path);
        joins.push(tokio::spawn(async move { path.read_bytes().await }));
    }
    for join in joins {
        assert_eq!(join.await.unwrap().unwrap(), b"shared");
    }

    assert!(path.symlinks_materialised());
    let meta = tokio::fs::symlink_metadata(&link).await.unwrap();
    assert!(meta.is_symlink());
    assert_eq!(tokio::fs::read(&link).await.unwrap(), b"shared");
}
