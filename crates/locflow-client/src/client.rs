//! The scheduler HTTP client.

use std::sync::OnceLock;

use locflow_config::Config;
use locflow_core::{
    Dag, FileLocation, FileLocationUpdate, RetryPolicy, RunConfig, TaskConfig, TaskHandle,
    TaskStateInfo,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bringup;
use crate::error::{ClientError, ClientResult};
use crate::pod::{PodOps, SchedulerPodSpec};

/// Registration state, guarded by one mutex.
#[derive(Debug, Default)]
struct RegState {
    registered: bool,
    closed: bool,
}

/// DAG streaming progress, guarded by one mutex.
#[derive(Debug, Default)]
struct DagProgress {
    submitted: usize,
}

/// Batch progress, guarded by one mutex.
#[derive(Debug, Default)]
struct BatchProgress {
    tasks_in_batch: u32,
}

/// Client for the in-cluster workflow scheduler.
///
/// One instance is shared by the whole workflow process; every operation is
/// safe under concurrent invocation.
pub struct SchedulerClient {
    http: reqwest::Client,
    namespace: String,
    run_name: String,
    strategy: String,
    batch_size: u32,
    base_url: OnceLock<String>,
    reg: Mutex<RegState>,
    dag: Mutex<DagProgress>,
    batch: Mutex<BatchProgress>,
    bringup_retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl SchedulerClient {
    /// Create a client for a run. The scheduler address is discovered later
    /// during [`SchedulerClient::register`].
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(
        config: &Config,
        namespace: impl Into<String>,
        run_name: impl Into<String>,
        shutdown: CancellationToken,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.scheduler.http_timeout())
            .build()?;
        Ok(Self {
            http,
            namespace: namespace.into(),
            run_name: run_name.into(),
            strategy: config.scheduler.strategy.clone(),
            batch_size: config.batch.size,
            base_url: OnceLock::new(),
            reg: Mutex::new(RegState::default()),
            dag: Mutex::new(DagProgress::default()),
            batch: Mutex::new(BatchProgress::default()),
            bringup_retry: RetryPolicy::scheduler_bringup(),
            shutdown,
        })
    }

    /// Pin the scheduler base URL, skipping pod discovery at registration.
    /// Used when the scheduler is already reachable (and by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = OnceLock::from(base_url.into());
        self
    }

    /// Override the registration retry policy.
    #[must_use]
    pub fn with_bringup_retry(mut self, policy: RetryPolicy) -> Self {
        self.bringup_retry = policy;
        self
    }

    /// Namespace of the run.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the run.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    fn base_url(&self) -> ClientResult<&str> {
        self.base_url
            .get()
            .map(String::as_str)
            .ok_or(ClientError::NotRegistered)
    }

    /// Register the run with the scheduler, bringing the scheduler pod up
    /// if needed, then submit the current DAG snapshot.
    ///
    /// Idempotent: a second call returns without touching the scheduler.
    ///
    /// # Errors
    ///
    /// Unknown scheduler host and unexpected pod states are fatal.
    /// Connection refusal during registration is retried per the bring-up
    /// retry policy.
    pub async fn register(
        &self,
        pods: &dyn PodOps,
        spec: &SchedulerPodSpec,
        mut run: RunConfig,
        dag: &Dag,
    ) -> ClientResult<()> {
        // The lock is held across the whole bring-up so concurrent callers
        // observe a single registration.
        let mut reg = self.reg.lock().await;
        if reg.registered {
            return Ok(());
        }

        if self.base_url.get().is_none() {
            let ip = bringup::resolve_scheduler_pod(pods, spec, &self.shutdown).await?;
            let url = bringup::pod_dns_url(&ip, &self.namespace, spec.container_port);
            info!(url = %url, "scheduler pod resolved");
            let _ = self.base_url.set(url);
        }

        let base = self.base_url()?.to_owned();
        let (host, port) = host_port(&base);
        bringup::require_resolvable(&host, port).await?;

        if run.dns.is_empty() {
            run.dns = base.clone();
        }

        let url = format!(
            "{base}/scheduler/registerScheduler/{}/{}/{}",
            self.namespace, self.run_name, self.strategy
        );
        let mut attempt = 0u32;
        loop {
            let result = self
                .send("registerScheduler", self.http.put(&url).json(&run))
                .await;
            match result {
                Ok(_) => break,
                Err(ClientError::Http(source))
                    if source.is_connect() && self.bringup_retry.has_next(attempt) =>
                {
                    warn!(attempt, "scheduler not accepting connections yet, retrying");
                    tokio::select! {
                        () = self.shutdown.cancelled() => return Err(ClientError::Cancelled),
                        () = tokio::time::sleep(self.bringup_retry.delay(attempt)) => {}
                    }
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
        reg.registered = true;
        drop(reg);

        info!(run = %self.run_name, "run registered with scheduler");
        self.inform_dag_change(dag).await
    }

    /// Close the run on the scheduler. Best effort: failures are logged,
    /// never surfaced. Batch calls after this point are silent no-ops.
    pub async fn close(&self) {
        {
            let mut reg = self.reg.lock().await;
            if reg.closed {
                return;
            }
            reg.closed = true;
        }
        let Ok(base) = self.base_url() else {
            return;
        };
        let url = format!("{base}/scheduler/{}/{}", self.namespace, self.run_name);
        match self.http.delete(&url).send().await {
            Ok(response) => debug!(status = %response.status(), "scheduler closed"),
            Err(source) => debug!(error = %source, "scheduler close failed"),
        }
    }

    /// Register a task with its input/output declarations.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal to the operation.
    pub async fn register_task(&self, task: &TaskConfig) -> ClientResult<TaskHandle> {
        let base = self.base_url()?;
        let url = format!(
            "{base}/scheduler/registerTask/{}/{}",
            self.namespace, self.run_name
        );
        let response = self.send("registerTask", self.http.put(&url).json(task)).await?;
        Ok(response.json().await?)
    }

    /// Query the scheduler-side state of a task.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal to the operation.
    pub async fn task_state(&self, task_id: i64) -> ClientResult<TaskStateInfo> {
        let base = self.base_url()?;
        let url = format!(
            "{base}/scheduler/taskstate/{}/{}/{task_id}",
            self.namespace, self.run_name
        );
        let response = self.send("taskState", self.http.get(&url)).await?;
        Ok(response.json().await?)
    }

    /// Stream any not-yet-submitted tail of the DAG projection.
    ///
    /// Monotone: vertices are submitted exactly once, in order, together
    /// with the edges incident to them. Concurrent callers are serialised.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal; the progress counter is only
    /// advanced after both submissions succeed.
    pub async fn inform_dag_change(&self, dag: &Dag) -> ClientResult<()> {
        let base = self.base_url()?;
        let mut progress = self.dag.lock().await;
        if dag.vertices.len() <= progress.submitted {
            return Ok(());
        }
        let fresh = &dag.vertices[progress.submitted..];
        let uids: Vec<i64> = fresh.iter().map(|v| v.uid).collect();
        let edges = dag.edges_incident_to(&uids);

        let url = format!(
            "{base}/scheduler/DAG/addVertices/{}/{}",
            self.namespace, self.run_name
        );
        self.send("addVertices", self.http.put(&url).json(&fresh)).await?;

        if !edges.is_empty() {
            let url = format!(
                "{base}/scheduler/DAG/addEdges/{}/{}",
                self.namespace, self.run_name
            );
            self.send("addEdges", self.http.put(&url).json(&edges)).await?;
        }

        debug!(
            vertices = fresh.len(),
            edges = edges.len(),
            "DAG tail submitted"
        );
        progress.submitted = dag.vertices.len();
        Ok(())
    }

    /// Open a new submission batch.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal, unless the client is closed, in
    /// which case the call is a silent no-op.
    pub async fn start_batch(&self) -> ClientResult<()> {
        if self.is_closed().await {
            return Ok(());
        }
        let mut batch = self.batch.lock().await;
        batch.tasks_in_batch = 0;
        self.post_start_batch().await
    }

    /// Record one task submission, rolling the batch over when it is full.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal, unless the client is closed, in
    /// which case the call is a silent no-op.
    pub async fn start_submit(&self) -> ClientResult<()> {
        if self.is_closed().await {
            return Ok(());
        }
        let mut batch = self.batch.lock().await;
        batch.tasks_in_batch += 1;
        if batch.tasks_in_batch > self.batch_size {
            self.post_end_batch(self.batch_size).await?;
            self.post_start_batch().await?;
            batch.tasks_in_batch = 1;
        }
        Ok(())
    }

    /// Flush the current batch.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal, unless the client is closed, in
    /// which case the call is a silent no-op.
    pub async fn end_batch(&self) -> ClientResult<()> {
        if self.is_closed().await {
            return Ok(());
        }
        let mut batch = self.batch.lock().await;
        let count = batch.tasks_in_batch;
        self.post_end_batch(count).await?;
        batch.tasks_in_batch = 0;
        Ok(())
    }

    /// Current location of a file, by absolute virtual path.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal to the operation.
    pub async fn get_file_location(&self, path: &str) -> ClientResult<FileLocation> {
        let base = self.base_url()?;
        let url = format!("{base}/file/{}/{}", self.namespace, self.run_name);
        let response = self
            .send(
                "getFileLocation",
                self.http.get(&url).query(&[("path", path)]),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Report a new or changed file location.
    ///
    /// `overwrite` selects the overwrite endpoint, used when the file
    /// mutated locally; plain add reports a fresh replica.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal to the operation.
    pub async fn add_file_location(
        &self,
        update: &FileLocationUpdate,
        overwrite: bool,
    ) -> ClientResult<()> {
        let base = self.base_url()?;
        let mode = if overwrite { "overwrite" } else { "add" };
        let mut url = format!(
            "{base}/file/location/{mode}/{}/{}",
            self.namespace, self.run_name
        );
        if let Some(node) = &update.node {
            url.push('/');
            url.push_str(node);
        }
        self.send("addFileLocation", self.http.post(&url).json(update))
            .await?;
        Ok(())
    }

    /// Address of the FTP daemon on a node.
    ///
    /// # Errors
    ///
    /// Any non-success response is fatal to the operation.
    pub async fn get_daemon_on_node(&self, node: &str) -> ClientResult<String> {
        let base = self.base_url()?;
        let url = format!(
            "{base}/daemon/{}/{}/{node}",
            self.namespace, self.run_name
        );
        let response = self.send("getDaemonOnNode", self.http.get(&url)).await?;
        Ok(response.text().await?.trim().to_owned())
    }

    async fn is_closed(&self) -> bool {
        self.reg.lock().await.closed
    }

    async fn post_start_batch(&self) -> ClientResult<()> {
        let base = self.base_url()?;
        let url = format!(
            "{base}/scheduler/startBatch/{}/{}",
            self.namespace, self.run_name
        );
        self.send("startBatch", self.http.post(&url)).await?;
        Ok(())
    }

    async fn post_end_batch(&self, count: u32) -> ClientResult<()> {
        let base = self.base_url()?;
        let url = format!(
            "{base}/scheduler/endBatch/{}/{}",
            self.namespace, self.run_name
        );
        self.send("endBatch", self.http.post(&url).body(count.to_string()))
            .await?;
        Ok(())
    }

    /// Issue one request, honouring the shutdown signal and turning
    /// non-success statuses into errors.
    async fn send(
        &self,
        op: &'static str,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<reqwest::Response> {
        let response = tokio::select! {
            () = self.shutdown.cancelled() => return Err(ClientError::Cancelled),
            result = request.send() => result?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(op, status = %status, body = %body, "scheduler rejected request");
            return Err(ClientError::Status {
                op,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Split `http://host:port` into host and port.
fn host_port(base_url: &str) -> (String, u16) {
    let trimmed = base_url
        .strip_prefix("http://")
        .or_else(|| base_url.strip_prefix("https://"))
        .unwrap_or(base_url);
    let authority = trimmed.split('/').next().unwrap_or(trimmed);
    match authority.rsplit_once(':') {
        Some((host, port)) => (host.to_owned(), port.parse().unwrap_or(80)),
        None => (authority.to_owned(), 80),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_splits_authority() {
        assert_eq!(
            host_port("http://10-42-0-7.ns.pod.cluster.local:8080"),
            ("10-42-0-7.ns.pod.cluster.local".to_owned(), 8080)
        );
        assert_eq!(host_port("http://localhost"), ("localhost".to_owned(), 80));
        assert_eq!(
            host_port("http://127.0.0.1:9000/extra"),
            ("127.0.0.1".to_owned(), 9000)
        );
    }
}
