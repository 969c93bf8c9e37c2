//! Typed configuration sections.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Remote scheduler pod and HTTP settings.
    pub scheduler: SchedulerConfig,
    /// Task submission batching.
    pub batch: BatchConfig,
    /// FTP data plane credentials.
    pub ftp: FtpConfig,
    /// Node-local scratch storage.
    pub storage: StorageConfig,
}

/// Scheduler pod and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Name of the scheduler pod.
    pub pod_name: String,
    /// Container image.
    pub image: String,
    /// Port the scheduler listens on.
    pub container_port: u16,
    /// Requested CPUs.
    pub cpus: u32,
    /// Requested memory, Kubernetes quantity syntax.
    pub memory: String,
    /// Image pull policy.
    pub image_pull_policy: String,
    /// Scheduling strategy announced at registration.
    pub strategy: String,
    /// Whether the scheduler should shut itself down when the run closes.
    pub autoclose: bool,
    /// Timeout applied to every scheduler HTTP request, in seconds.
    pub http_timeout_secs: u64,
    /// Service account the pod runs under.
    #[serde(default)]
    pub service_account: Option<String>,
    /// Node selector labels.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    /// Host directories mounted into the pod.
    #[serde(default)]
    pub host_mounts: Vec<HostMount>,
    /// Persistent volume claims mounted into the pod.
    #[serde(default)]
    pub volume_claims: Vec<VolumeClaim>,
    /// Optional uid for the pod security context.
    #[serde(default)]
    pub run_as_user: Option<i64>,
}

impl SchedulerConfig {
    /// HTTP request timeout as a [`Duration`].
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// A host directory mounted into the scheduler pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostMount {
    /// Path on the node.
    pub host_path: String,
    /// Path inside the container.
    pub mount_path: String,
}

/// A persistent volume claim mounted into the scheduler pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeClaim {
    /// Claim name.
    pub claim_name: String,
    /// Path inside the container.
    pub mount_path: String,
}

/// Task submission batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum number of task submissions per batch.
    pub size: u32,
}

/// FTP data plane credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FtpConfig {
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Connect timeout in seconds; unset means the OS default.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl FtpConfig {
    /// Connect timeout as a [`Duration`], if configured.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Node-local scratch storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root of the node-local scratch area shared through the daemons.
    pub local_root: PathBuf,
}
