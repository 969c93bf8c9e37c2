//! Pod lifecycle seam.
//!
//! The executor owns the real Kubernetes client; the scheduler bring-up
//! protocol only needs these four operations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use locflow_config::SchedulerConfig;

use crate::error::ClientResult;

/// Lifecycle phase of the scheduler pod, as far as bring-up cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    /// No pod with the scheduler name exists.
    Missing,
    /// The pod exists but its container has not started yet.
    Waiting,
    /// The pod is running.
    Running,
    /// The pod ran and exited.
    Terminated,
    /// Any other container state; bring-up treats this as fatal.
    Unknown(String),
}

/// Kubernetes pod operations the bring-up protocol consumes.
#[async_trait]
pub trait PodOps: Send + Sync {
    /// Current phase of the named pod.
    async fn phase(&self, pod_name: &str) -> ClientResult<PodPhase>;

    /// Create the scheduler pod from `spec`.
    async fn create(&self, spec: &SchedulerPodSpec) -> ClientResult<()>;

    /// Delete the named pod.
    async fn delete(&self, pod_name: &str) -> ClientResult<()>;

    /// Cluster IP of the named pod, once assigned.
    async fn ip(&self, pod_name: &str) -> ClientResult<Option<String>>;
}

/// Fully rendered scheduler pod spec handed to [`PodOps::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPodSpec {
    /// Pod name.
    pub name: String,
    /// Container image.
    pub image: String,
    /// Requested CPUs.
    pub cpus: u32,
    /// Requested memory, Kubernetes quantity syntax.
    pub memory: String,
    /// Image pull policy.
    pub image_pull_policy: String,
    /// Service account, if any.
    pub service_account: Option<String>,
    /// Node selector labels.
    pub node_selector: BTreeMap<String, String>,
    /// Host mounts as `(host_path, mount_path)` pairs.
    pub host_mounts: Vec<(String, String)>,
    /// Volume claims as `(claim_name, mount_path)` pairs.
    pub volume_claims: Vec<(String, String)>,
    /// Optional uid for the pod security context.
    pub run_as_user: Option<i64>,
    /// Container port.
    pub container_port: u16,
    /// Environment passed to the scheduler container.
    pub env: Vec<(String, String)>,
}

impl SchedulerPodSpec {
    /// Render the pod spec for a run.
    #[must_use]
    pub fn render(config: &SchedulerConfig, scheduler_name: &str) -> Self {
        Self {
            name: config.pod_name.clone(),
            image: config.image.clone(),
            cpus: config.cpus,
            memory: config.memory.clone(),
            image_pull_policy: config.image_pull_policy.clone(),
            service_account: config.service_account.clone(),
            node_selector: config.node_selector.clone(),
            host_mounts: config
                .host_mounts
                .iter()
                .map(|m| (m.host_path.clone(), m.mount_path.clone()))
                .collect(),
            volume_claims: config
                .volume_claims
                .iter()
                .map(|c| (c.claim_name.clone(), c.mount_path.clone()))
                .collect(),
            run_as_user: config.run_as_user,
            container_port: config.container_port,
            env: vec![
                ("SCHEDULER_NAME".to_owned(), scheduler_name.to_owned()),
                ("AUTOCLOSE".to_owned(), config.autoclose.to_string()),
            ],
        }
    }
}
