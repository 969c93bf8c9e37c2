//! Scheduler pod bring-up.
//!
//! Reconciles the scheduler pod (delete terminated, reuse live, create
//! missing), waits for it to leave the waiting phase, and derives the pod
//! DNS URL from its IP.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::pod::{PodOps, PodPhase, SchedulerPodSpec};

/// Pod phase poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ensure the scheduler pod exists and is running; return its IP.
pub(crate) async fn resolve_scheduler_pod(
    pods: &dyn PodOps,
    spec: &SchedulerPodSpec,
    shutdown: &CancellationToken,
) -> ClientResult<String> {
    match pods.phase(&spec.name).await? {
        PodPhase::Terminated => {
            info!(pod = %spec.name, "scheduler pod terminated, recreating");
            pods.delete(&spec.name).await?;
            pods.create(spec).await?;
        }
        PodPhase::Missing => {
            info!(pod = %spec.name, "creating scheduler pod");
            pods.create(spec).await?;
        }
        PodPhase::Running | PodPhase::Waiting => {
            debug!(pod = %spec.name, "reusing scheduler pod");
        }
        PodPhase::Unknown(state) => {
            return Err(ClientError::UnexpectedPodState(state));
        }
    }

    loop {
        if shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        match pods.phase(&spec.name).await? {
            PodPhase::Running => break,
            PodPhase::Waiting | PodPhase::Missing => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            PodPhase::Terminated => {
                return Err(ClientError::UnexpectedPodState("terminated".to_owned()));
            }
            PodPhase::Unknown(state) => {
                return Err(ClientError::UnexpectedPodState(state));
            }
        }
    }

    loop {
        if shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if let Some(ip) = pods.ip(&spec.name).await? {
            return Ok(ip);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Pod DNS URL for a pod IP: dots become dashes under the namespace's pod
/// subdomain.
pub(crate) fn pod_dns_url(ip: &str, namespace: &str, port: u16) -> String {
    format!(
        "http://{}.{namespace}.pod.cluster.local:{port}",
        ip.replace('.', "-")
    )
}

/// Fail fast when the scheduler host does not resolve at all; `reqwest`
/// folds DNS failures into generic connect errors, so the distinction has
/// to be made up front.
pub(crate) async fn require_resolvable(host: &str, port: u16) -> ClientResult<()> {
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => {
            if addrs.next().is_some() {
                Ok(())
            } else {
                Err(ClientError::UnknownHost {
                    host: host.to_owned(),
                })
            }
        }
        Err(_) => Err(ClientError::UnknownHost {
            host: host.to_owned(),
        }),
    }
}
