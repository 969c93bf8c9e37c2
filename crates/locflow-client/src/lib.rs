//! HTTP client for the in-cluster workflow scheduler.
//!
//! The [`SchedulerClient`] registers the run, streams the DAG projection
//! incrementally, registers tasks, coordinates batched submissions and
//! queries/reports file locations. Pod lifecycle operations go through the
//! [`PodOps`] seam so the Kubernetes client stays an external collaborator.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod bringup;
mod client;
pub mod error;
pub mod pod;

pub use client::SchedulerClient;
pub use error::{ClientError, ClientResult};
pub use pod::{PodOps, PodPhase, SchedulerPodSpec};
