//! JSON types exchanged with the remote scheduler.
//!
//! The scheduler is a Java service; its wire contract uses camelCase keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One symlink the owning node asks readers to materialise locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkSpec {
    /// Link path to create.
    pub src: String,
    /// Link target.
    pub dst: String,
}

/// Current location of a file, as answered by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLocation {
    /// Absolute path on the owning node.
    pub path: String,
    /// Name of the owning node.
    pub node: String,
    /// Address of the FTP daemon exposing the owning node's scratch.
    pub daemon: String,
    /// True when the current process's node owns the file.
    pub same_as_engine: bool,
    /// Opaque token echoed back on location updates so the scheduler can
    /// reject stale writes.
    pub location_wrapper_id: i64,
    /// Symlinks to materialise before reading.
    #[serde(default)]
    pub symlinks: Vec<SymlinkSpec>,
}

/// Body of an `addFileLocation` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLocationUpdate {
    /// Absolute path of the file.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, milliseconds since the epoch.
    pub timestamp: i64,
    /// Token from the original [`FileLocation`] answer.
    pub location_wrapper_id: i64,
    /// Owning node override; defaults to the node in the request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

/// One vertex of the workflow DAG projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagVertex {
    /// Display label.
    pub label: String,
    /// Vertex kind (process, operator, ...).
    #[serde(rename = "type")]
    pub vertex_type: String,
    /// Stable identifier; vertices are immutable once submitted.
    pub uid: i64,
}

/// One edge of the workflow DAG projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagEdge {
    /// Display label, usually the channel name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Source vertex uid.
    pub from_uid: i64,
    /// Destination vertex uid.
    pub to_uid: i64,
}

/// Snapshot of the workflow DAG as known to the driver.
///
/// Vertices only ever get appended; the client streams the unsubmitted tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dag {
    /// All vertices, in creation order.
    pub vertices: Vec<DagVertex>,
    /// All edges.
    pub edges: Vec<DagEdge>,
}

impl Dag {
    /// Edges incident to any vertex in `uids`.
    #[must_use]
    pub fn edges_incident_to(&self, uids: &[i64]) -> Vec<DagEdge> {
        self.edges
            .iter()
            .filter(|e| uids.contains(&e.from_uid) || uids.contains(&e.to_uid))
            .cloned()
            .collect()
    }
}

/// Body of a `registerScheduler` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// DNS URL under which the driver itself is reachable.
    pub dns: String,
    /// Workflow-level settings forwarded verbatim to the scheduler.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Body of a `registerTask` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    /// Task name, unique within the run.
    pub name: String,
    /// Declared input files (virtual paths).
    #[serde(default)]
    pub in_files: Vec<String>,
    /// Declared output file names.
    #[serde(default)]
    pub out_files: Vec<String>,
    /// Requested CPUs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    /// Requested memory in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// Additional task settings forwarded verbatim.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Answer to a `registerTask` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Scheduler-assigned task id.
    pub id: i64,
    /// Echoed task name.
    pub name: String,
    /// Additional fields the scheduler may attach.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Answer to a task state query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStateInfo {
    /// Scheduler-side lifecycle state.
    pub state: String,
    /// Additional fields the scheduler may attach.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_location_deserializes_scheduler_answer() {
        let body = r#"{
            "path": "/scratch/node-2/w/x",
            "node": "node-2",
            "daemon": "10.42.0.7:30021",
            "sameAsEngine": false,
            "locationWrapperId": 77,
            "symlinks": [{"src": "/w/x", "dst": "/scratch/node-2/w/x"}]
        }"#;
        let location: FileLocation = serde_json::from_str(body).unwrap();
        assert!(!location.same_as_engine);
        assert_eq!(location.location_wrapper_id, 77);
        assert_eq!(location.symlinks.len(), 1);
    }

    #[test]
    fn file_location_symlinks_default_to_empty() {
        let body = r#"{
            "path": "/w/x",
            "node": "node-1",
            "daemon": "10.42.0.3:30021",
            "sameAsEngine": true,
            "locationWrapperId": 1
        }"#;
        let location: FileLocation = serde_json::from_str(body).unwrap();
        assert!(location.symlinks.is_empty());
    }

    #[test]
    fn update_omits_absent_node() {
        let update = FileLocationUpdate {
            path: "/w/y".into(),
            size: 10,
            timestamp: 1_700_000_000_000,
            location_wrapper_id: 5,
            node: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("node").is_none());
        assert_eq!(json["locationWrapperId"], 5);
    }

    #[test]
    fn vertex_type_uses_wire_key() {
        let vertex = DagVertex {
            label: "align".into(),
            vertex_type: "PROCESS".into(),
            uid: 3,
        };
        let json = serde_json::to_value(&vertex).unwrap();
        assert_eq!(json["type"], "PROCESS");
    }

    #[test]
    fn incident_edges_match_either_endpoint() {
        let dag = Dag {
            vertices: Vec::new(),
            edges: vec![
                DagEdge {
                    label: None,
                    from_uid: 1,
                    to_uid: 2,
                },
                DagEdge {
                    label: Some("ch".into()),
                    from_uid: 2,
                    to_uid: 3,
                },
                DagEdge {
                    label: None,
                    from_uid: 4,
                    to_uid: 5,
                },
            ],
        };
        let incident = dag.edges_incident_to(&[3, 4]);
        assert_eq!(incident.len(), 2);
    }
}
