//! Resource kinds served by slurmrestd
//!
//! Only the fields the client and the CLI care about are modelled; anything
//! else in the payload is ignored on decode. Every field is defaulted so
//! that older protocol versions, which omit some of them, still decode.

use serde::{Deserialize, Serialize};

/// A compute node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub name: String,
    pub address: Option<String>,
    pub state: Vec<String>, // e.g. ["IDLE", "DRAIN"]
    pub reason: Option<String>,
    pub comment: Option<String>,
    pub features: Vec<String>,
    pub partitions: Vec<String>,
    pub cpus: u32,
    pub real_memory: u64, // megabytes
}

impl Node {
    #[must_use]
    pub fn has_state(&self, state: &str) -> bool {
        self.state.iter().any(|s| s.eq_ignore_ascii_case(state))
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.has_state("DRAIN")
    }
}

/// A job as reported by the controller. Jobs are keyed by their numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobInfo {
    pub job_id: u32,
    pub name: String,
    pub user_name: Option<String>,
    pub partition: Option<String>,
    pub job_state: Vec<String>, // e.g. ["RUNNING"]
    pub state_reason: Option<String>,
    pub nodes: Option<String>, // hostlist expression
    pub current_working_directory: Option<String>,
    pub environment: Vec<String>,
    /// Batch script; only sent on submission, never returned by the controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl JobInfo {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.job_state.iter().any(|s| s == "RUNNING")
    }
}

/// A partition (queue)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionInfo {
    pub name: String,
    pub nodes: Option<String>, // hostlist expression
    pub state: Vec<String>,
    pub total_cpus: u32,
    pub total_nodes: u32,
}

/// Liveness of one controller, as reported by the ping endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerPing {
    pub hostname: String,
    pub pinged: String, // "UP" / "DOWN"
    pub responding: bool,
    pub latency: u64, // microseconds
    pub mode: String, // "primary" / "backup"
}

impl ControllerPing {
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.responding || self.pinged.eq_ignore_ascii_case("UP")
    }
}
