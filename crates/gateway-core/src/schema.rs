//! Entity schema shared by the async and sync datastore façades.
//!
//! Kept deliberately free of any datastore-driver types so that both
//! `gateway-datastore`'s async and sync adapters can serialize the same
//! structs against the same collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a [`UserAccount`] plays, which in turn determines which queue
/// ingress routes its workflow jobs onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Admin,
    User,
    Harvester,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: String,
    pub institution_id: String,
    pub email: String,
    pub salt: String,
    pub encrypted_pass: String,
    pub account_type: AccountType,
    pub approved: bool,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub workspace_id: String,
    pub workspace_dir: String,
    #[serde(default = "default_mets_basename")]
    pub mets_basename: String,
    pub page_count: u32,
}

fn default_mets_basename() -> String {
    "mets.xml".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: String,
    pub workflow_script_path: String,
    pub uses_mets_server: bool,
    pub process_forks: u32,
}

/// The authoritative lifecycle state of a [`WorkflowJob`]. Only
/// `gateway-datastore`'s `set_state` is permitted to mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Failed,
    Stopped,
}

impl JobState {
    /// Terminal states never transition again (§3 global invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed | JobState::Stopped)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAILED",
            JobState::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub job_id: String,
    pub workflow_id: String,
    pub workspace_id: String,
    pub job_dir: String,
    pub job_state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpcSlurmJob {
    pub workflow_job_id: String,
    pub remote_job_id: String,
    pub remote_batch_script_path: String,
    pub remote_workspace_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub institution_id: String,
    pub user_id: String,
    pub pages_processed: u64,
    pub successes: u64,
    pub failures: u64,
}

/// The message ingress publishes to either named queue (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub workflow_id: String,
    pub workspace_id: String,
    pub job_id: String,
    pub input_file_grp: String,
}

/// Collection names backing the document store (§6).
pub mod collection {
    pub const USER_ACCOUNTS: &str = "user_accounts";
    pub const WORKSPACES: &str = "workspaces";
    pub const WORKFLOWS: &str = "workflows";
    pub const WORKFLOW_JOBS: &str = "workflow_jobs";
    pub const HPC_SLURM_JOBS: &str = "hpc_slurm_jobs";
    pub const PROCESSING_STATS: &str = "processing_stats";
}

/// Well-known queue names (§6); ingress routes on the caller's [`AccountType`].
pub mod queue {
    pub const HARVESTER: &str = "harvester";
    pub const USER: &str = "user";
}
