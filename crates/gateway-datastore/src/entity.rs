//! Binds each `gateway-core` schema type to its collection name and
//! natural-key field, so the async and sync façades in this crate can share
//! one generic `create`/`get`/`update` implementation instead of six
//! hand-written copies per façade (§4.1, Design Note "Two datastore
//! façades").

use gateway_core::schema::collection;
use gateway_core::{HpcSlurmJob, ProcessingStats, UserAccount, Workflow, WorkflowJob, Workspace};

/// A schema type addressable by one natural-key field within one collection.
pub trait Entity {
    const COLLECTION: &'static str;
    const ID_FIELD: &'static str;

    fn id(&self) -> &str;
}

impl Entity for UserAccount {
    const COLLECTION: &'static str = collection::USER_ACCOUNTS;
    const ID_FIELD: &'static str = "user_id";
    fn id(&self) -> &str {
        &self.user_id
    }
}

impl Entity for Workspace {
    const COLLECTION: &'static str = collection::WORKSPACES;
    const ID_FIELD: &'static str = "workspace_id";
    fn id(&self) -> &str {
        &self.workspace_id
    }
}

impl Entity for Workflow {
    const COLLECTION: &'static str = collection::WORKFLOWS;
    const ID_FIELD: &'static str = "workflow_id";
    fn id(&self) -> &str {
        &self.workflow_id
    }
}

impl Entity for WorkflowJob {
    const COLLECTION: &'static str = collection::WORKFLOW_JOBS;
    const ID_FIELD: &'static str = "job_id";
    fn id(&self) -> &str {
        &self.job_id
    }
}

impl Entity for HpcSlurmJob {
    const COLLECTION: &'static str = collection::HPC_SLURM_JOBS;
    const ID_FIELD: &'static str = "workflow_job_id";
    fn id(&self) -> &str {
        &self.workflow_job_id
    }
}

impl Entity for ProcessingStats {
    const COLLECTION: &'static str = collection::PROCESSING_STATS;
    const ID_FIELD: &'static str = "user_id";
    fn id(&self) -> &str {
        &self.user_id
    }
}
