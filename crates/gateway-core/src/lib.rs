//! Shared schema, error taxonomy, state classification and configuration
//! for the workflow-execution gateway. Depended on by every other crate in
//! this workspace so that the async and sync datastore façades, the bus
//! client, the connector and the executor all agree on one vocabulary.

pub mod config;
pub mod error;
pub mod schema;
pub mod state;

pub use config::{ClusterPaths, Config, LogFormat};
pub use error::{GatewayError, GatewayResult};
pub use schema::{
    AccountType, HpcSlurmJob, JobState, ProcessingStats, QueueMessage, UserAccount, Workflow,
    WorkflowJob, Workspace,
};
pub use state::{classify_state, Classification, StateTag};
