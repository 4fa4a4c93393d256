//! Administrative CLI surface (§6): the normal production entry point
//! (`supervisor`), a standalone single-worker mode for local development
//! (`worker --queue`), and the opt-in `cancel-remote` operation.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "workflow-gateway")]
#[clap(about = "Workflow-execution gateway", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the Broker Supervisor and its worker children
    Supervisor,

    /// Run a single worker standalone, for local development
    Worker {
        /// The queue this worker consumes from
        #[clap(short, long, value_parser)]
        queue: String,
    },

    /// Cancel a remote batch job and mark its WorkflowJob STOPPED
    CancelRemote {
        /// The WorkflowJob whose remote job should be cancelled
        #[clap(long, value_parser)]
        workflow_job_id: String,
    },
}
