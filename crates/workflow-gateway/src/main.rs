mod cli;
mod logging;
mod supervisor;
mod worker;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use gateway_connector::Connector;
use gateway_core::{Config, JobState};
use gateway_datastore::SyncDatastore;
use gateway_remote::Executor;
use supervisor::Supervisor;
use worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(config.log_format);

    let cli = Cli::parse();

    match cli.command {
        Command::Supervisor => run_supervisor(&config)?,
        Command::Worker { queue } => run_worker(&queue, &config).await?,
        Command::CancelRemote { workflow_job_id } => {
            cancel_remote(&workflow_job_id, &config).await?
        }
    }

    Ok(())
}

fn run_supervisor(_config: &Config) -> Result<()> {
    // Each spawned worker child loads its own `Config::from_env` independently
    // (separate OS process); the supervisor only needs the queue names.
    let queues = vec![
        gateway_core::schema::queue::HARVESTER.to_string(),
        gateway_core::schema::queue::USER.to_string(),
    ];
    let mut supervisor = Supervisor::new(queues);
    supervisor.run()?;
    Ok(())
}

async fn run_worker(queue: &str, config: &Config) -> Result<()> {
    let mut worker = Worker::bind(queue, config).await?;
    worker.run().await?;
    Ok(())
}

/// The opt-in administrative operation (§4.4, §6, Design Note "Orphaned
/// remote jobs"): issues the cluster's cancellation command and marks the
/// local record STOPPED. Never invoked automatically.
async fn cancel_remote(workflow_job_id: &str, config: &Config) -> Result<()> {
    let datastore = SyncDatastore::connect(&config.datastore_uri, "workflow_gateway")?;
    let remote_job: gateway_core::HpcSlurmJob = datastore.get(workflow_job_id)?;
    let remote_job_id: u64 = remote_job
        .remote_job_id
        .parse()
        .map_err(|_| anyhow::anyhow!("stored remote_job_id is not numeric"))?;

    let mut connector = Connector::new(config)?;
    let mut executor = Executor::new(&mut connector);
    executor.cancel_remote(remote_job_id).await?;

    datastore.set_job_state(workflow_job_id, JobState::Stopped)?;
    tracing::info!(workflow_job_id, remote_job_id, "cancel-remote: operator cancelled job");
    Ok(())
}
