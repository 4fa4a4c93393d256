//! Per-queue Worker (§4.6): binds the blocking datastore façade, the bus
//! consumer, the connector and the executor/transfer collaborators, and
//! drives one job at a time through the state machine.

use std::path::Path;

use gateway_bus::{Consumer, Delivery};
use gateway_connector::Connector;
use gateway_core::{
    Config, GatewayResult, HpcSlurmJob, JobState, QueueMessage, Workflow, WorkflowJob, Workspace,
};
use gateway_datastore::SyncDatastore;
use gateway_remote::{pack_and_put_workspace, put_batch_script, Executor, JobSpec};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

const BATCH_SCRIPT_RESOURCE_DIR: &str = "resources/batch_scripts";
const BATCH_SCRIPT_NAME: &str = "run_ocr_workflow.sh";
const TEMPDIR_PREFIX: &str = "workflow-gateway-";

pub struct Worker {
    queue: String,
    datastore: SyncDatastore,
    connector: Connector,
    consumer: Consumer,
}

impl Worker {
    pub async fn bind(queue: &str, config: &Config) -> GatewayResult<Self> {
        let datastore = SyncDatastore::connect(&config.datastore_uri, "workflow_gateway")?;
        let connector = Connector::new(config)?;
        let consumer_tag = format!("worker-{queue}-{}", std::process::id());
        let consumer = Consumer::bind(&config.broker_uri, queue, &consumer_tag).await?;

        Ok(Self {
            queue: queue.to_string(),
            datastore,
            connector,
            consumer,
        })
    }

    /// The consume loop (§4.6): becomes its own session (and process-group)
    /// leader via `setsid`, installs termination-signal handlers, then
    /// watches for the resulting shutdown signal between message-processing
    /// steps rather than pre-empting an in-flight step.
    pub async fn run(&mut self) -> GatewayResult<()> {
        nix::unistd::setsid().map_err(|e| anyhow::anyhow!("failed to become session leader: {e}"))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        install_signal_watcher(shutdown_tx);

        loop {
            if *shutdown_rx.borrow() {
                info!(queue = %self.queue, "worker: shutdown requested, closing consumer");
                self.consumer.close().await?;
                return Ok(());
            }

            tokio::select! {
                _ = shutdown_rx_changed(&shutdown_rx) => continue,
                next = self.consumer.next() => {
                    match next? {
                        Some(delivery) => {
                            if let Err(error) = self.handle_delivery(delivery, &shutdown_rx).await {
                                error!(queue = %self.queue, %error, "worker: unrecoverable error handling delivery");
                            }
                        }
                        None => {
                            info!(queue = %self.queue, "worker: bus channel closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    #[instrument(skip(self, delivery, shutdown_rx), fields(queue = %self.queue))]
    async fn handle_delivery(
        &mut self,
        delivery: Delivery,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> GatewayResult<()> {
        // Step 1: `has_in_flight` is true for the duration of this function;
        // the delivery is held (not yet acked) until every step completes.
        let message: QueueMessage = match delivery.parse() {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "worker: malformed payload, acking as permanent failure");
                delivery.ack().await?;
                return Ok(());
            }
        };

        if *shutdown_rx.borrow() {
            return self.fail_and_ack(delivery, &message.job_id).await;
        }

        let (workflow, workspace) = match self.read_records(&message) {
            Ok(records) => records,
            Err(error) => {
                warn!(job_id = %message.job_id, %error, "worker: failed to read job records");
                return self.fail_and_ack(delivery, &message.job_id).await;
            }
        };

        if *shutdown_rx.borrow() {
            return self.fail_and_ack(delivery, &message.job_id).await;
        }

        let resource_dir = Path::new(BATCH_SCRIPT_RESOURCE_DIR);
        let remote_batch_script_path =
            match put_batch_script(&mut self.connector, resource_dir, BATCH_SCRIPT_NAME).await {
                Ok(path) => path,
                Err(error) => {
                    warn!(job_id = %message.job_id, %error, "worker: failed to stage batch script");
                    return self.fail_and_ack(delivery, &message.job_id).await;
                }
            };

        let remote_workspace_root = match pack_and_put_workspace(
            &mut self.connector,
            Path::new(&workspace.workspace_dir),
            &message.job_id,
            Path::new(&workflow.workflow_script_path),
            TEMPDIR_PREFIX,
        )
        .await
        {
            Ok(root) => root,
            Err(error) => {
                warn!(job_id = %message.job_id, %error, "worker: failed to stage workspace");
                return self.fail_and_ack(delivery, &message.job_id).await;
            }
        };

        if *shutdown_rx.borrow() {
            return self.fail_and_ack(delivery, &message.job_id).await;
        }

        let spec = JobSpec {
            partition: "batch".to_string(),
            deadline: "24:00:00".to_string(),
            log_path: self.connector.cluster_paths().job_log_path(&message.job_id),
            cpus: 4,
            ram_gb: 16,
            qos: "normal".to_string(),
            inner_script: workflow.workflow_script_path.clone(),
            slurm_workspaces_dir: self.connector.cluster_paths().slurm_workspaces_dir.clone(),
            workflow_job_id: message.job_id.clone(),
            nextflow_script_id: workflow.workflow_id.clone(),
            input_file_grp: message.input_file_grp.clone(),
            workspace_id: message.workspace_id.clone(),
            mets_basename: workspace.mets_basename.clone(),
            process_forks: workflow.process_forks,
            page_count: workspace.page_count,
            uses_mets_server: workflow.uses_mets_server,
            file_groups_to_remove: String::new(),
        };

        let remote_job_id = {
            let mut executor = Executor::new(&mut self.connector);
            match executor.submit(&spec).await {
                Ok(id) => id,
                Err(error) => {
                    warn!(job_id = %message.job_id, %error, "worker: submission failed");
                    return self.fail_and_ack(delivery, &message.job_id).await;
                }
            }
        };

        let remote_job = HpcSlurmJob {
            workflow_job_id: message.job_id.clone(),
            remote_job_id: remote_job_id.to_string(),
            remote_batch_script_path,
            remote_workspace_path: format!("{remote_workspace_root}/{}", message.job_id),
        };
        if let Err(error) = self.datastore.create(&remote_job) {
            warn!(job_id = %message.job_id, %error, "worker: failed to persist remote job record");
            return self.fail_and_ack(delivery, &message.job_id).await;
        }

        if let Err(error) = self
            .datastore
            .set_job_state(&message.job_id, JobState::Running)
        {
            warn!(job_id = %message.job_id, %error, "worker: failed to transition job to RUNNING");
            return self.fail_and_ack(delivery, &message.job_id).await;
        }

        delivery.ack().await?;
        info!(job_id = %message.job_id, remote_job_id, "worker: job submitted and running");
        Ok(())
    }

    fn read_records(&self, message: &QueueMessage) -> GatewayResult<(Workflow, Workspace)> {
        let _job: WorkflowJob = self.datastore.get(&message.job_id)?;
        let workflow: Workflow = self.datastore.get(&message.workflow_id)?;
        let workspace: Workspace = self.datastore.get(&message.workspace_id)?;
        Ok((workflow, workspace))
    }

    /// Marks the job FAILED and acks regardless of whether the transition
    /// itself succeeds (§4.6 step 2/3, §7).
    async fn fail_and_ack(&self, delivery: Delivery, job_id: &str) -> GatewayResult<()> {
        if let Err(error) = self.datastore.set_job_state(job_id, JobState::Failed) {
            warn!(job_id, %error, "worker: failed to mark job FAILED");
        }
        delivery.ack().await
    }
}

async fn shutdown_rx_changed(rx: &watch::Receiver<bool>) {
    let mut rx = rx.clone();
    let _ = rx.changed().await;
}

/// Installs SIGINT/SIGTERM handlers that flip the shutdown watch; the
/// consume loop checks it between steps of the per-message algorithm rather
/// than pre-empting an in-flight await, so bookkeeping already underway
/// always finishes before exit (§4.6, Design Note "Signal handling vs.
/// in-flight messages").
fn install_signal_watcher(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(error) => {
                error!(%error, "worker: failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(error) => {
                error!(%error, "worker: failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        info!("worker: termination signal received");
        let _ = shutdown_tx.send(true);
    });
}
