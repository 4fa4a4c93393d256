//! Remote Job Executor (§4.4): submits batch jobs, polls and classifies
//! their scheduler state, and exposes the opt-in administrative
//! cancellation operation.

use std::time::Duration;

use gateway_connector::RemoteOps;
use gateway_core::{classify_state, Classification, GatewayError, GatewayResult, StateTag};
use tracing::{info, instrument, warn};

use crate::parse::{parse_state_line, parse_submit_output, ParsedState};

/// Positional arguments to the cluster's submission wrapper, in the exact
/// order given in §4.4/§6.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub partition: String,
    pub deadline: String,
    pub log_path: String,
    pub cpus: u32,
    pub ram_gb: u32,
    pub qos: String,
    pub inner_script: String,
    pub slurm_workspaces_dir: String,
    pub workflow_job_id: String,
    pub nextflow_script_id: String,
    pub input_file_grp: String,
    pub workspace_id: String,
    pub mets_basename: String,
    pub process_forks: u32,
    pub page_count: u32,
    pub uses_mets_server: bool,
    pub file_groups_to_remove: String,
}

/// Retry policy for [`Executor::check_state`] (§4.4: default 10 tries, 2s
/// apart, because newly submitted jobs appear on the accounting view only
/// after a short delay).
#[derive(Debug, Clone, Copy)]
pub struct CheckStatePolicy {
    pub tries: u32,
    pub wait_time: Duration,
}

impl Default for CheckStatePolicy {
    fn default() -> Self {
        Self {
            tries: 10,
            wait_time: Duration::from_secs(2),
        }
    }
}

/// Clamps `process_forks` to `page_count` when it would exceed it, and
/// never below one (§4.4, §8 property 5). Logs a warning on clamp.
pub fn clamp_process_forks(process_forks: u32, page_count: u32) -> u32 {
    if process_forks > page_count {
        warn!(
            configured_forks = process_forks,
            page_count, "clamping process_forks to page_count"
        );
        page_count.max(1)
    } else {
        process_forks.max(1)
    }
}

pub struct Executor<'a, R: RemoteOps> {
    connector: &'a mut R,
}

impl<'a, R: RemoteOps> Executor<'a, R> {
    pub fn new(connector: &'a mut R) -> Self {
        Self { connector }
    }

    /// Composes and runs the submission-wrapper command. On success,
    /// returns the `remote_job_id` parsed from the last line's trailing
    /// numeric token (§4.4).
    #[instrument(skip(self, spec), fields(workflow_job_id = %spec.workflow_job_id))]
    pub async fn submit(&mut self, spec: &JobSpec) -> GatewayResult<u64> {
        let forks = clamp_process_forks(spec.process_forks, spec.page_count);
        let mets_flag = if spec.uses_mets_server { "true" } else { "false" };

        let command = format!(
            "submit_workflow_job {partition} {deadline} {log_path} {cpus} {ram} {qos} \
             {inner_script} {slurm_workspaces_dir} {workflow_job_id} {nextflow_script_id} \
             {input_file_grp} {workspace_id} {mets_basename} {cpus} {ram} {forks} \
             {page_count} {mets_flag} {file_groups_to_remove}",
            partition = spec.partition,
            deadline = spec.deadline,
            log_path = spec.log_path,
            cpus = spec.cpus,
            ram = spec.ram_gb,
            qos = spec.qos,
            inner_script = spec.inner_script,
            slurm_workspaces_dir = spec.slurm_workspaces_dir,
            workflow_job_id = spec.workflow_job_id,
            nextflow_script_id = spec.nextflow_script_id,
            input_file_grp = spec.input_file_grp,
            workspace_id = spec.workspace_id,
            mets_basename = spec.mets_basename,
            forks = forks,
            page_count = spec.page_count,
            mets_flag = mets_flag,
            file_groups_to_remove = spec.file_groups_to_remove,
        );

        let output = self.connector.exec(&command).await?;
        if output.exit_status != Some(0) {
            return Err(GatewayError::SubmitFailed(format!(
                "submission wrapper exited with status {:?}",
                output.exit_status
            )));
        }

        parse_submit_output(&output.stdout_string())
            .ok_or_else(|| GatewayError::SubmitFailed("malformed submission output".to_string()))
    }

    /// Runs the status-wrapper up to `policy.tries` times, spaced by
    /// `policy.wait_time`, treating "too few lines" and "dashes line" as
    /// transient conditions that consume a try. Returns `None` if the
    /// retry budget is exhausted (§4.4: callers treat this as transient).
    #[instrument(skip(self, policy))]
    pub async fn check_state(
        &mut self,
        remote_job_id: u64,
        policy: CheckStatePolicy,
    ) -> GatewayResult<Option<StateTag>> {
        for attempt in 0..policy.tries {
            let output = self
                .connector
                .exec(&format!("check_job_state {remote_job_id}"))
                .await?;

            match parse_state_line(&output.stdout_string()) {
                ParsedState::Known(tag) => return Ok(Some(tag)),
                ParsedState::Unknown(mnemonic) => {
                    warn!(%mnemonic, remote_job_id, "unrecognized scheduler state mnemonic");
                }
                ParsedState::TooFewLines | ParsedState::DashesLine => {
                    info!(attempt, remote_job_id, "job not yet listed on accounting view");
                }
            }

            if attempt + 1 < policy.tries {
                tokio::time::sleep(policy.wait_time).await;
            }
        }
        Ok(None)
    }

    /// Sleeps `interval`, checks state, classifies, and repeats until a
    /// terminal classification or `timeout` elapses (§4.4).
    #[instrument(skip(self))]
    pub async fn poll_until_terminal(
        &mut self,
        remote_job_id: u64,
        interval: Duration,
        timeout: Duration,
    ) -> GatewayResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            tokio::time::sleep(interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }

            let Some(tag) = self.check_state(remote_job_id, CheckStatePolicy::default()).await?
            else {
                continue;
            };

            match classify_state(tag) {
                Classification::Success => return Ok(true),
                Classification::Fail => return Ok(false),
                Classification::Waiting | Classification::Running => continue,
            }
        }
    }

    /// Administrative, opt-in: issues the cluster's cancellation command
    /// (§4.4, Design Note "Orphaned remote jobs"). Callers are responsible
    /// for also marking the corresponding `WorkflowJob` STOPPED.
    #[instrument(skip(self))]
    pub async fn cancel_remote(&mut self, remote_job_id: u64) -> GatewayResult<()> {
        let output = self
            .connector
            .exec(&format!("cancel_job {remote_job_id}"))
            .await?;
        if output.exit_status != Some(0) {
            return Err(GatewayError::SubmitFailed(format!(
                "cancellation of remote job {remote_job_id} failed with status {:?}",
                output.exit_status
            )));
        }
        info!(remote_job_id, "operator cancelled remote job");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_connector::CommandOutput;
    use gateway_core::ClusterPaths;

    #[test]
    fn forks_are_clamped_to_page_count() {
        assert_eq!(clamp_process_forks(8, 3), 3);
    }

    #[test]
    fn forks_under_page_count_pass_through() {
        assert_eq!(clamp_process_forks(2, 10), 2);
    }

    #[test]
    fn forks_are_never_clamped_below_one() {
        assert_eq!(clamp_process_forks(1, 0), 1);
    }

    proptest::proptest! {
        /// §8 property 5: for any page_count >= 1, the clamped fork count
        /// never exceeds min(configured_forks, page_count) and is never 0.
        #[test]
        fn forks_stay_within_bounds(configured_forks in 1u32..10_000, page_count in 1u32..10_000) {
            let clamped = clamp_process_forks(configured_forks, page_count);
            proptest::prop_assert!(clamped <= configured_forks.min(page_count));
            proptest::prop_assert!(clamped >= 1);
        }
    }

    /// A scripted [`RemoteOps`] that answers `check_job_state` with one
    /// fixture line per call, cycling through `responses`; every other
    /// operation is unused by `poll_until_terminal` and panics if reached.
    struct ScriptedStateMock {
        responses: Vec<String>,
        next: usize,
    }

    impl ScriptedStateMock {
        fn oscillating(tags: &[StateTag]) -> Self {
            let responses = tags
                .iter()
                .map(|tag| format!("JobID    State\n--------  -----\n1     {tag}   alloc\n"))
                .collect();
            Self { responses, next: 0 }
        }
    }

    #[async_trait::async_trait]
    impl RemoteOps for ScriptedStateMock {
        async fn exec(&mut self, _command: &str) -> GatewayResult<CommandOutput> {
            let line = self.responses[self.next % self.responses.len()].clone();
            self.next += 1;
            Ok(CommandOutput {
                stdout: line.into_bytes(),
                stderr: Vec::new(),
                exit_status: Some(0),
            })
        }

        async fn put_file(&mut self, _remote_path: &str, _contents: &[u8]) -> GatewayResult<()> {
            unimplemented!("poll_until_terminal never transfers files")
        }

        async fn get_file(&mut self, _remote_path: &str) -> GatewayResult<Vec<u8>> {
            unimplemented!("poll_until_terminal never transfers files")
        }

        fn cluster_paths(&self) -> &ClusterPaths {
            unimplemented!("poll_until_terminal never touches cluster paths")
        }
    }

    /// §8 scenario S6: the job oscillates between RUNNING and PENDING and
    /// never reaches a terminal classification before the deadline, so
    /// `poll_until_terminal` must give up and report `false` rather than
    /// loop forever.
    #[tokio::test(start_paused = true)]
    async fn poll_until_terminal_times_out_when_state_oscillates() {
        let mut mock = ScriptedStateMock::oscillating(&[StateTag::Running, StateTag::Pending]);
        let mut executor = Executor::new(&mut mock);

        let terminal = executor
            .poll_until_terminal(1, Duration::from_secs(5), Duration::from_secs(12))
            .await
            .unwrap();

        assert!(!terminal);
    }
}
