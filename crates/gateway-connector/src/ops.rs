//! A trait seam over [`Connector`] so the orchestration logic that sits on
//! top of it (job submission, polling, workspace transfer) can run against a
//! mock instead of a live SSH/SFTP session in tests — the same role the
//! `Storage`/`KeyValueStore` split plays for the datastore façade.

use async_trait::async_trait;
use gateway_core::{ClusterPaths, GatewayError, GatewayResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::session::{CommandOutput, Connector};

#[async_trait]
pub trait RemoteOps: Send {
    async fn exec(&mut self, command: &str) -> GatewayResult<CommandOutput>;

    /// Writes `contents` to `remote_path`, overwriting on collision.
    async fn put_file(&mut self, remote_path: &str, contents: &[u8]) -> GatewayResult<()>;

    /// Reads the full contents of `remote_path`.
    async fn get_file(&mut self, remote_path: &str) -> GatewayResult<Vec<u8>>;

    fn cluster_paths(&self) -> &ClusterPaths;
}

#[async_trait]
impl RemoteOps for Connector {
    async fn exec(&mut self, command: &str) -> GatewayResult<CommandOutput> {
        Connector::exec(self, command).await
    }

    async fn put_file(&mut self, remote_path: &str, contents: &[u8]) -> GatewayResult<()> {
        let sftp = self.sftp().await?;
        let mut remote_file = sftp.create(remote_path).await.map_err(|e| GatewayError::TransferFailed {
            phase: "put-file".to_string(),
            reason: e.to_string(),
        })?;
        remote_file
            .write_all(contents)
            .await
            .map_err(|e| GatewayError::TransferFailed {
                phase: "put-file".to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_file(&mut self, remote_path: &str) -> GatewayResult<Vec<u8>> {
        let sftp = self.sftp().await?;
        let mut contents = Vec::new();
        sftp.open(remote_path)
            .await
            .map_err(|e| GatewayError::TransferFailed {
                phase: "get-file".to_string(),
                reason: e.to_string(),
            })?
            .read_to_end(&mut contents)
            .await
            .map_err(|e| GatewayError::TransferFailed {
                phase: "get-file".to_string(),
                reason: e.to_string(),
            })?;
        Ok(contents)
    }

    fn cluster_paths(&self) -> &ClusterPaths {
        Connector::cluster_paths(self)
    }
}
