//! Remote I/O Transfer (§4.5): packs a workspace into an archive, pushes it
//! and the batch script to the cluster, and retrieves the unpacked result
//! tree on success.

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use gateway_connector::RemoteOps;
use gateway_core::{GatewayError, GatewayResult};
use tar::{Archive, Builder};
use tempfile::Builder as TempBuilder;
use tokio::io::AsyncReadExt;
use tracing::instrument;
use walkdir::WalkDir;

fn transfer_failed(phase: &str, reason: impl std::fmt::Display) -> GatewayError {
    GatewayError::TransferFailed {
        phase: phase.to_string(),
        reason: reason.to_string(),
    }
}

/// Uploads a bundled script from `resource_dir` to the cluster's
/// batch-scripts directory, overwriting on collision. Returns the absolute
/// remote path (§4.5).
#[instrument(skip(connector))]
pub async fn put_batch_script(
    connector: &mut impl RemoteOps,
    resource_dir: &Path,
    script_name: &str,
) -> GatewayResult<String> {
    let local_path = resource_dir.join(script_name);
    let remote_path = format!(
        "{}/{script_name}",
        connector.cluster_paths().batch_scripts_dir
    );

    let mut contents = Vec::new();
    tokio::fs::File::open(&local_path)
        .await
        .map_err(|e| transfer_failed("read-batch-script", e))?
        .read_to_end(&mut contents)
        .await
        .map_err(|e| transfer_failed("read-batch-script", e))?;

    connector.put_file(&remote_path, &contents).await?;

    Ok(remote_path)
}

/// Stages `local_workspace_dir` and `workflow_script_path` under a scratch
/// subdirectory named `workflow_job_id`, archives it, uploads and unpacks it
/// remotely, and returns the remote parent path (§4.5).
#[instrument(skip(connector))]
pub async fn pack_and_put_workspace(
    connector: &mut impl RemoteOps,
    local_workspace_dir: &Path,
    workflow_job_id: &str,
    workflow_script_path: &Path,
    tempdir_prefix: &str,
) -> GatewayResult<String> {
    let scratch = TempBuilder::new()
        .prefix(tempdir_prefix)
        .tempdir()
        .map_err(|e| transfer_failed("scratch-dir", e))?;

    let staged_root = scratch.path().join(workflow_job_id);
    std::fs::create_dir_all(&staged_root).map_err(|e| transfer_failed("stage", e))?;

    copy_dir_recursive(local_workspace_dir, &staged_root.join("workspace"))
        .map_err(|e| transfer_failed("stage", e))?;

    let script_basename = workflow_script_path
        .file_name()
        .ok_or_else(|| transfer_failed("stage", "workflow script path has no file name"))?;
    std::fs::copy(workflow_script_path, staged_root.join(script_basename))
        .map_err(|e| transfer_failed("stage", e))?;

    let archive_path = scratch.path().join(format!("{workflow_job_id}.tar.gz"));
    {
        let archive_file = File::create(&archive_path).map_err(|e| transfer_failed("pack", e))?;
        let encoder = GzEncoder::new(archive_file, Compression::default());
        let mut builder = Builder::new(encoder);
        builder
            .append_dir_all(workflow_job_id, &staged_root)
            .map_err(|e| transfer_failed("pack", e))?;
        builder
            .into_inner()
            .map_err(|e| transfer_failed("pack", e))?
            .finish()
            .map_err(|e| transfer_failed("pack", e))?;
    }

    let remote_dir = connector.cluster_paths().slurm_workspaces_dir.clone();
    let remote_archive_path = format!("{remote_dir}/{workflow_job_id}.tar.gz");

    let mut archive_bytes = Vec::new();
    tokio::fs::File::open(&archive_path)
        .await
        .map_err(|e| transfer_failed("upload", e))?
        .read_to_end(&mut archive_bytes)
        .await
        .map_err(|e| transfer_failed("upload", e))?;

    connector.put_file(&remote_archive_path, &archive_bytes).await?;

    connector
        .exec(&format!("tar -xzf {remote_archive_path} -C {remote_dir}"))
        .await
        .map_err(|e| transfer_failed("unpack", e))?;

    Ok(remote_dir)
}

/// Pulls the remote archive back: `local_job_dir` receives the job tree,
/// and the workspace subtree is merged back into `local_workspace_dir`
/// (§4.5). Leaves local directories untouched on early failure where
/// possible.
#[instrument(skip(connector))]
pub async fn get_and_unpack_workspace(
    connector: &mut impl RemoteOps,
    local_workspace_dir: &Path,
    local_job_dir: &Path,
    remote_workspace_path: &str,
) -> GatewayResult<()> {
    let scratch = TempBuilder::new()
        .prefix("gateway-fetch")
        .tempdir()
        .map_err(|e| transfer_failed("scratch-dir", e))?;

    let workflow_job_id = Path::new(remote_workspace_path)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| transfer_failed("download", "remote workspace path has no basename"))?
        .to_string();
    let remote_parent = Path::new(remote_workspace_path)
        .parent()
        .and_then(|p| p.to_str())
        .unwrap_or_default()
        .to_string();
    let remote_archive_path = format!("{remote_workspace_path}.tar.gz");

    connector
        .exec(&format!(
            "tar -czf {remote_archive_path} -C {remote_parent} {workflow_job_id}"
        ))
        .await
        .map_err(|e| transfer_failed("download", e))?;

    let local_archive_path = scratch.path().join(format!("{workflow_job_id}.tar.gz"));
    let archive_bytes = connector.get_file(&remote_archive_path).await?;
    std::fs::write(&local_archive_path, &archive_bytes)
        .map_err(|e| transfer_failed("download", e))?;

    let archive_file = File::open(&local_archive_path).map_err(|e| transfer_failed("unpack", e))?;
    let mut archive = Archive::new(GzDecoder::new(archive_file));
    archive
        .unpack(scratch.path())
        .map_err(|e| transfer_failed("unpack", e))?;

    let unpacked_root = scratch.path().join(&workflow_job_id);
    std::fs::create_dir_all(local_job_dir).map_err(|e| transfer_failed("unpack", e))?;
    copy_dir_recursive(&unpacked_root, local_job_dir).map_err(|e| transfer_failed("unpack", e))?;

    let unpacked_workspace = unpacked_root.join("workspace");
    if unpacked_workspace.is_dir() {
        copy_dir_recursive(&unpacked_workspace, local_workspace_dir)
            .map_err(|e| transfer_failed("unpack", e))?;
    }

    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths nested under src");
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    /// §8 property 6: packing and unpacking round-trips files byte-identical.
    #[test]
    fn copy_dir_recursive_preserves_bytes_and_structure() {
        let src = tempfile::tempdir().unwrap();
        let nested = src.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::File::create(src.path().join("top.txt"))
            .unwrap()
            .write_all(b"top-level contents")
            .unwrap();
        std::fs::File::create(nested.join("leaf.bin"))
            .unwrap()
            .write_all(&[0u8, 1, 2, 3, 255])
            .unwrap();

        let dst = tempfile::tempdir().unwrap();
        copy_dir_recursive(src.path(), dst.path()).unwrap();

        assert_eq!(
            std::fs::read(dst.path().join("top.txt")).unwrap(),
            b"top-level contents"
        );
        assert_eq!(
            std::fs::read(dst.path().join("nested/leaf.bin")).unwrap(),
            vec![0u8, 1, 2, 3, 255]
        );
    }

    use std::collections::HashMap;

    use gateway_connector::CommandOutput;
    use gateway_core::ClusterPaths;

    /// A [`RemoteOps`] backed by an in-memory map instead of live SFTP, so
    /// the staging/packing and unpacking/merging logic can be exercised
    /// without a cluster.
    struct MockRemote {
        files: HashMap<String, Vec<u8>>,
        exec_log: Vec<String>,
        cluster_paths: ClusterPaths,
    }

    impl MockRemote {
        fn new() -> Self {
            Self {
                files: HashMap::new(),
                exec_log: Vec::new(),
                cluster_paths: ClusterPaths::derive("testuser", "/scratch", "testproject"),
            }
        }

        fn with_file(remote_path: &str, contents: Vec<u8>) -> Self {
            let mut mock = Self::new();
            mock.files.insert(remote_path.to_string(), contents);
            mock
        }
    }

    #[async_trait::async_trait]
    impl RemoteOps for MockRemote {
        async fn exec(&mut self, command: &str) -> GatewayResult<CommandOutput> {
            self.exec_log.push(command.to_string());
            Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit_status: Some(0),
            })
        }

        async fn put_file(&mut self, remote_path: &str, contents: &[u8]) -> GatewayResult<()> {
            self.files.insert(remote_path.to_string(), contents.to_vec());
            Ok(())
        }

        async fn get_file(&mut self, remote_path: &str) -> GatewayResult<Vec<u8>> {
            self.files
                .get(remote_path)
                .cloned()
                .ok_or_else(|| GatewayError::TransferFailed {
                    phase: "get-file".to_string(),
                    reason: format!("mock has no file at {remote_path}"),
                })
        }

        fn cluster_paths(&self) -> &ClusterPaths {
            &self.cluster_paths
        }
    }

    /// §8 property 6, exercised end to end through [`pack_and_put_workspace`]
    /// rather than just `copy_dir_recursive`: the uploaded archive, once
    /// decompressed, reproduces the staged workspace and script byte for
    /// byte.
    #[tokio::test]
    async fn pack_and_put_workspace_uploads_a_valid_archive_of_the_staged_tree() {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("page-1.xml"), b"<mets/>").unwrap();

        let script_dir = tempfile::tempdir().unwrap();
        let script_path = script_dir.path().join("workflow.nf");
        std::fs::write(&script_path, b"#!/usr/bin/env nextflow\n").unwrap();

        let mut mock = MockRemote::new();
        let remote_dir = pack_and_put_workspace(
            &mut mock,
            workspace.path(),
            "job-42",
            &script_path,
            "gateway-test-",
        )
        .await
        .unwrap();

        assert_eq!(remote_dir, mock.cluster_paths().slurm_workspaces_dir);

        let archive_path = format!("{remote_dir}/job-42.tar.gz");
        let archive_bytes = mock.files.get(&archive_path).expect("archive was uploaded");

        let unpack_dir = tempfile::tempdir().unwrap();
        Archive::new(GzDecoder::new(&archive_bytes[..]))
            .unpack(unpack_dir.path())
            .unwrap();

        let staged = unpack_dir.path().join("job-42");
        assert_eq!(
            std::fs::read(staged.join("workspace/page-1.xml")).unwrap(),
            b"<mets/>"
        );
        assert_eq!(
            std::fs::read(staged.join("workflow.nf")).unwrap(),
            b"#!/usr/bin/env nextflow\n"
        );
        assert!(mock.exec_log.iter().any(|cmd| cmd.starts_with("tar -xzf")));
    }

    /// The reverse leg: a remote archive is pulled down, unpacked, and
    /// merged back into the local job directory and workspace.
    #[tokio::test]
    async fn get_and_unpack_workspace_merges_remote_tree_back_locally() {
        let archive_scratch = tempfile::tempdir().unwrap();
        let archive_file_path = archive_scratch.path().join("job-7.tar.gz");
        {
            let staging = tempfile::tempdir().unwrap();
            let root = staging.path().join("job-7");
            std::fs::create_dir_all(root.join("workspace")).unwrap();
            std::fs::write(root.join("workspace/out.xml"), b"<result/>").unwrap();
            std::fs::write(root.join("job.log"), b"done\n").unwrap();

            let archive_file = File::create(&archive_file_path).unwrap();
            let encoder = GzEncoder::new(archive_file, Compression::default());
            let mut builder = Builder::new(encoder);
            builder.append_dir_all("job-7", &root).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        let archive_bytes = std::fs::read(&archive_file_path).unwrap();

        let mut mock = MockRemote::with_file("/scratch/testproject/slurm_workspaces/job-7.tar.gz", archive_bytes);

        let local_workspace = tempfile::tempdir().unwrap();
        let local_job_dir = tempfile::tempdir().unwrap();

        get_and_unpack_workspace(
            &mut mock,
            local_workspace.path(),
            local_job_dir.path(),
            "/scratch/testproject/slurm_workspaces/job-7",
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read(local_job_dir.path().join("job.log")).unwrap(),
            b"done\n"
        );
        assert_eq!(
            std::fs::read(local_workspace.path().join("out.xml")).unwrap(),
            b"<result/>"
        );
        assert!(mock.exec_log.iter().any(|cmd| cmd.starts_with("tar -czf")));
    }
}
