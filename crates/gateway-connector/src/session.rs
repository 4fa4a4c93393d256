//! The tunnelled SSH/SFTP session to the cluster front-end (§4.3).
//!
//! Two hops: an SSH session to a proxy host, a direct-tcpip channel tunnelled
//! through it to the front-end's SSH port, and a second SSH session layered
//! on top of that channel. Both exec and SFTP traffic to the cluster ride the
//! second session. Reconnection checks each leg independently in order —
//! proxy session, tunnel/front-end session, SFTP client — and rebuilds only
//! the first leg found dead and everything downstream of it, reusing legs
//! that are still responsive (Design Note "Jump-host tunnelling").

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::{ClusterPaths, Config, GatewayError, GatewayResult};
use russh::client::{connect, connect_stream, Config as RusshConfig};
use russh::ChannelMsg;
use russh_keys::key::KeyPair;
use russh_keys::load_secret_key;
use russh_sftp::client::SftpSession;
use tracing::{debug, warn};

use crate::handler::{AcceptingHandler, ClientHandle};
use crate::pairs::PairSequence;

/// Stdout, stderr and exit status of one `exec` invocation.
#[derive(Debug, Default, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

struct ActiveSession {
    proxy_host: String,
    frontend_host: String,
    proxy_handle: ClientHandle,
    frontend_handle: ClientHandle,
    sftp: SftpSession,
}

pub struct Connector {
    cluster_username: String,
    key_path: String,
    key_passphrase: Option<String>,
    pairs: PairSequence,
    retry_rounds: u32,
    cluster_paths: ClusterPaths,
    active: Option<ActiveSession>,
}

impl Connector {
    pub fn new(config: &Config) -> GatewayResult<Self> {
        if !Path::new(&config.ssh_key_path).exists() {
            return Err(GatewayError::KeyfileMissing(config.ssh_key_path.clone()));
        }

        let cluster_paths = ClusterPaths::derive(
            &config.cluster_username,
            &config.scratch_root,
            &config.project_name,
        );

        Ok(Self {
            cluster_username: config.cluster_username.clone(),
            key_path: config.ssh_key_path.clone(),
            key_passphrase: config.ssh_key_passphrase.clone(),
            pairs: PairSequence::new(config.proxy_hosts.clone(), config.frontend_hosts.clone()),
            retry_rounds: config.connector_retry_rounds,
            cluster_paths,
            active: None,
        })
    }

    pub fn cluster_paths(&self) -> &ClusterPaths {
        &self.cluster_paths
    }

    /// Tries every `(proxy, front_end)` pair, memoised pair first, for
    /// `retry_rounds` rounds before giving up (§4.3, §7).
    pub async fn connect(&mut self) -> GatewayResult<()> {
        for _round in 0..self.retry_rounds {
            for (proxy_host, frontend_host) in self.pairs.ordered() {
                match self.try_pair(&proxy_host, &frontend_host).await {
                    Ok(session) => {
                        self.pairs.remember(&proxy_host, &frontend_host);
                        self.active = Some(session);
                        return Ok(());
                    }
                    Err(error) => {
                        warn!(
                            proxy = %proxy_host,
                            frontend = %frontend_host,
                            %error,
                            "connector: pair failed, trying next"
                        );
                    }
                }
            }
        }

        Err(GatewayError::ConnectUnreachable {
            rounds: self.retry_rounds,
        })
    }

    fn load_key_pair(&self, host_for_error: &str) -> GatewayResult<Arc<KeyPair>> {
        Ok(Arc::new(
            load_secret_key(&self.key_path, self.key_passphrase.as_deref()).map_err(|_| {
                GatewayError::AuthFailed {
                    host: host_for_error.to_string(),
                }
            })?,
        ))
    }

    async fn build_proxy_handle(
        &self,
        proxy_host: &str,
        key_pair: &Arc<KeyPair>,
    ) -> GatewayResult<ClientHandle> {
        let config = Arc::new(RusshConfig::default());
        let mut proxy_handle = connect(config, (proxy_host, 22), AcceptingHandler)
            .await
            .map_err(|_| GatewayError::ProxyUnreachable(proxy_host.to_string()))?;

        let authenticated = proxy_handle
            .authenticate_publickey(&self.cluster_username, key_pair.clone())
            .await
            .map_err(|_| GatewayError::AuthFailed {
                host: proxy_host.to_string(),
            })?;
        if !authenticated {
            return Err(GatewayError::AuthFailed {
                host: proxy_host.to_string(),
            });
        }
        Ok(proxy_handle)
    }

    async fn build_frontend_handle(
        &self,
        proxy_handle: &mut ClientHandle,
        proxy_host: &str,
        frontend_host: &str,
        key_pair: &Arc<KeyPair>,
    ) -> GatewayResult<ClientHandle> {
        let config = Arc::new(RusshConfig::default());
        let tunnel_channel = proxy_handle
            .channel_open_direct_tcpip(frontend_host, 22, "127.0.0.1", 0)
            .await
            .map_err(|_| GatewayError::TunnelUnreachable {
                proxy: proxy_host.to_string(),
            })?;

        let tunnel_stream = tunnel_channel.into_stream();

        let mut frontend_handle = connect_stream(config, tunnel_stream, AcceptingHandler)
            .await
            .map_err(|_| GatewayError::FrontendUnreachable(frontend_host.to_string()))?;

        let authenticated = frontend_handle
            .authenticate_publickey(&self.cluster_username, key_pair.clone())
            .await
            .map_err(|_| GatewayError::AuthFailed {
                host: frontend_host.to_string(),
            })?;
        if !authenticated {
            return Err(GatewayError::AuthFailed {
                host: frontend_host.to_string(),
            });
        }
        Ok(frontend_handle)
    }

    async fn build_sftp(
        &self,
        frontend_handle: &mut ClientHandle,
        frontend_host: &str,
    ) -> GatewayResult<SftpSession> {
        let sftp_channel = frontend_handle
            .channel_open_session()
            .await
            .map_err(|_| GatewayError::FrontendUnreachable(frontend_host.to_string()))?;
        sftp_channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|_| GatewayError::FrontendUnreachable(frontend_host.to_string()))?;
        SftpSession::new(sftp_channel.into_stream())
            .await
            .map_err(|e| GatewayError::TransferFailed {
                phase: "sftp-handshake".to_string(),
                reason: e.to_string(),
            })
    }

    async fn try_pair(&self, proxy_host: &str, frontend_host: &str) -> GatewayResult<ActiveSession> {
        let key_pair = self.load_key_pair(proxy_host)?;
        let mut proxy_handle = self.build_proxy_handle(proxy_host, &key_pair).await?;
        let mut frontend_handle = self
            .build_frontend_handle(&mut proxy_handle, proxy_host, frontend_host, &key_pair)
            .await?;
        let sftp = self.build_sftp(&mut frontend_handle, frontend_host).await?;

        Ok(ActiveSession {
            proxy_host: proxy_host.to_string(),
            frontend_host: frontend_host.to_string(),
            proxy_handle,
            frontend_handle,
            sftp,
        })
    }

    /// Checks each leg independently — proxy session, tunnel/front-end
    /// session, SFTP client — and rebuilds only the first one found dead,
    /// reusing legs still responsive rather than tearing down the whole
    /// session (Design Note "Jump-host tunnelling").
    pub async fn ensure_connected(&mut self) -> GatewayResult<()> {
        let (proxy_host, frontend_host) = match self.active.as_ref() {
            Some(session) => (session.proxy_host.clone(), session.frontend_host.clone()),
            None => return self.connect().await,
        };

        if !self.probe_proxy().await {
            warn!(proxy = %proxy_host, "connector: proxy session unresponsive, rebuilding from proxy");
            return self.rebuild_from_proxy(&proxy_host, &frontend_host).await;
        }

        if !self.probe().await {
            warn!(frontend = %frontend_host, "connector: front-end session unresponsive, rebuilding tunnel and front-end");
            return self.rebuild_from_frontend(&proxy_host, &frontend_host).await;
        }

        if !self.probe_sftp().await {
            warn!(frontend = %frontend_host, "connector: sftp channel unresponsive, recreating sftp client");
            return self.rebuild_sftp(&proxy_host, &frontend_host).await;
        }

        Ok(())
    }

    /// A cheap liveness check on the proxy hop: open a session channel and
    /// see if it answers.
    async fn probe_proxy(&mut self) -> bool {
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        session.proxy_handle.channel_open_session().await.is_ok()
    }

    /// A cheap liveness check: run `true` on the front-end and see if the
    /// channel still answers.
    async fn probe(&mut self) -> bool {
        matches!(self.run_on_frontend("true", Duration::from_secs(5)).await, Ok(_))
    }

    /// A cheap liveness check on the SFTP subsystem channel.
    async fn probe_sftp(&mut self) -> bool {
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        session.sftp.canonicalize(".").await.is_ok()
    }

    /// Rebuilds the proxy session, tunnel, front-end session and SFTP
    /// client from scratch for the memoised pair, falling back to a full
    /// `connect()` (which may also try other pairs) if that fails.
    async fn rebuild_from_proxy(&mut self, proxy_host: &str, frontend_host: &str) -> GatewayResult<()> {
        match self.try_pair(proxy_host, frontend_host).await {
            Ok(session) => {
                self.active = Some(session);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "connector: rebuild on memoised pair failed, falling back to full reconnect");
                self.connect().await
            }
        }
    }

    /// Keeps the proxy session, rebuilds the tunnel, front-end session and
    /// SFTP client on top of it.
    async fn rebuild_from_frontend(&mut self, proxy_host: &str, frontend_host: &str) -> GatewayResult<()> {
        let key_pair = match self.load_key_pair(proxy_host) {
            Ok(k) => k,
            Err(error) => {
                warn!(%error, "connector: could not reload key material, falling back to full reconnect");
                return self.rebuild_from_proxy(proxy_host, frontend_host).await;
            }
        };
        let mut session = self
            .active
            .take()
            .expect("checked Some before calling rebuild_from_frontend");

        let rebuilt = async {
            let mut frontend_handle = self
                .build_frontend_handle(&mut session.proxy_handle, proxy_host, frontend_host, &key_pair)
                .await?;
            let sftp = self.build_sftp(&mut frontend_handle, frontend_host).await?;
            GatewayResult::Ok((frontend_handle, sftp))
        }
        .await;

        match rebuilt {
            Ok((frontend_handle, sftp)) => {
                self.active = Some(ActiveSession {
                    proxy_host: proxy_host.to_string(),
                    frontend_host: frontend_host.to_string(),
                    proxy_handle: session.proxy_handle,
                    frontend_handle,
                    sftp,
                });
                Ok(())
            }
            Err(error) => {
                warn!(%error, "connector: tunnel/front-end rebuild failed, falling back to full reconnect");
                self.rebuild_from_proxy(proxy_host, frontend_host).await
            }
        }
    }

    /// Keeps the proxy session and front-end session, recreates only the
    /// SFTP subsystem channel on top of them.
    async fn rebuild_sftp(&mut self, proxy_host: &str, frontend_host: &str) -> GatewayResult<()> {
        let mut session = self
            .active
            .take()
            .expect("checked Some before calling rebuild_sftp");

        match self.build_sftp(&mut session.frontend_handle, frontend_host).await {
            Ok(sftp) => {
                session.sftp = sftp;
                self.active = Some(session);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "connector: sftp recreation failed, falling back to tunnel/front-end rebuild");
                self.active = Some(session);
                self.rebuild_from_frontend(proxy_host, frontend_host).await
            }
        }
    }

    pub async fn exec(&mut self, command: &str) -> GatewayResult<CommandOutput> {
        self.ensure_connected().await?;
        self.run_on_frontend(command, Duration::from_secs(60)).await
    }

    async fn run_on_frontend(&mut self, command: &str, timeout: Duration) -> GatewayResult<CommandOutput> {
        let session = self
            .active
            .as_mut()
            .ok_or_else(|| GatewayError::ConnectUnreachable { rounds: 0 })?;

        debug!(
            proxy = %session.proxy_host,
            frontend = %session.frontend_host,
            command,
            "connector: running command on front-end"
        );

        let mut channel = session
            .frontend_handle
            .channel_open_session()
            .await
            .map_err(|_| GatewayError::FrontendUnreachable(session.frontend_host.clone()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|_| GatewayError::FrontendUnreachable(session.frontend_host.clone()))?;

        let mut output = CommandOutput::default();
        let wait = async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                    ChannelMsg::ExtendedData { data, .. } => output.stderr.extend_from_slice(&data),
                    ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                    ChannelMsg::Eof | ChannelMsg::Close => break,
                    _ => {}
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| GatewayError::FrontendUnreachable(session.frontend_host.clone()))?;

        Ok(output)
    }

    pub async fn sftp(&mut self) -> GatewayResult<&mut SftpSession> {
        self.ensure_connected().await?;
        Ok(&mut self
            .active
            .as_mut()
            .ok_or_else(|| GatewayError::ConnectUnreachable { rounds: 0 })?
            .sftp)
    }
}
