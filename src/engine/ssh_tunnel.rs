//! SSH Tunnel
//!
//! Provides SSH tunneling for connecting to databases behind firewalls.
//! The strategy layer only sees the [`TunnelProvider`] capability; the bundled
//! provider drives the native OpenSSH client.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::engine::config::{SshAuth, SshHostKeyPolicy, TunnelConfig};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TunnelError {
    /// The tunneling capability (e.g. the `ssh` binary) is not installed.
    #[error("{0}")]
    Unavailable(String),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl TunnelError {
    fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Starts SSH port forwards
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Forwards a local port to `remote_host:remote_port` through the SSH
    /// server in `config`. Resolves once the local port accepts connections.
    async fn start(
        &self,
        config: &TunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, TunnelError>;
}

/// A running port forward
#[async_trait]
pub trait Tunnel: Send {
    /// Local port that forwards to the remote endpoint
    fn local_bound_port(&self) -> u16;

    fn is_active(&mut self) -> bool;

    /// Stops forwarding. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TunnelError>;
}

/// Provider backed by the OpenSSH client (`ssh -L`)
///
/// Password and passphrase authentication go through `sshpass -e`, which reads
/// the secret from the `SSHPASS` environment variable so it never shows up in
/// the process list.
#[derive(Debug, Clone)]
pub struct OpenSshTunnelProvider {
    ssh_program: String,
    sshpass_program: String,
}

impl OpenSshTunnelProvider {
    pub fn new() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }

    /// Uses a specific `ssh` executable instead of the one on `PATH`
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn with_sshpass_program(mut self, program: impl Into<String>) -> Self {
        self.sshpass_program = program.into();
        self
    }

    /// Builds the full command line: program, arguments and the secret for
    /// `SSHPASS`, if any.
    fn command_line(
        &self,
        config: &TunnelConfig,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> (String, Vec<String>, Option<String>) {
        let mut args: Vec<String> = vec![
            "-N".into(), // Don't execute remote command
            "-o".into(),
            "ExitOnForwardFailure=yes".into(),
            "-o".into(),
            format!("ConnectTimeout={}", config.connect_timeout_secs),
        ];

        match config.host_key_policy {
            SshHostKeyPolicy::AcceptNew => {
                args.extend(["-o".into(), "StrictHostKeyChecking=accept-new".into()]);
            }
            SshHostKeyPolicy::Strict => {
                args.extend(["-o".into(), "StrictHostKeyChecking=yes".into()]);
            }
            SshHostKeyPolicy::InsecureNoCheck => {
                args.extend([
                    "-o".into(),
                    "StrictHostKeyChecking=no".into(),
                    "-o".into(),
                    "UserKnownHostsFile=/dev/null".into(),
                ]);
            }
        }
        if config.host_key_policy != SshHostKeyPolicy::InsecureNoCheck {
            if let Some(ref path) = config.known_hosts_path {
                args.extend(["-o".into(), format!("UserKnownHostsFile={}", path)]);
            }
        }

        let secret = match &config.auth {
            SshAuth::Password { password } => {
                args.extend([
                    "-o".into(),
                    "PreferredAuthentications=password,keyboard-interactive".into(),
                    "-o".into(),
                    "PubkeyAuthentication=no".into(),
                ]);
                Some(password.clone())
            }
            SshAuth::Key {
                private_key_path,
                passphrase,
            } => {
                args.extend([
                    "-i".into(),
                    private_key_path.clone(),
                    "-o".into(),
                    "IdentitiesOnly=yes".into(),
                ]);
                if passphrase.is_none() {
                    args.extend(["-o".into(), "BatchMode=yes".into()]);
                }
                passphrase.clone()
            }
        };

        args.extend([
            "-L".into(),
            format!("127.0.0.1:{}:{}:{}", local_port, remote_host, remote_port),
            "-p".into(),
            config.ssh_port.to_string(),
            format!("{}@{}", config.ssh_username, config.ssh_host),
        ]);

        match secret {
            Some(secret) => {
                let mut wrapped = Vec::with_capacity(args.len() + 4);
                if matches!(config.auth, SshAuth::Key { .. }) {
                    // Match the key passphrase prompt instead of the password prompt
                    wrapped.extend(["-P".to_string(), "passphrase".to_string()]);
                }
                wrapped.extend(["-e".to_string(), self.ssh_program.clone()]);
                wrapped.extend(args);
                (self.sshpass_program.clone(), wrapped, Some(secret))
            }
            None => (self.ssh_program.clone(), args, None),
        }
    }
}

impl Default for OpenSshTunnelProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds a free local port by binding an ephemeral one
async fn ephemeral_port() -> Result<u16, TunnelError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| TunnelError::io("Failed to bind local port", e))?;

    let port = listener
        .local_addr()
        .map_err(|e| TunnelError::io("Failed to get local address", e))?
        .port();

    // Dropping the listener frees the port for ssh
    drop(listener);
    Ok(port)
}

/// Fails when another process already listens on a configured local port
async fn ensure_port_free(port: u16) -> Result<(), TunnelError> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| TunnelError::io(format!("Local port {} is already in use", port), e))?;
    drop(listener);
    Ok(())
}

#[async_trait]
impl TunnelProvider for OpenSshTunnelProvider {
    async fn start(
        &self,
        config: &TunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, TunnelError> {
        let local_port = match config.local_port {
            Some(port) => {
                ensure_port_free(port).await?;
                port
            }
            None => ephemeral_port().await?,
        };

        let (program, args, secret) = self.command_line(config, local_port, remote_host, remote_port);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(secret) = secret {
            cmd.env("SSHPASS", secret);
        }

        debug!(
            program = %program,
            ssh_host = %config.ssh_host,
            ssh_port = config.ssh_port,
            local_port,
            "Spawning SSH tunnel process"
        );

        let process = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TunnelError::Unavailable(format!(
                    "'{}' was not found. Is OpenSSH{} installed?",
                    program,
                    if program == self.sshpass_program { " (with sshpass)" } else { "" }
                ))
            } else {
                TunnelError::io(format!("Failed to spawn SSH process '{}'", program), e)
            }
        })?;

        let mut tunnel = OpenSshTunnel {
            local_port,
            process: Some(process),
        };

        let timeout = Duration::from_secs(u64::from(config.connect_timeout_secs));
        if let Err(e) = tunnel.wait_ready(timeout).await {
            let _ = tunnel.close().await;
            return Err(e);
        }

        info!(
            ssh_host = %config.ssh_host,
            local_port,
            remote = %format!("{}:{}", remote_host, remote_port),
            "SSH tunnel established"
        );
        Ok(Box::new(tunnel))
    }
}

/// Represents an active SSH tunnel using native OpenSSH
pub struct OpenSshTunnel {
    local_port: u16,
    process: Option<Child>,
}

impl OpenSshTunnel {
    /// Polls until the forward accepts connections, ssh exits, or time runs out
    async fn wait_ready(&mut self, timeout: Duration) -> Result<(), TunnelError> {
        let deadline = Instant::now() + timeout;

        loop {
            let Some(process) = self.process.as_mut() else {
                return Err(TunnelError::failed("SSH process is not running"));
            };

            if let Some(status) = process
                .try_wait()
                .map_err(|e| TunnelError::io("Failed to poll SSH process", e))?
            {
                let mut stderr = String::new();
                if let Some(mut pipe) = process.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                self.process = None;
                return Err(TunnelError::failed(format!(
                    "SSH process exited ({}): {}",
                    status,
                    stderr.trim()
                )));
            }

            if TcpStream::connect(("127.0.0.1", self.local_port)).await.is_ok()
                && matches!(process.try_wait(), Ok(None))
            {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(TunnelError::failed(format!(
                    "SSH tunnel not ready after {}s",
                    timeout.as_secs()
                )));
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Tunnel for OpenSshTunnel {
    fn local_bound_port(&self) -> u16 {
        self.local_port
    }

    fn is_active(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        if let Some(mut process) = self.process.take() {
            if let Ok(None) = process.try_wait() {
                process
                    .kill()
                    .await
                    .map_err(|e| TunnelError::io("Failed to kill SSH process", e))?;
            }
            info!(local_port = self.local_port, "SSH tunnel closed");
        }
        Ok(())
    }
}

impl Drop for OpenSshTunnel {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            // Best effort kill on drop
            let _ = process.start_kill();
        }
    }
}
