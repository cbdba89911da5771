// Transport backed by the system OpenSSH client (ssh / scp, OpenSSH 7.3+ for -J)

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{build_scp_args, build_ssh_args, ExecOutput, SshOptions, Transport, TransportError};
use crate::routes::Chain;
use crate::target::Target;

pub struct OpenSshTransport {
    options: SshOptions,
}

impl OpenSshTransport {
    pub fn new(options: SshOptions) -> Self {
        OpenSshTransport { options }
    }

    async fn run(program: &str, args: Vec<String>, timeout: Duration) -> Result<ExecOutput, TransportError> {
        tracing::debug!("Executing {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout kills the child.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(TransportError::Wait)?;

        let result = ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        tracing::debug!("{} exited with {}", program, result.exit_code);
        Ok(result)
    }
}

impl Transport for OpenSshTransport {
    async fn execute(
        &self,
        target: &Target,
        chain: &Chain,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, TransportError> {
        let args = build_ssh_args(&self.options, target, chain, command);
        Self::run("ssh", args, timeout).await
    }

    async fn copy_file(
        &self,
        target: &Target,
        chain: &Chain,
        local: &Path,
        remote: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, TransportError> {
        let args = build_scp_args(&self.options, target, chain, local, remote);
        Self::run("scp", args, timeout).await
    }
}
