// Remote execution through a resolved jump-host chain

use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::routes::Chain;
use crate::target::Target;
use crate::transport::{ExecOutput, Transport};

/// What to run on the target
#[derive(Debug, Clone)]
pub enum Job {
    Command(String),
    Script { path: PathBuf, keep: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Connectivity checks (`echo ok`) and small housekeeping commands
    pub probe: Duration,
    /// The user's command or script, including the upload
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            probe: Duration::from_secs(10),
            command: Duration::from_secs(300),
        }
    }
}

/// Outcome of an `exec` run
#[derive(Debug, Clone, Serialize)]
pub struct ExecReport {
    pub operation: &'static str,
    pub timestamp: String,
    pub target: String,
    /// Unset when `--via` was given and the name does not resolve locally
    pub target_ip: Option<Ipv4Addr>,
    pub route: String,
    pub command: Option<String>,
    pub script: Option<PathBuf>,
    pub executed_by: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_script_path: Option<String>,
}

impl ExecReport {
    fn new(target: &Target, target_ip: Option<Ipv4Addr>, chain: &Chain, job: &Job) -> Self {
        let (command, script) = match job {
            Job::Command(cmd) => (Some(cmd.clone()), None),
            Job::Script { path, .. } => (None, Some(path.clone())),
        };

        ExecReport {
            operation: "ssh_router",
            timestamp: chrono::Local::now().to_rfc3339(),
            target: target.to_string(),
            target_ip,
            route: chain.to_string(),
            command,
            script,
            executed_by: executed_by(),
            success: false,
            exit_code: None,
            output: String::new(),
            errors: Vec::new(),
            remote_script_path: None,
        }
    }

    fn record(&mut self, out: &ExecOutput) {
        self.output = out.combined();
        self.exit_code = Some(out.exit_code);
        self.success = out.success();
    }
}

fn executed_by() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}

/// Remote location a script is uploaded to: `/tmp/<name>.<pid>`.
/// The path is spliced into remote shell commands, so the name keeps only
/// `[A-Za-z0-9._-]`.
pub fn remote_script_path(local: &Path) -> String {
    let name: String = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let name = if name.trim_matches('.').is_empty() {
        "script".to_string()
    } else {
        name
    };
    format!("/tmp/{}.{}", name, std::process::id())
}

pub struct Executor<'a, T: Transport> {
    transport: &'a T,
    target: &'a Target,
    chain: &'a Chain,
    timeouts: Timeouts,
}

impl<'a, T: Transport> Executor<'a, T> {
    pub fn new(transport: &'a T, target: &'a Target, chain: &'a Chain, timeouts: Timeouts) -> Self {
        Executor {
            transport,
            target,
            chain,
            timeouts,
        }
    }

    /// Test connectivity, then run the job. Remote failures end up in the
    /// report; only a missing local script is returned as an error.
    pub async fn run(&self, target_ip: Option<Ipv4Addr>, job: &Job) -> AppResult<ExecReport> {
        if let Job::Script { path, .. } = job {
            if !path.is_file() {
                return Err(AppError::ScriptNotFound(path.clone()));
            }
        }

        let mut report = ExecReport::new(self.target, target_ip, self.chain, job);
        tracing::info!("Executing on {} via {}", self.target, self.chain);

        if let Err(e) = self.test_connectivity().await {
            tracing::warn!("Connectivity test to {} failed: {}", self.target, e);
            report.errors.push(e);
            return Ok(report);
        }

        let result = match job {
            Job::Command(cmd) => self.execute_command(cmd, &mut report).await,
            Job::Script { path, keep } => self.execute_script(path, *keep, &mut report).await,
        };

        if let Err(e) = result {
            tracing::warn!("Execution on {} failed: {}", self.target, e);
            report.errors.push(e.to_string());
        }

        Ok(report)
    }

    /// `echo ok` through the chain. Err carries the reason for the report.
    pub async fn test_connectivity(&self) -> Result<(), String> {
        let out = self
            .transport
            .execute(self.target, self.chain, "echo ok", self.timeouts.probe)
            .await
            .map_err(|e| e.to_string())?;

        if out.success() {
            Ok(())
        } else {
            Err(format!("Connection test failed: {}", out.stderr.trim()))
        }
    }

    async fn execute_command(&self, cmd: &str, report: &mut ExecReport) -> AppResult<()> {
        let out = self
            .transport
            .execute(self.target, self.chain, cmd, self.timeouts.command)
            .await?;
        report.record(&out);
        Ok(())
    }

    async fn execute_script(&self, local: &Path, keep: bool, report: &mut ExecReport) -> AppResult<()> {
        let remote = remote_script_path(local);

        let upload = self
            .transport
            .copy_file(self.target, self.chain, local, &remote, self.timeouts.command)
            .await?;
        if !upload.success() {
            report.errors.push(format!("Upload failed: {}", upload.stderr.trim()));
            return Ok(());
        }
        tracing::info!("Uploaded {} to {}", local.display(), remote);
        report.remote_script_path = Some(remote.clone());

        self.housekeeping(&format!("chmod +x {}", remote)).await;

        let run = self
            .transport
            .execute(self.target, self.chain, &remote, self.timeouts.command)
            .await;

        if keep {
            tracing::info!("Script kept on target: {}", remote);
        } else {
            self.housekeeping(&format!("rm -f {}", remote)).await;
        }

        report.record(&run?);
        Ok(())
    }

    /// Best-effort helper command; failures are only logged
    async fn housekeeping(&self, cmd: &str) {
        match self
            .transport
            .execute(self.target, self.chain, cmd, self.timeouts.probe)
            .await
        {
            Ok(out) if out.success() => {}
            Ok(out) => tracing::warn!("`{}` exited with {}", cmd, out.exit_code),
            Err(e) => tracing::warn!("`{}` failed: {}", cmd, e),
        }
    }
}
