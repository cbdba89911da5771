// Transport module - the seam between route/exec logic and the ssh/scp binaries

pub mod openssh;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::routes::Chain;
use crate::target::Target;

pub use openssh::OpenSshTransport;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed waiting for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Result of one remote operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Capability to reach a target, possibly through a jump-host chain
pub trait Transport {
    async fn execute(
        &self,
        target: &Target,
        chain: &Chain,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, TransportError>;

    async fn copy_file(
        &self,
        target: &Target,
        chain: &Chain,
        local: &Path,
        remote: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, TransportError>;
}

/// Connection options shared by every ssh/scp invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub strict_host_key_checking: String,
}

impl Default for SshOptions {
    fn default() -> Self {
        SshOptions {
            identity_file: None,
            connect_timeout_secs: 10,
            strict_host_key_checking: "accept-new".to_string(),
        }
    }
}

impl SshOptions {
    fn common_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(key) = &self.identity_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push("-o".to_string());
        args.push(format!("StrictHostKeyChecking={}", self.strict_host_key_checking));
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", self.connect_timeout_secs));
        args
    }
}

/// Arguments for `ssh` running `command` on `target` through `chain`
pub fn build_ssh_args(opts: &SshOptions, target: &Target, chain: &Chain, command: &str) -> Vec<String> {
    let mut args = opts.common_args();

    if let Some(port) = target.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    if let Some(jump) = chain.proxy_jump() {
        args.push("-J".to_string());
        args.push(jump);
    }

    args.push(target.destination());
    args.push(command.to_string());
    args
}

/// Arguments for `scp` copying `local` to `remote` on `target` through `chain`
pub fn build_scp_args(
    opts: &SshOptions,
    target: &Target,
    chain: &Chain,
    local: &Path,
    remote: &str,
) -> Vec<String> {
    let mut args = opts.common_args();

    if let Some(port) = target.port {
        args.push("-P".to_string());
        args.push(port.to_string());
    }

    if let Some(jump) = chain.proxy_jump() {
        args.push("-o".to_string());
        args.push(format!("ProxyJump={}", jump));
    }

    args.push(local.display().to_string());
    args.push(format!("{}:{}", target.destination(), remote));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hops(list: &[&str]) -> Chain {
        Chain::Hops(list.iter().map(|h| h.to_string()).collect())
    }

    #[test]
    fn test_ssh_args_with_jump_chain() {
        let target = Target::parse("root@10.0.5.1").unwrap();
        let args = build_ssh_args(
            &SshOptions::default(),
            &target,
            &hops(&["a@bastion", "b@inner:2222"]),
            "uptime",
        );
        assert_eq!(
            args,
            vec![
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ConnectTimeout=10",
                "-J",
                "a@bastion,b@inner:2222",
                "root@10.0.5.1",
                "uptime",
            ]
        );
    }

    #[test]
    fn test_ssh_args_direct_has_no_jump() {
        let target = Target::parse("root@192.168.9.5:2200").unwrap();
        let opts = SshOptions {
            identity_file: Some(PathBuf::from("/keys/id_ed25519")),
            ..SshOptions::default()
        };
        let args = build_ssh_args(&opts, &target, &Chain::Direct, "echo ok");
        assert!(!args.iter().any(|a| a == "-J"));
        assert_eq!(&args[..2], ["-i", "/keys/id_ed25519"]);
        assert!(args.windows(2).any(|w| w == ["-p", "2200"]));
        assert_eq!(args.last().map(String::as_str), Some("echo ok"));
    }

    #[test]
    fn test_scp_args() {
        let target = Target::parse("ops@10.0.0.9:2022").unwrap();
        let args = build_scp_args(
            &SshOptions::default(),
            &target,
            &hops(&["a@bastion"]),
            Path::new("check.sh"),
            "/tmp/check.sh.42",
        );
        assert!(args.windows(2).any(|w| w == ["-P", "2022"]));
        assert!(args.windows(2).any(|w| w == ["-o", "ProxyJump=a@bastion"]));
        assert_eq!(
            &args[args.len() - 2..],
            ["check.sh", "ops@10.0.0.9:/tmp/check.sh.42"]
        );

        let direct = build_scp_args(
            &SshOptions::default(),
            &target,
            &Chain::Direct,
            Path::new("check.sh"),
            "/tmp/x",
        );
        assert!(!direct.iter().any(|a| a.starts_with("ProxyJump")));
    }

    #[test]
    fn test_exec_output_combined() {
        let out = ExecOutput {
            exit_code: 1,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert!(!out.success());
        assert_eq!(out.combined(), "out\nerr\n");
    }
}
