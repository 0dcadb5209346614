//! Remote QUIC test server management over ssh
// (c) 2024 Ross Younger

use std::{
    path::{Path, PathBuf},
    process::{Output, Stdio},
};

use anyhow::{Context as _, Result};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use crate::config::Configuration;
use crate::util::fs::ensure_dir;

/// Congestion state carried over from a previous connection, for careful resume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarefulResume {
    /// Round-trip time observed previously, ms
    pub previous_rtt_ms: u32,
    /// Congestion window observed previously, bytes
    pub previous_cwnd: u64,
}

impl CarefulResume {
    fn server_args(self) -> [String; 4] {
        [
            "--cr-previous-rtt".into(),
            self.previous_rtt_ms.to_string(),
            "--cr-previous-cwnd".into(),
            self.previous_cwnd.to_string(),
        ]
    }
}

/// Quotes a string for a POSIX shell
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The parameter set needed to drive the remote server
#[derive(Debug, Clone)]
pub struct Parameters {
    ssh: String,
    scp: String,
    ssh_options: Vec<String>,
    remote_host: String,
    temp_dir: String,
    server_binary: String,
    server_port: u16,
    cert: String,
    key: String,
    root: String,
    extra_args: Vec<String>,
}

impl From<&Configuration> for Parameters {
    fn from(config: &Configuration) -> Self {
        Self {
            ssh: config.ssh.clone(),
            scp: config.scp.clone(),
            ssh_options: config.ssh_options.clone(),
            remote_host: config.remote_host.clone(),
            temp_dir: config.remote_temp_dir.trim_end_matches('/').to_string(),
            server_binary: config.server_binary.clone(),
            server_port: config.server_port,
            cert: config.server_cert.clone(),
            key: config.server_key.clone(),
            root: config.server_root.clone(),
            extra_args: config.server_extra_args.clone(),
        }
    }
}

impl Parameters {
    /// Directory on the remote host where one session's server writes its logs
    fn session_dir(&self, prefix: &str) -> String {
        format!("{}/{prefix}", self.temp_dir)
    }

    /// Shell command which runs the server in the foreground until it exits.
    ///
    /// `server_binary` is passed through unquoted so it may carry a wrapper (`sudo`, `nice`).
    fn server_command(&self, prefix: &str, careful_resume: Option<CarefulResume>) -> String {
        let dir = shell_quote(&self.session_dir(prefix));
        let mut words = vec![
            "--listen".to_string(),
            format!("0.0.0.0:{}", self.server_port),
            "--cert".into(),
            self.cert.clone(),
            "--key".into(),
            self.key.clone(),
            "--root".into(),
            self.root.clone(),
        ];
        words.extend(self.extra_args.iter().cloned());
        if let Some(cr) = careful_resume {
            words.extend(cr.server_args());
        }
        let args = words
            .iter()
            .map(|w| shell_quote(w))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "cd {dir} && QLOGDIR={dir} exec {} {args}",
            self.server_binary
        )
    }

    /// Shell command which moves every file the session left in its directory up into the
    /// temp directory with the session prefix, then removes the session directory.
    /// Prints each new name on its own line.
    fn rename_command(&self, prefix: &str) -> String {
        format!(
            r#"cd {tmp} || exit 1; for f in {prefix}/*; do [ -f "$f" ] || continue; n={prefix}_"${{f#*/}}"; mv -- "$f" "$n" || exit 1; printf '%s\n' "$n"; done; rm -rf -- {prefix}"#,
            tmp = shell_quote(&self.temp_dir),
            prefix = shell_quote(prefix),
        )
    }

    /// Shell command removing exactly the named files from the temp directory
    fn cleanup_command(&self, names: &[String]) -> String {
        let quoted = names
            .iter()
            .map(|n| shell_quote(n))
            .collect::<Vec<_>>()
            .join(" ");
        format!("cd {} && rm -f -- {quoted}", shell_quote(&self.temp_dir))
    }

    /// scp source arguments naming each file
    fn scp_sources(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|n| format!("{}:{}/{n}", self.remote_host, self.temp_dir))
            .collect()
    }
}

/// What one remote server session left behind locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRun {
    /// Captured server console output
    pub console_log: PathBuf,
    /// Diagnostic files retrieved from the remote host
    pub retrieved: Vec<PathBuf>,
}

/// Drives the QUIC test server on the remote host.
///
/// Every step is a separate remote command. Any failure is fatal; nothing is retried,
/// so a run aborted part-way may leave files behind in the remote temp directory.
#[derive(Debug, Clone)]
pub struct RemoteServer {
    params: Parameters,
}

impl RemoteServer {
    /// Constructor
    #[must_use]
    pub fn new(params: Parameters) -> Self {
        Self { params }
    }

    fn ssh(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.params.ssh);
        let _ = cmd
            .args(&self.params.ssh_options)
            .arg(&self.params.remote_host)
            .arg(remote_command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_checked(mut cmd: Command, what: &str) -> Result<Output> {
        trace!("spawning command: {cmd:?}");
        let output = cmd
            .output()
            .await
            .with_context(|| format!("could not launch {what}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{what} failed ({}): {}", output.status, stderr.trim());
        }
        Ok(output)
    }

    /// Creates an empty directory for this session's logs
    pub async fn prepare(&self, prefix: &str) -> Result<()> {
        let dir = shell_quote(&self.params.session_dir(prefix));
        let cmd = self.ssh(&format!("rm -rf -- {dir} && mkdir -p -- {dir}"));
        let _ = Self::run_checked(cmd, "remote mkdir").await?;
        Ok(())
    }

    /// Runs the server until it exits by itself after serving one session.
    /// Returns its combined console output.
    pub async fn serve(
        &self,
        prefix: &str,
        careful_resume: Option<CarefulResume>,
    ) -> Result<Vec<u8>> {
        let command = self.params.server_command(prefix, careful_resume);
        debug!("starting remote server: {command}");
        let output = Self::run_checked(self.ssh(&command), "remote QUIC server").await?;
        let mut console = output.stdout;
        console.extend_from_slice(&output.stderr);
        Ok(console)
    }

    /// Renames the session's log files with `prefix`, copies them into `local_dir` and removes the remote copies
    pub async fn collect_logs(&self, prefix: &str, local_dir: &Path) -> Result<Vec<PathBuf>> {
        let output =
            Self::run_checked(self.ssh(&self.params.rename_command(prefix)), "remote rename")
                .await?;
        let names: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        if names.is_empty() {
            warn!("remote server produced no log files for {prefix}");
            return Ok(Vec::new());
        }

        let mut scp = Command::new(&self.params.scp);
        let _ = scp
            .args(&self.params.ssh_options)
            .arg("-q")
            .args(self.params.scp_sources(&names))
            .arg(local_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let _ = Self::run_checked(scp, "scp of server logs").await?;

        let cmd = self.ssh(&self.params.cleanup_command(&names));
        let _ = Self::run_checked(cmd, "remote cleanup").await?;

        debug!("retrieved {} log files for {prefix}", names.len());
        Ok(names.iter().map(|n| local_dir.join(n)).collect())
    }

    /// One full server session: prepare, serve, store the console output, collect logs.
    pub async fn run_session(
        self,
        prefix: String,
        careful_resume: Option<CarefulResume>,
        local_dir: PathBuf,
    ) -> Result<ServerRun> {
        self.prepare(&prefix).await?;
        let console = self.serve(&prefix, careful_resume).await?;
        info!("remote server for {prefix} exited");

        ensure_dir(&local_dir).await?;
        let console_log = local_dir.join(format!("{prefix}_server.log"));
        tokio::fs::write(&console_log, console)
            .await
            .with_context(|| format!("writing {}", console_log.display()))?;

        let retrieved = self.collect_logs(&prefix, &local_dir).await?;
        Ok(ServerRun {
            console_log,
            retrieved,
        })
    }
}
