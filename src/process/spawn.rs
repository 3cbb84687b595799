//! Managed process spawning and termination
//!
//! Handles starting external processes with their stdio redirected to a log
//! file, stopping them with a graceful-then-forceful signal escalation, and
//! running one-shot CLI invocations with a hard time bound.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::error::{SupervisorError, SupervisorResult};
use crate::process::health;

/// The two kinds of process the supervisor owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// The wallet-api process serving the unlocked wallet
    Wallet,
    /// The local beam-node process
    Node,
}

impl ProcessKind {
    /// Process name to look for in the process table
    pub fn process_name(&self) -> &'static str {
        match self {
            ProcessKind::Wallet => "wallet-api",
            ProcessKind::Node => "beam-node",
        }
    }
}

/// A live external process owned by the supervisor.
///
/// At most one of each kind exists at a time; the supervisor enforces this
/// by fully stopping any predecessor before spawning a replacement.
#[derive(Debug)]
pub struct ManagedProcess {
    pub kind: ProcessKind,
    pub pid: u32,
    pub bound_port: u16,
    pub log_path: PathBuf,
    pub cwd: PathBuf,
    child: Child,
}

impl ManagedProcess {
    /// Poll whether the child has exited, returning its exit code if so
    pub fn try_exit_code(&mut self) -> Option<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code()),
            Ok(None) => None,
            Err(_) => Some(None),
        }
    }

    /// Reap the child if it has already been killed externally
    pub fn reap(&mut self) {
        let _ = self.child.try_wait();
    }
}

/// Everything needed to start one managed process
pub struct SpawnSpec {
    pub kind: ProcessKind,
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub log_path: PathBuf,
    pub cwd: PathBuf,
    pub bound_port: u16,
}

/// Check that a binary exists and is executable
pub fn ensure_executable(path: &Path) -> SupervisorResult<()> {
    if !path.exists() {
        return Err(SupervisorError::Config(format!(
            "{} binary not found at {}",
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let executable = path
            .metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false);
        if !executable {
            return Err(SupervisorError::Config(format!(
                "binary is not executable: {}. Try: chmod +x {}",
                path.display(),
                path.display()
            )));
        }
    }

    Ok(())
}

/// Render a command line for logging, with any password argument redacted
pub fn redact_args(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            for secret_flag in ["--pass=", "--owner_key=", "--seed_phrase="] {
                if a.starts_with(secret_flag) {
                    return format!("{}***", secret_flag);
                }
            }
            a.clone()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Start a managed process with stdout+stderr redirected to its log file
pub fn spawn(spec: SpawnSpec) -> SupervisorResult<ManagedProcess> {
    ensure_executable(&spec.binary)?;

    std::fs::create_dir_all(&spec.cwd)?;
    if let Some(parent) = spec.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Fresh log per run so the failure classifiers only see this attempt
    let log_file = File::create(&spec.log_path)?;
    let log_err = log_file.try_clone()?;

    log::info!(
        "Starting {}: {} {}",
        spec.kind.process_name(),
        spec.binary.display(),
        redact_args(&spec.args)
    );

    let child = Command::new(&spec.binary)
        .args(&spec.args)
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_err))
        .stdin(Stdio::null())
        .current_dir(&spec.cwd)
        .spawn()
        .map_err(|e| {
            SupervisorError::Config(format!(
                "failed to start {}: {}",
                spec.binary.display(),
                e
            ))
        })?;

    let pid = child.id();
    log::info!("{} started with PID {}", spec.kind.process_name(), pid);

    Ok(ManagedProcess {
        kind: spec.kind,
        pid,
        bound_port: spec.bound_port,
        log_path: spec.log_path,
        cwd: spec.cwd,
        child,
    })
}

/// Describe an early exit, translating known signal codes into an
/// actionable remediation hint.
pub fn describe_exit(code: Option<i32>, binary: &Path, log_tail: &str) -> String {
    let mut msg = match code {
        Some(c) => format!(
            "{} exited immediately with code {}",
            binary
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            c
        ),
        None => format!(
            "{} was terminated by a signal before starting up",
            binary
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        ),
    };

    // 137 = 128+SIGKILL; also reported as -9 by some wrappers. Commonly the
    // macOS Gatekeeper quarantine killing an unsigned binary.
    if matches!(code, Some(137) | Some(-9) | None) {
        msg.push_str(&format!(
            " (killed - possibly macOS Gatekeeper. Try: xattr -dr com.apple.quarantine {})",
            binary.display()
        ));
    }

    if !log_tail.is_empty() {
        msg.push_str(". ");
        msg.push_str(log_tail);
    }

    msg
}

/// Whether a pid exists in the process table
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn pid_alive(pid: u32) -> bool {
    crate::process::table::pid_exists(pid)
}

/// Send SIGTERM to a pid. Returns false if the process was already gone.
#[cfg(unix)]
pub fn send_term(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

/// Send SIGKILL to a pid
#[cfg(unix)]
pub fn send_kill(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
pub fn send_term(pid: u32) -> bool {
    crate::process::table::kill_pid(pid)
}

#[cfg(not(unix))]
pub fn send_kill(pid: u32) -> bool {
    crate::process::table::kill_pid(pid)
}

/// Terminate a pid: graceful signal, bounded wait, force-kill if needed.
/// Returns true once the process is confirmed gone.
pub fn terminate_pid(pid: u32, grace: Duration) -> bool {
    if !pid_alive(pid) {
        return true;
    }

    send_term(pid);
    if health::wait_for(|| !pid_alive(pid), Duration::from_millis(100), grace) {
        return true;
    }

    log::warn!("PID {} survived SIGTERM, force killing", pid);
    send_kill(pid);
    health::wait_for(
        || !pid_alive(pid),
        Duration::from_millis(50),
        Duration::from_millis(500),
    )
}

/// Combined output of a one-shot CLI invocation
#[derive(Debug)]
pub struct CliOutput {
    pub success: bool,
    pub text: String,
}

/// Run a one-shot CLI command with a hard timeout, capturing combined
/// stdout+stderr. The child is killed if the bound elapses.
pub fn run_cli(
    binary: &Path,
    args: &[String],
    timeout: Duration,
    what: &'static str,
) -> SupervisorResult<CliOutput> {
    ensure_executable(binary)?;

    log::info!("Running {}: {}", what, redact_args(args));

    let mut child = Command::new(binary)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| {
            SupervisorError::Config(format!("failed to run {}: {}", binary.display(), e))
        })?;

    let deadline = std::time::Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if std::time::Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SupervisorError::Timeout(what));
                }
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    };

    let mut text = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut text);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut text);
    }

    Ok(CliOutput {
        success: status.success(),
        text,
    })
}

/// Read the last `max_bytes` of a log file as lossy UTF-8
pub fn read_log_tail(path: &Path, max_bytes: u64) -> String {
    use std::io::{Seek, SeekFrom};

    let Ok(mut file) = OpenOptions::new().read(true).open(path) else {
        return String::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len > max_bytes {
        if file.seek(SeekFrom::End(-(max_bytes as i64))).is_err() {
            return String::new();
        }
    }
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_args() {
        let args = vec![
            "--wallet_path=/tmp/w/wallet.db".to_string(),
            "--pass=hunter2".to_string(),
            "--owner_key=deadbeef".to_string(),
            "--port=10000".to_string(),
        ];
        let rendered = redact_args(&args);
        assert!(rendered.contains("--pass=***"));
        assert!(rendered.contains("--owner_key=***"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("--port=10000"));
    }

    #[test]
    fn test_missing_binary_is_config_error() {
        let err = ensure_executable(Path::new("/nonexistent/beam-node")).unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_exit_hint_for_sigkill() {
        let msg = describe_exit(Some(137), Path::new("/opt/bin/beam-node"), "");
        assert!(msg.contains("code 137"));
        assert!(msg.contains("com.apple.quarantine"));

        let plain = describe_exit(Some(1), Path::new("/opt/bin/beam-node"), "bad config");
        assert!(plain.contains("code 1"));
        assert!(!plain.contains("quarantine"));
        assert!(plain.contains("bad config"));
    }

    #[test]
    fn test_read_log_tail_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        let mut content = String::new();
        for i in 0..1000 {
            content.push_str(&format!("line {}\n", i));
        }
        std::fs::write(&path, &content).unwrap();

        let tail = read_log_tail(&path, 64);
        assert!(tail.len() <= 64);
        assert!(tail.contains("line 999"));
        assert!(!tail.contains("line 0\n"));
    }

    #[test]
    fn test_read_log_tail_missing_file() {
        assert_eq!(read_log_tail(Path::new("/no/such/file.log"), 1024), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_cli_captures_output() {
        let out = run_cli(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo hello".to_string()],
            Duration::from_secs(5),
            "echo test",
        )
        .unwrap();
        assert!(out.success);
        assert!(out.text.contains("hello"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_cli_times_out() {
        let err = run_cli(
            Path::new("/bin/sh"),
            &["-c".to_string(), "sleep 10".to_string()],
            Duration::from_millis(300),
            "sleep test",
        )
        .unwrap_err();
        assert!(matches!(err, SupervisorError::Timeout("sleep test")));
    }
}
