//! Process supervision for resolved scripts.
//!
//! Two launch modes:
//! - **Attached**: output is drained and echoed as it arrives, the caller
//!   waits for the exit code, and an interrupt is forwarded to the child
//!   (SIGINT, then kill after `interrupt_timeout`).
//! - **Detached**: the child is moved into its own session and its pid is
//!   returned at once. A background task only reaps it and then releases
//!   its output pipe.
//!
//! A nonzero exit code is a normal outcome, not an error.

mod drain;
mod spawn;

use crate::config::LaunchSettings;
use crate::errors::SupervisorError;
use crate::report::Reporter;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How a script is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Attached,
    Detached,
}

/// A child the supervisor started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub mode: LaunchMode,
    /// Set for attached launches once the child has exited.
    pub exit_code: Option<i32>,
}

/// What the caller gets back from a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchResult {
    ExitCode(i32),
    BackgroundPid(u32),
}

impl ProcessHandle {
    pub fn result(&self) -> LaunchResult {
        match (self.mode, self.exit_code) {
            (LaunchMode::Attached, Some(code)) => LaunchResult::ExitCode(code),
            _ => LaunchResult::BackgroundPid(self.pid),
        }
    }

    pub fn succeeded(&self) -> bool {
        match self.result() {
            LaunchResult::ExitCode(code) => code == 0,
            LaunchResult::BackgroundPid(_) => true,
        }
    }
}

/// Launches scripts and supervises attached runs.
pub struct Supervisor {
    settings: LaunchSettings,
    reporter: Arc<dyn Reporter>,
    // Detached children not yet reaped. Each one's output read end is held
    // until it exits, so a chatty child blocks on a full pipe instead of
    // dying on a broken one.
    detached_live: Arc<AtomicUsize>,
}

impl Supervisor {
    pub fn new(settings: LaunchSettings, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            settings,
            reporter,
            detached_live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Detached children that have not exited yet.
    pub fn detached_running(&self) -> usize {
        self.detached_live.load(Ordering::SeqCst)
    }

    /// Launch `path`; attached runs can be interrupted with Ctrl+C.
    pub async fn launch(
        &self,
        path: &Path,
        mode: LaunchMode,
    ) -> Result<ProcessHandle, SupervisorError> {
        self.launch_with_interrupt(path, mode, ctrl_c()).await
    }

    /// Launch `path`; an attached run is interrupted when `interrupt`
    /// completes. Detached launches ignore it.
    pub async fn launch_with_interrupt<F>(
        &self,
        path: &Path,
        mode: LaunchMode,
        interrupt: F,
    ) -> Result<ProcessHandle, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let script = self.check_script(path)?;
        let cwd = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        match mode {
            LaunchMode::Attached => self.run_attached(&script, &cwd, interrupt).await,
            LaunchMode::Detached => self.run_detached(&script, &cwd),
        }
    }

    fn check_script(&self, path: &Path) -> Result<PathBuf, SupervisorError> {
        let script = path
            .canonicalize()
            .map_err(|_| SupervisorError::ScriptNotFound(path.to_path_buf()))?;
        if !script.is_file() {
            return Err(SupervisorError::NotAFile(script));
        }
        if !crate::alias::has_extension(&script, &self.settings.script_extension) {
            warn!(script = %script.display(), "unexpected script extension");
            self.reporter.emit(&format!(
                "[warn] '{}' does not end with .{}; attempting to run with {} anyway.",
                script.display(),
                self.settings.script_extension,
                self.settings.interpreter
            ));
        }
        Ok(script)
    }

    async fn run_attached<F>(
        &self,
        script: &Path,
        cwd: &Path,
        interrupt: F,
    ) -> Result<ProcessHandle, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let spawn::Spawned { mut child, output } =
            spawn::spawn_attached(&self.settings.interpreter, script, cwd)?;
        let pid = child.id().unwrap_or(0);
        let name = script_name(script);
        info!(pid, script = %script.display(), "attached launch");

        let drained = drain::spawn_drain(output, format!("{name} {pid}"), Arc::clone(&self.reporter));

        tokio::pin!(interrupt);
        let status = tokio::select! {
            status = child.wait() => status.map_err(SupervisorError::Wait)?,
            _ = &mut interrupt => self.interrupt_child(&mut child, pid).await?,
        };
        let code = spawn::exit_code(status);

        match timeout(self.settings.drain_grace, drained).await {
            Ok(Ok(lines)) => debug!(pid, lines, "output drained"),
            Ok(Err(_)) => debug!(pid, "drain worker exited without reporting"),
            Err(_) => debug!(pid, "output still open after grace period"),
        }

        if code == 0 {
            self.reporter
                .emit(&format!("[ok] {name} finished with exit code 0."));
        } else {
            self.reporter
                .emit(&format!("[err] {name} exited with code {code}."));
        }
        info!(pid, code, "attached run finished");

        Ok(ProcessHandle {
            pid,
            mode: LaunchMode::Attached,
            exit_code: Some(code),
        })
    }

    /// SIGINT, bounded wait, then kill and reap.
    async fn interrupt_child(
        &self,
        child: &mut Child,
        pid: u32,
    ) -> Result<ExitStatus, SupervisorError> {
        match spawn::send_interrupt(pid) {
            Ok(()) => {
                self.reporter.emit("[info] Sent SIGINT to child process...");
                if let Ok(status) = timeout(self.settings.interrupt_timeout, child.wait()).await {
                    return status.map_err(SupervisorError::Wait);
                }
                warn!(
                    pid,
                    timeout = ?self.settings.interrupt_timeout,
                    "child did not exit after SIGINT; killing"
                );
            }
            Err(err) => warn!(pid, error = %err, "could not forward interrupt; killing"),
        }
        if let Err(err) = child.start_kill() {
            debug!(pid, error = %err, "kill failed; child may already be gone");
        }
        child.wait().await.map_err(SupervisorError::Wait)
    }

    fn run_detached(&self, script: &Path, cwd: &Path) -> Result<ProcessHandle, SupervisorError> {
        let spawn::Spawned { child, output } =
            spawn::spawn_detached(&self.settings.interpreter, script, cwd)?;
        let pid = child.id().unwrap_or(0);
        self.detached_live.fetch_add(1, Ordering::SeqCst);
        let live = Arc::clone(&self.detached_live);
        tokio::spawn(async move {
            let mut child = child;
            if let Err(err) = child.wait().await {
                debug!(pid, error = %err, "could not reap detached child");
            }
            drop(output);
            live.fetch_sub(1, Ordering::SeqCst);
            debug!(pid, "detached child exited; output pipe released");
        });

        info!(pid, script = %script.display(), "detached launch");
        self.reporter.emit(&format!(
            "[bg] Started {} in background (pid={pid}).",
            script_name(script)
        ));
        Ok(ProcessHandle {
            pid,
            mode: LaunchMode::Detached,
            exit_code: None,
        })
    }
}

fn script_name(script: &Path) -> String {
    script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string())
}

// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::report::BufferReporter;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};
    use tempfile::{TempDir, tempdir};

    fn settings() -> LaunchSettings {
        LaunchSettings {
            interpreter: "sh".to_string(),
            script_extension: "sh".to_string(),
            drain_grace: Duration::from_millis(500),
            interrupt_timeout: Duration::from_millis(500),
        }
    }

    fn create_test_script(dir: &Path, name: &str, content: &str) -> PathBuf {
        let script_path = dir.join(name);
        std::fs::write(&script_path, content).unwrap();
        let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    fn supervisor() -> (Supervisor, Arc<BufferReporter>, TempDir) {
        let reporter = Arc::new(BufferReporter::new());
        let sup = Supervisor::new(settings(), reporter.clone());
        (sup, reporter, tempdir().unwrap())
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    fn sigint_ignored() -> bool {
        // SAFETY: query-only sigaction call with a zeroed out-parameter.
        unsafe {
            let mut old: libc::sigaction = std::mem::zeroed();
            libc::sigaction(libc::SIGINT, std::ptr::null(), &mut old);
            old.sa_sigaction == libc::SIG_IGN
        }
    }

    #[tokio::test]
    async fn test_attached_success_streams_output() {
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "hello.sh", "echo hello\necho oops >&2\n");

        let handle = sup
            .launch_with_interrupt(&script, LaunchMode::Attached, never())
            .await
            .unwrap();

        assert_eq!(handle.result(), LaunchResult::ExitCode(0));
        assert!(handle.succeeded());
        let lines = reporter.lines();
        let prefix = format!("[hello.sh {}]", handle.pid);
        assert!(lines.contains(&format!("{prefix} hello")));
        assert!(lines.contains(&format!("{prefix} oops")));
        assert_eq!(
            lines.last().unwrap(),
            "[ok] hello.sh finished with exit code 0."
        );
    }

    #[tokio::test]
    async fn test_attached_nonzero_exit_is_not_an_error() {
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "fail.sh", "echo failing\nexit 7\n");

        let handle = sup
            .launch_with_interrupt(&script, LaunchMode::Attached, never())
            .await
            .unwrap();

        assert_eq!(handle.exit_code, Some(7));
        assert!(!handle.succeeded());
        assert!(reporter.contains("[err] fail.sh exited with code 7."));
    }

    #[tokio::test]
    async fn test_attached_output_order_and_flush() {
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(
            dir.path(),
            "count.sh",
            "i=1\nwhile [ $i -le 200 ]; do echo line$i; i=$((i+1)); done\n",
        );

        let handle = sup
            .launch_with_interrupt(&script, LaunchMode::Attached, never())
            .await
            .unwrap();

        let prefix = format!("[count.sh {}] ", handle.pid);
        let drained: Vec<String> = reporter
            .lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(str::to_string))
            .collect();
        let expected: Vec<String> = (1..=200).map(|i| format!("line{i}")).collect();
        assert_eq!(drained, expected);
    }

    #[tokio::test]
    async fn test_attached_runs_in_script_directory() {
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "where.sh", "pwd -P\n");

        let handle = sup
            .launch_with_interrupt(&script, LaunchMode::Attached, never())
            .await
            .unwrap();

        let expected = dir.path().canonicalize().unwrap();
        let line = format!("[where.sh {}] {}", handle.pid, expected.display());
        assert!(reporter.lines().contains(&line), "{:?}", reporter.lines());
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        let (sup, _reporter, dir) = supervisor();
        // Far more than a pipe buffer, written before the child exits.
        let script = create_test_script(
            dir.path(),
            "flood.sh",
            "i=0\nwhile [ $i -lt 5000 ]; do echo 0123456789012345678901234567890123456789; i=$((i+1)); done\n",
        );

        let result = tokio::time::timeout(
            Duration::from_secs(30),
            sup.launch_with_interrupt(&script, LaunchMode::Attached, never()),
        )
        .await
        .expect("attached launch deadlocked");
        assert_eq!(result.unwrap().exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_interrupt_graceful_exit_reports_signal_code() {
        if sigint_ignored() {
            return;
        }
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "sleepy.sh", "exec sleep 30\n");

        let start = Instant::now();
        let handle = sup
            .launch_with_interrupt(
                &script,
                LaunchMode::Attached,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(handle.exit_code, Some(-libc::SIGINT));
        assert!(reporter.contains("[info] Sent SIGINT to child process..."));
        assert!(reporter.contains("[err] sleepy.sh exited with code -2."));
    }

    #[tokio::test]
    async fn test_interrupt_ignoring_child_is_killed_after_timeout() {
        let (sup, _reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "stubborn.sh", "trap '' INT\nexec sleep 30\n");

        let start = Instant::now();
        let handle = sup
            .launch_with_interrupt(
                &script,
                LaunchMode::Attached,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600), "killed too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "launch hung: {elapsed:?}");
        assert_eq!(handle.exit_code, Some(-libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_detached_returns_immediately_in_new_session() {
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "forever.sh", "exec sleep 30\n");

        let start = Instant::now();
        let handle = sup
            .launch_with_interrupt(&script, LaunchMode::Detached, never())
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        assert_eq!(handle.mode, LaunchMode::Detached);
        assert_eq!(handle.result(), LaunchResult::BackgroundPid(handle.pid));
        assert!(reporter.contains(&format!(
            "[bg] Started forever.sh in background (pid={}).",
            handle.pid
        )));

        let pid = handle.pid as libc::pid_t;
        // SAFETY: plain syscalls on the pid we just spawned.
        unsafe {
            assert_eq!(libc::getsid(pid), pid, "child should lead its own session");
            libc::kill(pid, libc::SIGKILL);
        }
    }

    #[tokio::test]
    async fn test_detached_output_pipes_released_after_exit() {
        let (sup, _reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "quick.sh", "echo done\n");

        for _ in 0..25 {
            sup.launch_with_interrupt(&script, LaunchMode::Detached, never())
                .await
                .unwrap();
        }
        assert!(sup.detached_running() <= 25);

        let deadline = Instant::now() + Duration::from_secs(10);
        while sup.detached_running() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(sup.detached_running(), 0);
    }

    #[tokio::test]
    async fn test_missing_script_is_reported_at_launch() {
        let (sup, _reporter, dir) = supervisor();
        let err = sup
            .launch_with_interrupt(&dir.path().join("gone.sh"), LaunchMode::Attached, never())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::ScriptNotFound(_)));

        let err = sup
            .launch_with_interrupt(dir.path(), LaunchMode::Detached, never())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotAFile(_)));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_a_spawn_failure() {
        let reporter = Arc::new(BufferReporter::new());
        let sup = Supervisor::new(
            LaunchSettings {
                interpreter: "definitely-not-an-interpreter-4242".to_string(),
                ..settings()
            },
            reporter,
        );
        let dir = tempdir().unwrap();
        let script = create_test_script(dir.path(), "a.sh", "exit 0\n");

        let err = sup
            .launch_with_interrupt(&script, LaunchMode::Attached, never())
            .await
            .unwrap_err();
        assert!(err.is_spawn_failure());
        assert!(matches!(err, SupervisorError::InterpreterNotFound { .. }));
    }

    #[tokio::test]
    async fn test_extension_mismatch_warns_but_runs() {
        let (sup, reporter, dir) = supervisor();
        let script = create_test_script(dir.path(), "job.py", "exit 0\n");

        let handle = sup
            .launch_with_interrupt(&script, LaunchMode::Attached, never())
            .await
            .unwrap();
        assert_eq!(handle.exit_code, Some(0));
        assert!(reporter.contains("does not end with .sh; attempting to run with sh anyway."));
    }
}
