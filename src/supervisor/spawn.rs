//! Platform backends for creating script processes.
//!
//! Both launch modes run `<interpreter> <script>` with the script's directory
//! as working directory, and route stdout and stderr into one OS pipe. The
//! detached backend additionally cuts the child loose from our session or
//! console so it outlives the runner.

use crate::errors::SupervisorError;
use std::io::PipeReader;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// A freshly spawned child and the read end of its merged output pipe.
pub(crate) struct Spawned {
    pub child: Child,
    pub output: PipeReader,
}

/// Spawn a child that shares our terminal for stdin.
pub(crate) fn spawn_attached(
    interpreter: &str,
    script: &Path,
    cwd: &Path,
) -> Result<Spawned, SupervisorError> {
    let (mut cmd, output) = base_command(interpreter, script, cwd)?;
    cmd.stdin(Stdio::inherit());
    spawn(cmd, output, interpreter, script)
}

/// Spawn a child outside our process group and session.
pub(crate) fn spawn_detached(
    interpreter: &str,
    script: &Path,
    cwd: &Path,
) -> Result<Spawned, SupervisorError> {
    let (mut cmd, output) = base_command(interpreter, script, cwd)?;
    cmd.stdin(Stdio::null());
    detach(&mut cmd);
    spawn(cmd, output, interpreter, script)
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

fn base_command(
    interpreter: &str,
    script: &Path,
    cwd: &Path,
) -> Result<(Command, PipeReader), SupervisorError> {
    let pipe_err = |source| SupervisorError::SpawnFailed {
        script: script.to_path_buf(),
        source,
    };
    let (reader, writer) = std::io::pipe().map_err(pipe_err)?;
    let stderr_writer = writer.try_clone().map_err(pipe_err)?;

    let mut cmd = Command::new(interpreter);
    cmd.arg(script)
        .current_dir(cwd)
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr_writer));
    Ok((cmd, reader))
}

// Takes the command by value: the pipe's write ends live inside it and must
// be closed in this process once the child holds its own copies, otherwise
// the reader never sees EOF.
fn spawn(
    mut cmd: Command,
    output: PipeReader,
    interpreter: &str,
    script: &Path,
) -> Result<Spawned, SupervisorError> {
    let child = cmd.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SupervisorError::InterpreterNotFound {
                interpreter: interpreter.to_string(),
                source,
            }
        } else {
            SupervisorError::SpawnFailed {
                script: script.to_path_buf(),
                source,
            }
        }
    })?;
    drop(cmd);
    Ok(Spawned { child, output })
}

/// Ask a child to stop the way Ctrl+C would.
#[cfg(unix)]
pub(crate) fn send_interrupt(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
    if unsafe { libc::kill(pid, libc::SIGINT) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// There is no portable console interrupt for a single child here; callers
/// fall back to killing it.
#[cfg(not(unix))]
pub(crate) fn send_interrupt(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interrupt forwarding is not supported on this platform",
    ))
}

/// Exit code of a finished child; signal deaths map to the negated signal.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
