use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::job::{JobHandle, JobId, JobRole};
use crate::platform::{GroupSignal, signal_group};
use crate::sink::LineSink;
use crate::supervisor::ProcessSupervisor;
use crate::CommandSpec;

/// How long output is still read after the command itself has exited.
pub const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// Run `cmd` to completion, streaming its stdout and stderr into `sink`.
///
/// The child leads its own process group and is registered with the
/// supervisor for as long as it runs. If this future is dropped before the
/// child exits, the whole group is killed.
///
/// The command is finished when the child exits; output still arriving
/// afterwards is read for at most [`OUTPUT_DRAIN`].
///
/// Returns the exit status; a child ended by a signal reports `128 + signal`.
pub async fn run_streaming(
    cmd: &CommandSpec,
    sink: &LineSink,
    supervisor: &ProcessSupervisor,
) -> Result<i32, RunnerError> {
    let program = cmd.program_name();

    let mut command = cmd.to_tokio_command();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunnerError::ProgramNotFound {
                program: program.clone(),
            }
        } else {
            RunnerError::SpawnFailed {
                program: program.clone(),
                reason: e.to_string(),
            }
        }
    })?;

    let pid = child.id().unwrap_or_default();
    let finished = CancellationToken::new();
    let id = supervisor.register(
        JobRole::Command,
        cmd.to_string(),
        JobHandle::Process {
            pid,
            finished: finished.clone(),
        },
    );
    let mut guard = CommandGuard {
        supervisor,
        id,
        pid,
        finished,
        reaped: false,
    };

    tracing::debug!(pid, command = %cmd, "spawned command");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let readers = async {
        tokio::join!(forward_lines(stdout, sink), forward_lines(stderr, sink));
    };
    tokio::pin!(readers);

    let (status, drained) = tokio::select! {
        status = child.wait() => (status, false),
        () = &mut readers => (child.wait().await, true),
    };
    // A backgrounded descendant may keep the pipes open indefinitely.
    if !drained && tokio::time::timeout(OUTPUT_DRAIN, &mut readers).await.is_err() {
        tracing::debug!(
            pid,
            command = %cmd,
            "output still open after exit; leaving it to the descendants"
        );
    }
    let status = status.map_err(|e| RunnerError::WaitFailed {
        program,
        reason: e.to_string(),
    })?;
    guard.reaped = true;

    Ok(status_code(status))
}

async fn forward_lines<R>(stream: Option<R>, sink: &LineSink)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                sink.line(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading command output");
                break;
            }
        }
    }
}

fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Keeps the supervisor's view of a running command accurate on every exit
/// path, including cancellation of the owning future.
struct CommandGuard<'a> {
    supervisor: &'a ProcessSupervisor,
    id: JobId,
    pid: u32,
    finished: CancellationToken,
    reaped: bool,
}

impl Drop for CommandGuard<'_> {
    fn drop(&mut self) {
        if !self.reaped {
            signal_group(self.pid, GroupSignal::Kill);
        }
        self.finished.cancel();
        self.supervisor.release(self.id);
    }
}
