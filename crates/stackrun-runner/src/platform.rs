//! Process-group signalling.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupSignal {
    Terminate,
    Kill,
}

/// Send `signal` to the process group led by `pid`.
///
/// Errors are ignored: the group may already be gone.
#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if raw <= 0 {
        return;
    }

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(errno) = killpg(Pid::from_raw(raw), signal) {
        tracing::trace!(pid, ?signal, %errno, "process group signal not delivered");
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_group(pid: u32, signal: GroupSignal) {
    // Commands are spawned with kill_on_drop; nothing else to reach here.
    let _ = (pid, signal);
}
