/// Deliver SIGTERM to a process.
#[cfg(unix)]
pub fn terminate(pid: u32) -> std::io::Result<()> {
    send_signal(pid, libc::SIGTERM)
}

/// Deliver SIGKILL to a process. Unlike SIGTERM this cannot be caught or
/// ignored; the kernel reaps the target unconditionally.
#[cfg(unix)]
pub fn kill_hard(pid: u32) -> std::io::Result<()> {
    send_signal(pid, libc::SIGKILL)
}

/// Deliver an arbitrary signal to a process.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: i32) -> std::io::Result<()> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Whether an I/O error from signal delivery means the target is already
/// gone (ESRCH).
#[cfg(unix)]
pub fn no_such_process(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}

/// Probe whether a process exists, without sending a signal.
///
/// Uses `kill(pid, 0)`. EPERM means the process exists but belongs to
/// another user, so it counts as alive.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    nix::errno::Errno::last() == nix::errno::Errno::EPERM
}

/// Arrange for a command to start in its own session, detached from the
/// supervisor's controlling terminal and process group. A daemon launched
/// this way survives a supervisor restart.
///
/// `setsid` cannot fail in the child: `fork` already guarantees the child
/// is not a process group leader.
#[cfg(unix)]
pub fn new_session(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
}
