//! Bounded child-process execution for platform channels.

use log::warn;
use std::io;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(25);

/// Outcome of a bounded child process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessOutcome {
    Exited(Option<i32>),
    TimedOut,
}

/// Spawns `command` with null stdio and waits at most `timeout`.
///
/// The child is killed and reaped when the timeout elapses.
pub(crate) fn run_bounded(command: &mut Command, timeout: Duration) -> io::Result<ProcessOutcome> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let started_at = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ProcessOutcome::Exited(status.code()));
        }
        if started_at.elapsed() >= timeout {
            if let Err(err) = child.kill() {
                warn!("event=channel_process module=notify status=error error_code=kill_failed error={err}");
            }
            let _ = child.wait();
            return Ok(ProcessOutcome::TimedOut);
        }
        thread::sleep(POLL_STEP);
    }
}
