//! Critical-section guards for `create_snapshot_set` (spec §4.2 step 5, §5):
//! termination signals are blocked and journal flushing to `/var` is
//! suspended for the duration of snapshot creation, both released on every
//! exit path including early returns and panics.

use std::process::Command;

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};

use snapm_core::{Error, Result};

const JOURNALCTL_CMD: &str = "journalctl";

fn run_journalctl(args: &[&str]) -> Result<()> {
    let output = Command::new(JOURNALCTL_CMD)
        .args(args)
        .output()
        .map_err(|e| Error::callout(format!("failed to spawn {JOURNALCTL_CMD}: {e}")))?;
    if !output.status.success() {
        return Err(Error::callout(format!(
            "{JOURNALCTL_CMD} {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Suspends journal writes to `/var` for as long as it lives, resuming them
/// on drop regardless of how the critical section exits.
pub struct JournalGuard;

impl JournalGuard {
    /// Flushes the journal then relinquishes its `/var` storage, so nothing
    /// writes to the volume being snapshotted until the guard drops.
    pub fn suspend() -> Result<Self> {
        run_journalctl(&["--flush"])?;
        run_journalctl(&["--relinquish-var"])?;
        Ok(JournalGuard)
    }
}

impl Drop for JournalGuard {
    fn drop(&mut self) {
        if let Err(err) = run_journalctl(&["--flush"]) {
            tracing::error!(error = %err, "failed to resume journal writes to /var");
        }
    }
}

/// Blocks `SIGINT`/`SIGTERM` delivery to the calling thread for as long as it
/// lives, unblocking (and thereby delivering any pending signal) on drop.
pub struct SignalGuard {
    mask: SigSet,
}

impl SignalGuard {
    pub fn block() -> Result<Self> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGINT);
        mask.add(Signal::SIGTERM);
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)
            .map_err(|errno| Error::system(format!("sigprocmask(SIG_BLOCK) failed: {errno}")))?;
        Ok(SignalGuard { mask })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Err(errno) = pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&self.mask), None) {
            tracing::error!(error = %errno, "failed to unblock SIGINT/SIGTERM");
        }
    }
}
