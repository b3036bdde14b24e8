//! Cooperative per-run timeout: a one-shot timer thread that signals a
//! stuck target (SPEC_FULL.md §4.10). Grounded on
//! `examples/original_source/analyzer/pin.py`'s `PinRunner.set_alarm`/
//! `handler`.
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Arms a background timer against a running child process. If `timeout`
/// elapses before the watchdog is either cancelled or told the process
/// already exited, it sends `SIGUSR2` to `pid` — the signal the traced
/// target's instrumentation handles as "dump what you have and stop".
///
/// The timer thread waits on a channel instead of sleeping, so `cancel`
/// can wake it immediately rather than blocking for the rest of `timeout`.
pub struct Watchdog {
    exited: Arc<AtomicBool>,
    wake: SyncSender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    pub fn arm(pid: i32, timeout: Duration) -> Self {
        let exited = Arc::new(AtomicBool::new(false));
        let exited_timer = exited.clone();
        // Capacity 1, not 0: `cancel` must not lose its wake if it runs
        // before the timer thread reaches `recv_timeout`.
        let (wake, parked) = sync_channel::<()>(1);

        let handle = thread::spawn(move || {
            // `cancel` sends on `wake`; letting the timeout elapse without a
            // send is the normal "fire the signal" path.
            match parked.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            // mirrors `PinRunner.handler`'s `if self.process.poll() != None: return`
            if exited_timer.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGUSR2) {
                log::warn!("failed to signal timed-out process {pid}: {err}");
            }
        });

        Self { exited, wake, handle }
    }

    /// Records that the watched process already exited on its own, so a
    /// timer firing afterward is a no-op.
    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    /// Cancels the timer and waits for its thread to finish. Safe to call
    /// whether or not the timer already fired; returns promptly either way.
    pub fn cancel(self) {
        let _ = self.wake.try_send(());
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn cancel_before_timeout_returns_promptly() {
        let watchdog = Watchdog::arm(999_999, Duration::from_secs(5));
        let start = Instant::now();
        watchdog.cancel();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn mark_exited_suppresses_signal_after_fire() {
        // pid 999_999 is assumed not to exist; kill() will harmlessly error
        // (ESRCH) if the guard fails to suppress it, which this test can't
        // directly observe, but must not panic either way.
        let watchdog = Watchdog::arm(999_999, Duration::from_millis(20));
        watchdog.mark_exited();
        thread::sleep(Duration::from_millis(60));
        watchdog.cancel();
    }
}
