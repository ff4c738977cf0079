//! Worker thread helpers shared by the speech queue and the listening loop
//!
//! Workers are plain `std::thread`s. Each one holds an exit sender that is
//! dropped when the thread body returns (or unwinds), which lets the owner
//! wait for it with a deadline instead of an unbounded `join`.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Signal carried by the exit channel; never actually sent
#[derive(Debug, Clone, Copy)]
pub struct WorkerExited;

/// Handle to a named worker thread that can be joined with a timeout
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    exit_rx: Receiver<WorkerExited>,
}

impl Worker {
    /// Spawn `body` on a new named thread
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_tx, exit_rx): (Sender<WorkerExited>, Receiver<WorkerExited>) = bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Dropped on return or unwind; disconnects the owner's receiver
                let _exit_guard = exit_tx;
                body();
            })?;

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            exit_rx,
        })
    }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// Returns true if the thread was joined. On timeout the thread is
    /// detached and false is returned.
    pub fn join_timeout(mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.exit_rx.recv_timeout(timeout) {
            Ok(WorkerExited) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Worker '{}' panicked", self.name);
                }
                log::debug!("Worker '{}' joined", self.name);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Worker '{}' did not exit within {:?}, detaching",
                    self.name,
                    timeout
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_join_timeout_joins_finished_worker() {
        let worker = Worker::spawn("quick", || {}).unwrap();
        assert!(worker.join_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_join_timeout_gives_up_on_stuck_worker() {
        let (release_tx, release_rx) = bounded::<()>(1);
        let worker = Worker::spawn("stuck", move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        let started = Instant::now();
        assert!(!worker.join_timeout(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
        let _ = release_tx.send(());
    }

    #[test]
    fn test_join_timeout_survives_panicking_worker() {
        let worker = Worker::spawn("panicky", || panic!("boom")).unwrap();
        assert!(worker.join_timeout(Duration::from_secs(1)));
    }
}
