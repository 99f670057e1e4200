//! Background job abstraction for one migration run.
//!
//! The run executes on a dedicated OS thread, but not as a bare detached
//! thread: [`MigrationJob`] carries a cancellation signal and a completion
//! notification so callers (and tests) can await the run deterministically
//! instead of polling.
//!
//! Cancellation is honored *between* items only; an external command
//! already in flight runs to completion or failure. There is no
//! orchestrator-level timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, bounded};
use tracing::debug;

/// Cooperative cancellation signal handed to the job body.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a running (or finished) migration job.
#[derive(Debug)]
pub struct MigrationJob {
    cancel: Arc<AtomicBool>,
    // Completion is signalled by channel disconnection: the sender lives
    // on the job thread and drops when the body returns, panics included.
    done: Receiver<()>,
}

impl MigrationJob {
    /// Spawn the job body on its own thread.
    pub(crate) fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let token = CancelToken(cancel.clone());
        let (done_tx, done_rx) = bounded::<()>(0);

        std::thread::spawn(move || {
            let _done_tx = done_tx;
            body(token);
        });

        Self {
            cancel,
            done: done_rx,
        }
    }

    /// Request a stop. Takes effect before the next item starts.
    pub fn cancel(&self) {
        debug!("migration job cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until the job finishes.
    pub fn wait(&self) {
        let _ = self.done.recv();
    }

    /// Block up to `timeout`; returns whether the job finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}
