//! Shared cancellation for one build.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BuildError, Result};

/// Cloneable cancellation flag.
///
/// Besides the flag, the token owns a channel that never carries a message:
/// canceling drops its sender, so `recv` on [`CancelToken::receiver`] becomes
/// ready and a worker blocked in `select!` wakes up.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    canceled: AtomicBool,
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Cancel every holder of this token. Idempotent.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        self.inner.tx.lock().take();
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Relaxed)
    }

    /// Ready (disconnected) once the token is canceled.
    #[inline]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    /// `Err(Canceled)` once canceled; used between stages.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(BuildError::Canceled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fresh_token() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        assert!(token.check().is_ok());
        assert!(token.receiver().try_recv().unwrap_err().is_empty());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        clone.cancel();

        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(BuildError::Canceled)));
    }

    #[test]
    fn test_cancel_wakes_blocked_receiver() {
        let token = CancelToken::new();
        let (_jobs_tx, jobs) = channel::unbounded::<u32>();

        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                crossbeam::select! {
                    recv(jobs) -> _ => "job",
                    recv(token.receiver()) -> _ => "canceled",
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(waiter.join().unwrap(), "canceled");
    }
}
