use std::future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Creates a linked canceller/scope pair. The scope can be cloned freely and
/// handed to connection tasks; the canceller flips every clone at once.
pub fn cancel_scope() -> (Canceller, CancelScope) {
    let (tx, rx) = watch::channel(false);
    (
        Canceller { tx },
        CancelScope {
            rx,
            deadline: None,
        },
    )
}

/// Owning side of a cancellation scope.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cooperative cancellation scope, optionally bounded by a deadline.
///
/// Scopes are observed, never enforced: I/O wrappers and handlers check
/// [`CancelScope::is_cancelled`] or await [`CancelScope::cancelled`] at their
/// own suspension points. Deriving a child with [`CancelScope::with_deadline`]
/// keeps the parent's cancellation signal and adds a wall-clock bound.
#[derive(Debug, Clone)]
pub struct CancelScope {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// A scope that never cancels and carries no deadline.
    pub fn unbounded() -> CancelScope {
        // The sender is dropped immediately; `cancelled` treats the closed
        // channel as never-firing.
        let (_tx, rx) = watch::channel(false);
        CancelScope {
            rx,
            deadline: None,
        }
    }

    /// Child scope sharing this scope's cancellation signal with an absolute
    /// deadline. The earlier of the two deadlines wins.
    pub fn with_deadline(&self, deadline: Instant) -> CancelScope {
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(deadline)),
            None => Some(deadline),
        };
        CancelScope {
            rx: self.rx.clone(),
            deadline,
        }
    }

    /// Child scope that expires `after` from now.
    pub fn with_timeout(&self, after: Duration) -> CancelScope {
        self.with_deadline(Instant::now() + after)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.rx.borrow() {
            return true;
        }
        self.deadline
            .map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let flagged = async move {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                // The canceller was dropped without firing; only the
                // deadline can end this scope now.
                future::pending::<()>().await;
            }
        };
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flagged => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => flagged.await,
        }
    }
}
