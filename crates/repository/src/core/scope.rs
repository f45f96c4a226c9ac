//! Call-chain context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, DriverResult};

use super::store::Transaction;

/// Context passed down every repository call.
///
/// A scope carries the ambient transaction (if any), a cancellation token and
/// an optional deadline. Scopes are immutable; the `with_*` methods return
/// derived copies. Only the transaction manager attaches a transaction, so a
/// scope chain holds at most one.
#[derive(Clone, Default)]
pub struct Scope {
    transaction: Option<Arc<dyn Transaction>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("transaction", &self.transaction.as_ref().map(|tx| tx.id().to_string()))
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Scope {
    /// Creates a root scope with no transaction, no deadline and a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a scope observing `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Derives a scope that expires at `deadline`, or earlier if this scope
    /// already has a tighter one.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Derives a scope that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub(crate) fn with_transaction(&self, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            transaction: Some(transaction),
            ..self.clone()
        }
    }

    /// The ambient transaction.
    pub fn transaction(&self) -> Option<&Arc<dyn Transaction>> {
        self.transaction.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails when the scope was cancelled or its deadline has passed.
    pub fn check(&self) -> DriverResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DriverError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
