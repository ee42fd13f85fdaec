//! Job cancellation tokens
//!
//! Every long-running job carries a token; the worker checks it between
//! pipeline stages (decode, separate, mix, encode) and aborts with a typed
//! `Cancelled` failure. Partial artifacts are removed by the stage that
//! created them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SegueError};

/// Shared cancellation flag for one job
#[derive(Debug, Clone, Default)]
pub struct JobToken {
    cancelled: Arc<AtomicBool>,
}

impl JobToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the job to abort at its next stage boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Bail out with `Cancelled` if the token has been signalled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SegueError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_live() {
        let token = JobToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let token = JobToken::new();
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(SegueError::Cancelled)));
    }
}
