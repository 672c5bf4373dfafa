//! Cooperative cancellation on Ctrl-C and SIGTERM
//!
//! A signal only sets a flag. Long loops poll it between steps and return
//! [`BenchError::Interrupted`], so the error unwinds through the same guards
//! as any other failure: staged builds are discarded and the working tree is
//! put back on its branch. A second signal exits at once.

use crate::error::{BenchError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit status for a second interrupt (128 + SIGINT)
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; returns whether it had already been requested
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(BenchError::Interrupted);
        }
        Ok(())
    }

    /// Cancel this token on SIGINT or SIGTERM.
    ///
    /// Can only be installed once per process.
    pub fn install_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.cancel() {
                std::process::exit(FORCED_EXIT_CODE);
            }
            tracing::warn!("interrupted; cleaning up (interrupt again to exit immediately)");
        })
        .map_err(|e| BenchError::io("installing interrupt handler", std::io::Error::other(e)))
    }
}
