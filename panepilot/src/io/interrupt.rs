//! Ctrl-C to cancellation-token bridge.
//!
//! Each independent operation (a turn, a busy-wait continuation, a watch poll)
//! runs under its own token. [`CancelScope`] holds the current one; a Ctrl-C
//! cancels whatever is current and the next operation gets a fresh token.

use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh token and return it.
    pub fn fresh(&self) -> CancellationToken {
        let token = CancellationToken::new();
        match self.current.lock() {
            Ok(mut current) => *current = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }
        token
    }

    /// Cancel the current token.
    pub fn cancel_current(&self) {
        let token = match self.current.lock() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.cancel();
    }

    /// Cancel the current token on every Ctrl-C, from a background thread.
    pub fn listen_for_ctrl_c(&self) -> Result<()> {
        let scope = self.clone();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build signal runtime")?;
        thread::Builder::new()
            .name("ctrl-c".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        if let Err(err) = tokio::signal::ctrl_c().await {
                            warn!(err = %err, "ctrl-c listener stopped");
                            return;
                        }
                        debug!("ctrl-c received, cancelling current operation");
                        scope.cancel_current();
                    }
                });
            })
            .context("spawn ctrl-c listener")?;
        Ok(())
    }
}
