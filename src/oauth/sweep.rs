//! Periodic expiry sweep for the code and token stores.
//!
//! Best-effort housekeeping on an independent timer; redemption and lookup
//! enforce expiry themselves, so a delayed or cancelled sweep only costs
//! memory, never correctness.

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::debug;

use super::{CodeStore, TokenStore};

/// Spawn the sweep loop. The returned handle can be dropped; the task keeps
/// running for the lifetime of the runtime.
pub fn spawn_expiry_sweep(
    codes: Arc<CodeStore>,
    tokens: Arc<TokenStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            let now = Utc::now();
            let purged_codes = codes.purge_expired(now).await;
            let purged_tokens = tokens.purge_expired(now).await;
            if purged_codes > 0 || purged_tokens > 0 {
                debug!(purged_codes, purged_tokens, "expiry sweep completed");
            }
        }
    })
}
