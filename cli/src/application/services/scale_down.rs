//! Application service: drive legacy allocations to zero.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::application::ports::ControlPlane;
use crate::application::services::inventory::current_allocations;
use crate::application::services::poll::{self, convergence_backoff};
use crate::domain::inventory::zero_counts;
use crate::domain::{GroupCounts, Milestone, RecoveryLog};

/// Set every group in `previous` to zero and wait until no current
/// allocation is left running.
///
/// `ScaledToZero` is recorded as soon as the control plane accepts the new
/// counts, before convergence, so a timed-out wait still restores them on
/// rollback.
///
/// # Errors
///
/// Returns [`TimedOut`](crate::domain::TimedOut) when allocations are still
/// running after `limit`, or the control-plane error.
pub async fn scale_to_zero(
    cp: &impl ControlPlane,
    app: &str,
    previous: &GroupCounts,
    lock_id: Option<&str>,
    limit: Duration,
    cancel: &CancellationToken,
    log: &mut RecoveryLog,
) -> Result<()> {
    let zero = zero_counts(previous.keys());
    cp.set_group_counts(app, &zero, lock_id)
        .await
        .with_context(|| format!("scaling legacy allocations of {app} to zero"))?;
    log.record(Milestone::ScaledToZero {
        previous: previous.clone(),
    });

    poll::until(
        "legacy allocations to stop",
        limit,
        convergence_backoff(),
        cancel,
        || async {
            match current_allocations(cp, app).await {
                Ok(allocs) if allocs.is_empty() => Ok(Some(())),
                Ok(allocs) => {
                    tracing::debug!(app, running = allocs.len(), "waiting for legacy scale-down");
                    Ok(None)
                }
                Err(e) => {
                    tracing::debug!(app, error = %e, "allocation listing failed, retrying");
                    Ok(None)
                }
            }
        },
    )
    .await
}
