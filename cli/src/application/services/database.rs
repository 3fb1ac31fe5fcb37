//! Application service: clustered database coordination.
//!
//! Leader detection, read-only toggling, replica health, replication sync,
//! and post-cutover election. Every wait treats "no leader yet" as retryable
//! until its bound runs out.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use hangar_api_types::DbRole;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ControlPlane, DbPeer};
use crate::application::services::poll::{self, Backoff, convergence_backoff};
use crate::domain::database::{REPLICATION_SETTINGS, check_replication_settings, is_synced};

/// Secret the cluster members use to find their coordination store.
pub const COORDINATION_SECRET: &str = "COORDINATION_URL";

/// Address of the first peer reporting the leader role.
///
/// # Errors
///
/// Returns an error if a role query fails or no peer is leader.
pub async fn detect_leader(db: &impl DbPeer, addrs: &[String]) -> Result<String> {
    for addr in addrs {
        let role = db
            .role(addr)
            .await
            .with_context(|| format!("can't get role for {addr}"))?;
        if role == DbRole::Leader {
            return Ok(addr.clone());
        }
    }
    anyhow::bail!("no instances found with leader role")
}

/// Toggle read-only mode on the leader, then restart every other peer's
/// router so clients follow.
///
/// # Errors
///
/// Returns an error if there are no peers, no leader, or any call fails.
pub async fn set_readonly(db: &impl DbPeer, addrs: &[String], enable: bool) -> Result<()> {
    anyhow::ensure!(!addrs.is_empty(), "no private addresses found for database peers");
    let leader = detect_leader(db, addrs).await?;
    if enable {
        db.enable_readonly(&leader).await?;
    } else {
        db.disable_readonly(&leader).await?;
    }
    tracing::info!(leader = %leader, readonly = enable, "database read-only mode changed");
    for addr in addrs.iter().filter(|a| **a != leader) {
        db.restart_router(addr)
            .await
            .with_context(|| format!("restarting router on {addr}"))?;
    }
    Ok(())
}

/// Check the leader can stream to old and new replicas at once.
///
/// # Errors
///
/// Returns [`ValidationError::DatabaseSettings`](crate::domain::ValidationError::DatabaseSettings)
/// when the settings are too low.
pub async fn check_settings(db: &impl DbPeer, addrs: &[String], units: usize) -> Result<()> {
    anyhow::ensure!(!addrs.is_empty(), "no private addresses found for database peers");
    let leader = detect_leader(db, addrs).await?;
    let settings = db.settings(&leader, &REPLICATION_SETTINGS).await?;
    check_replication_settings(&settings, units)?;
    Ok(())
}

/// Database identities of the given peers.
///
/// # Errors
///
/// Returns the first peer that cannot report its identity.
pub async fn db_uids(db: &impl DbPeer, addrs: &[String]) -> Result<Vec<String>> {
    let mut uids = Vec::with_capacity(addrs.len());
    for addr in addrs {
        uids.push(
            db.db_uid(addr)
                .await
                .with_context(|| format!("reading database uid from {addr}"))?,
        );
    }
    Ok(uids)
}

/// Wait until every in-region replica answers with its identity.
///
/// # Errors
///
/// Returns [`TimedOut`](crate::domain::TimedOut) after `limit`.
pub async fn wait_for_healthy(
    db: &impl DbPeer,
    addrs: &[String],
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    poll::until("in-region replicas to become healthy", limit, convergence_backoff(), cancel, || async {
        match db_uids(db, addrs).await {
            Ok(uids) => Ok(Some(uids)),
            Err(e) => {
                tracing::debug!(error = %e, "replicas not healthy yet");
                Ok(None)
            }
        }
    })
    .await
}

/// Wait until at least one of `db_uids` has caught up with the leader.
///
/// # Errors
///
/// Returns [`TimedOut`](crate::domain::TimedOut) after `limit`.
pub async fn wait_for_sync(
    db: &impl DbPeer,
    addrs: &[String],
    db_uids: &[String],
    tick: Duration,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    poll::until("a new replica to be synced", limit, Backoff::fixed(tick), cancel, || async {
        let leader = match detect_leader(db, addrs).await {
            Ok(leader) => leader,
            Err(e) => {
                tracing::debug!(error = %e, "no leader yet");
                return Ok(None);
            }
        };
        let stats = db.replication_stats(&leader).await?;
        Ok(is_synced(&stats, db_uids).then_some(()))
    })
    .await
}

/// Hand leadership to a synced replica before the legacy peers go away.
/// Best-effort: the scale-down forces an election anyway.
pub async fn hand_over_leadership(db: &impl DbPeer, legacy_addrs: &[String]) {
    let leader = match detect_leader(db, legacy_addrs).await {
        Ok(leader) => leader,
        Err(e) => {
            tracing::debug!(error = %e, "no legacy leader to fail over");
            return;
        }
    };
    if let Err(e) = db.failover(&leader).await {
        tracing::warn!(leader = %leader, error = %e, "failover request failed");
    }
}

/// Wait until the new cluster has elected a leader and writes are enabled.
///
/// # Errors
///
/// Returns [`TimedOut`](crate::domain::TimedOut) after `limit`.
pub async fn wait_for_election(
    db: &impl DbPeer,
    addrs: &[String],
    tick: Duration,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    poll::until("a database leader to be elected", limit, Backoff::fixed(tick), cancel, || async {
        match set_readonly(db, addrs, false).await {
            Ok(()) => Ok(Some(())),
            Err(e) => {
                tracing::debug!(error = %e, "election not finished");
                Ok(None)
            }
        }
    })
    .await
}

/// Make sure the coordination secret is set so new members join the same
/// cluster. Returns `false` when it is missing and no URL is known.
///
/// # Errors
///
/// Returns an error if secrets cannot be listed or set.
pub async fn ensure_coordination_secret(
    cp: &impl ControlPlane,
    app: &str,
    url: Option<&str>,
) -> Result<bool> {
    let names = cp.list_secrets(app).await?;
    if names.iter().any(|n| n == COORDINATION_SECRET) {
        return Ok(true);
    }
    let Some(url) = url else {
        return Ok(false);
    };
    let secrets = BTreeMap::from([(COORDINATION_SECRET.to_string(), url.to_string())]);
    cp.set_secrets(app, &secrets)
        .await
        .context("setting the coordination secret")?;
    Ok(true)
}
