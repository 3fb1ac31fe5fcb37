//! App lock and per-machine lease handling.
//!
//! The app lock serializes migrations against one app. Machine leases guard
//! every mutation of a created machine and are kept alive by a background
//! task until [`LeaseSet::release_all`] (or drop) stops it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hangar_api_types::{AppLock, Machine};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ControlPlane, FleetApi};

// ── App lock ──────────────────────────────────────────────────────────────────

/// Take the app lock.
///
/// # Errors
///
/// Propagates [`LockError`](crate::domain::LockError) unchanged when another
/// holder exists, so the caller can stop before any other step.
pub async fn acquire_app_lock(cp: &impl ControlPlane, app: &str) -> Result<AppLock> {
    let lock = cp.lock_app(app).await?;
    tracing::info!(app, lock_id = %lock.lock_id, "app locked");
    Ok(lock)
}

/// Release the app lock.
///
/// # Errors
///
/// Returns an error if the control plane rejects the unlock.
pub async fn release_app_lock(cp: &impl ControlPlane, app: &str, lock_id: &str) -> Result<()> {
    cp.unlock_app(app, lock_id)
        .await
        .with_context(|| format!("unlocking app {app}"))?;
    tracing::info!(app, lock_id, "app unlocked");
    Ok(())
}

// ── Machine leases ────────────────────────────────────────────────────────────

/// Release one lease. Never fails: an unheld or expired lease is logged and
/// ignored.
pub async fn release_lease(fleet: &impl FleetApi, app: &str, machine_id: &str, nonce: &str) {
    if let Err(e) = fleet.release_lease(app, machine_id, nonce).await {
        tracing::warn!(app, machine_id, error = %e, "failed to release machine lease");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeldLease {
    machine_id: String,
    nonce: String,
}

/// Leases held on a set of machines, with an optional refresh task.
pub struct LeaseSet<F: FleetApi + 'static> {
    fleet: Arc<F>,
    app: String,
    ttl: Duration,
    held: Arc<Mutex<Vec<HeldLease>>>,
    refresher: Option<(CancellationToken, JoinHandle<()>)>,
}

impl<F: FleetApi + 'static> LeaseSet<F> {
    /// Acquire a lease on every machine, in order.
    ///
    /// # Errors
    ///
    /// Returns the first acquisition error after releasing the leases already
    /// taken.
    pub async fn acquire(fleet: Arc<F>, app: &str, machines: &[Machine], ttl: Duration) -> Result<Self> {
        let mut held = Vec::with_capacity(machines.len());
        for machine in machines {
            match fleet.acquire_lease(app, &machine.id, ttl).await {
                Ok(lease) => held.push(HeldLease {
                    machine_id: machine.id.clone(),
                    nonce: lease.nonce,
                }),
                Err(e) => {
                    for lease in &held {
                        release_lease(fleet.as_ref(), app, &lease.machine_id, &lease.nonce).await;
                    }
                    return Err(e).with_context(|| format!("acquiring lease on machine {}", machine.id));
                }
            }
        }
        tracing::debug!(app, count = held.len(), "machine leases acquired");
        Ok(Self {
            fleet,
            app: app.to_string(),
            ttl,
            held: Arc::new(Mutex::new(held)),
            refresher: None,
        })
    }

    /// Start refreshing every held lease each `interval` until released.
    pub fn start_refresh(&mut self, interval: Duration) {
        if self.refresher.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let stop = token.clone();
        let fleet = Arc::clone(&self.fleet);
        let held = Arc::clone(&self.held);
        let app = self.app.clone();
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let mut leases = held.lock().await;
                for lease in leases.iter_mut() {
                    match fleet.refresh_lease(&app, &lease.machine_id, &lease.nonce, ttl).await {
                        Ok(fresh) => lease.nonce = fresh.nonce,
                        Err(e) => tracing::warn!(
                            app = %app,
                            machine_id = %lease.machine_id,
                            error = %e,
                            "failed to refresh machine lease"
                        ),
                    }
                }
            }
        });
        self.refresher = Some((token, handle));
    }

    /// Current nonce for a machine's lease.
    pub async fn nonce(&self, machine_id: &str) -> Option<String> {
        self.held
            .lock()
            .await
            .iter()
            .find(|l| l.machine_id == machine_id)
            .map(|l| l.nonce.clone())
    }

    /// Number of leases still held.
    pub async fn held_count(&self) -> usize {
        self.held.lock().await.len()
    }

    /// Stop refreshing and release every lease exactly once. Calling this
    /// again is a no-op.
    pub async fn release_all(&mut self) {
        if let Some((token, handle)) = self.refresher.take() {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "lease refresher ended abnormally");
            }
        }
        let drained: Vec<HeldLease> = std::mem::take(&mut *self.held.lock().await);
        for lease in drained {
            release_lease(self.fleet.as_ref(), &self.app, &lease.machine_id, &lease.nonce).await;
        }
    }
}

impl<F: FleetApi + 'static> Drop for LeaseSet<F> {
    fn drop(&mut self) {
        if let Some((token, _)) = &self.refresher {
            token.cancel();
        }
    }
}
