//! Periodic cleanup
//!
//! `CleanupService` performs one pass over the store; `CleanupScheduler`
//! owns the background loop that repeats it. Passes:
//! 1. active profiles whose plan expired become `expired`
//! 2. expired upgrades are dropped
//! 3. stale drafts without a pending or paid invoice are deleted
//! 4. stale pending invoices are cancelled
//! 5. revoked sessions past their expiry are forgotten

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::session::SessionManager;
use crate::models::{InvoiceStatus, ProfileStatus};
use crate::store::Store;
use crate::utils::constants::{
    DEFAULT_DRAFT_TTL_HOURS, DEFAULT_PENDING_INVOICE_TTL_HOURS, SETTING_DRAFT_TTL_HOURS,
    SETTING_PENDING_INVOICE_TTL_HOURS,
};

/// What a single pass changed
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CleanupReport {
    pub started_at: Option<DateTime<Utc>>,
    pub expired_profiles: usize,
    pub expired_upgrades: usize,
    pub deleted_drafts: usize,
    pub cancelled_invoices: usize,
    pub purged_sessions: usize,
    pub duration_ms: u64,
}

impl CleanupReport {
    pub fn total_changes(&self) -> usize {
        self.expired_profiles
            + self.expired_upgrades
            + self.deleted_drafts
            + self.cancelled_invoices
            + self.purged_sessions
    }
}

pub struct CleanupService {
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
}

impl CleanupService {
    pub fn new(store: Arc<Store>, sessions: Arc<SessionManager>) -> Self {
        Self { store, sessions }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn run(&self, now: DateTime<Utc>) -> CleanupReport {
        let start = Instant::now();
        let mut report = CleanupReport {
            started_at: Some(now),
            ..Default::default()
        };

        report.expired_profiles = self.expire_plans(now);
        report.expired_upgrades = self.expire_upgrades(now);
        report.deleted_drafts = self.delete_stale_drafts(now);
        report.cancelled_invoices = self.cancel_stale_invoices(now);
        report.purged_sessions = self.sessions.purge_revoked(now);
        report.duration_ms = start.elapsed().as_millis() as u64;

        if report.total_changes() > 0 {
            info!(
                expired_profiles = report.expired_profiles,
                expired_upgrades = report.expired_upgrades,
                deleted_drafts = report.deleted_drafts,
                cancelled_invoices = report.cancelled_invoices,
                purged_sessions = report.purged_sessions,
                "🧹 Cleanup pass finished"
            );
        } else {
            debug!("Cleanup pass finished, nothing to do");
        }
        report
    }

    /// `now` minus the TTL setting in hours; out-of-range values use the default
    fn cutoff(&self, now: DateTime<Utc>, key: &str, default_hours: u64) -> DateTime<Utc> {
        let hours_ago = |hours: u64| {
            i64::try_from(hours)
                .ok()
                .and_then(ChronoDuration::try_hours)
                .and_then(|ttl| now.checked_sub_signed(ttl))
        };

        let hours = self.store.setting_u64(key, default_hours);
        hours_ago(hours)
            .or_else(|| {
                warn!(key, hours, "TTL setting out of range, using default");
                hours_ago(default_hours)
            })
            .unwrap_or(now)
    }

    fn expire_plans(&self, now: DateTime<Utc>) -> usize {
        let lapsed = self.store.profiles.filter(|p| {
            p.status == ProfileStatus::Active && p.plan.as_ref().map_or(true, |a| !a.is_current(now))
        });

        let mut count = 0;
        for profile in lapsed {
            let result = self.store.profiles.update(&profile.id, |p| {
                p.status = ProfileStatus::Expired;
                p.plan = None;
                p.upgrades.clear();
                p.updated_at = now;
                Ok(())
            });
            match result {
                Ok(_) => count += 1,
                Err(e) => warn!(profile = %profile.id, "Failed to expire profile: {}", e),
            }
        }
        count
    }

    fn expire_upgrades(&self, now: DateTime<Utc>) -> usize {
        let holders = self
            .store
            .profiles
            .filter(|p| p.upgrades.iter().any(|u| u.expires_at <= now));

        let mut count = 0;
        for profile in holders {
            let result = self.store.profiles.update(&profile.id, |p| {
                let before = p.upgrades.len();
                p.upgrades.retain(|u| u.expires_at > now);
                count += before - p.upgrades.len();
                p.updated_at = now;
                Ok(())
            });
            if let Err(e) = result {
                warn!(profile = %profile.id, "Failed to drop expired upgrades: {}", e);
            }
        }
        count
    }

    fn delete_stale_drafts(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now, SETTING_DRAFT_TTL_HOURS, DEFAULT_DRAFT_TTL_HOURS);

        let stale = self
            .store
            .profiles
            .filter(|p| p.status == ProfileStatus::Draft && p.created_at < cutoff);

        let mut count = 0;
        for profile in stale {
            let has_open_invoice = self.store.invoices.any(|i| {
                i.profile_id == profile.id
                    && matches!(i.status, InvoiceStatus::Pending | InvoiceStatus::Paid)
            });
            if has_open_invoice {
                continue;
            }
            if self.store.delete_profile(&profile.id).is_some() {
                debug!(profile = %profile.id, slug = %profile.slug, "Deleted stale draft");
                count += 1;
            }
        }
        count
    }

    fn cancel_stale_invoices(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(
            now,
            SETTING_PENDING_INVOICE_TTL_HOURS,
            DEFAULT_PENDING_INVOICE_TTL_HOURS,
        );

        let stale = self
            .store
            .invoices
            .filter(|i| i.status == InvoiceStatus::Pending && i.created_at < cutoff);

        let mut count = 0;
        for invoice in stale {
            let result = self.store.invoices.update(&invoice.id, |i| {
                if i.status == InvoiceStatus::Pending {
                    i.status = InvoiceStatus::Cancelled;
                    i.cancelled_at = Some(now);
                }
                Ok(())
            });
            match result {
                Ok(i) if i.status == InvoiceStatus::Cancelled => count += 1,
                Ok(_) => {}
                Err(e) => warn!(invoice = %invoice.number, "Failed to cancel invoice: {}", e),
            }
        }
        count
    }
}

/// Scheduler state exposed over the API
#[derive(Debug, Clone, Serialize)]
pub struct CleanupStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub total_runs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<CleanupReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Background loop: stopped -> running -> stopped.
///
/// The next pass is scheduled only after the previous one has finished, and
/// manual runs take the same lock, so passes never overlap.
pub struct CleanupScheduler {
    service: Arc<CleanupService>,
    interval: Duration,
    snapshot_path: Option<PathBuf>,
    running: AtomicBool,
    total_runs: AtomicU64,
    last_run: Mutex<Option<CleanupReport>>,
    next_run_at: Mutex<Option<DateTime<Utc>>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    run_lock: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CleanupScheduler {
    pub fn new(service: Arc<CleanupService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            snapshot_path: None,
            running: AtomicBool::new(false),
            total_runs: AtomicU64::new(0),
            last_run: Mutex::new(None),
            next_run_at: Mutex::new(None),
            stop_tx: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Save a store snapshot after every pass
    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns false when the loop is already running
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *lock(&self.stop_tx) = Some(stop_tx);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_loop(stop_rx).await;
        });

        info!("🧹 Cleanup scheduler started (every {}s)", self.interval.as_secs());
        true
    }

    /// Returns false when the loop is already stopped
    pub fn stop(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        if let Some(stop_tx) = lock(&self.stop_tx).take() {
            let _ = stop_tx.send(true);
        }
        *lock(&self.next_run_at) = None;
        info!("🛑 Cleanup scheduler stopped");
        true
    }

    async fn run_loop(&self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() {
                break;
            }
            self.run_now().await;

            {
                // `stop` clears this under the same lock after flipping `running`
                let mut next_run_at = lock(&self.next_run_at);
                if !self.is_running() {
                    break;
                }
                *next_run_at = ChronoDuration::from_std(self.interval)
                    .ok()
                    .and_then(|interval| Utc::now().checked_add_signed(interval));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop_rx.changed() => {
                    // A dropped sender means the scheduler was stopped
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Cleanup loop exited");
    }

    /// Stop the loop and wait for an in-flight pass to finish
    pub async fn shutdown(&self) {
        self.stop();
        let _guard = self.run_lock.lock().await;
        debug!("No cleanup pass in flight");
    }

    /// Run one pass now, waiting for any pass already in progress
    pub async fn run_now(&self) -> CleanupReport {
        let _guard = self.run_lock.lock().await;

        let report = self.service.run(Utc::now());
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_run) = Some(report.clone());

        if let Some(path) = &self.snapshot_path {
            let store = Arc::clone(self.service.store());
            let path = path.clone();
            match tokio::task::spawn_blocking(move || store.save(&path)).await {
                Ok(Ok(count)) => debug!("Snapshot saved after cleanup ({} documents)", count),
                Ok(Err(e)) => warn!("Snapshot after cleanup failed: {}", e),
                Err(e) => warn!("Snapshot task failed: {}", e),
            }
        }
        report
    }

    pub fn status(&self) -> CleanupStatus {
        CleanupStatus {
            running: self.is_running(),
            interval_secs: self.interval.as_secs(),
            total_runs: self.total_runs.load(Ordering::Relaxed),
            last_run: lock(&self.last_run).clone(),
            next_run_at: *lock(&self.next_run_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConfigParameter, Invoice, PlanAssignment, Profile, ProfileVerification, UpgradeAssignment,
        User, AuthProvider,
    };
    use uuid::Uuid;

    fn service() -> (Arc<Store>, Arc<SessionManager>, CleanupService) {
        let store = Arc::new(Store::new());
        let sessions = Arc::new(SessionManager::new(
            b"cleanup-secret",
            Duration::from_secs(3600),
            store.clone(),
        ));
        let service = CleanupService::new(store.clone(), sessions.clone());
        (store, sessions, service)
    }

    fn profile(store: &Store, slug: &str, status: ProfileStatus, created_at: DateTime<Utc>) -> Profile {
        let profile = store
            .profiles
            .insert(Profile {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                display_name: slug.to_string(),
                slug: slug.to_string(),
                bio: String::new(),
                category: "cleaning".to_string(),
                city: "Porto".to_string(),
                phone: None,
                contact_email: None,
                images: vec![],
                status,
                plan: None,
                upgrades: vec![],
                verified: false,
                created_at,
                updated_at: created_at,
            })
            .unwrap();
        store
            .verifications
            .insert(ProfileVerification::new(profile.id, created_at))
            .unwrap();
        profile
    }

    fn invoice(store: &Store, profile_id: Uuid, status: InvoiceStatus, created_at: DateTime<Utc>) -> Invoice {
        store
            .invoices
            .insert(Invoice {
                id: Uuid::new_v4(),
                number: store.next_invoice_number(created_at),
                user_id: Uuid::new_v4(),
                profile_id,
                items: vec![],
                subtotal: 10.0,
                discount: 0.0,
                total: 10.0,
                coupon_code: None,
                coupon_id: None,
                status,
                created_at,
                paid_at: None,
                cancelled_at: None,
            })
            .unwrap()
    }

    #[test]
    fn test_expires_lapsed_plans() {
        let (store, _, service) = service();
        let now = Utc::now();
        let p = profile(&store, "lapsed", ProfileStatus::Active, now);
        store
            .profiles
            .update(&p.id, |p| {
                p.plan = Some(PlanAssignment {
                    plan_id: Uuid::new_v4(),
                    plan_name: "Pro".to_string(),
                    started_at: now - ChronoDuration::days(31),
                    expires_at: now - ChronoDuration::days(1),
                });
                p.upgrades.push(UpgradeAssignment {
                    upgrade_id: Uuid::new_v4(),
                    upgrade_name: "Featured".to_string(),
                    expires_at: now + ChronoDuration::days(3),
                });
                Ok(())
            })
            .unwrap();

        let report = service.run(now);
        assert_eq!(report.expired_profiles, 1);

        let p = store.profiles.get(&p.id).unwrap();
        assert_eq!(p.status, ProfileStatus::Expired);
        assert!(p.plan.is_none());
        assert!(p.upgrades.is_empty());
    }

    #[test]
    fn test_drops_expired_upgrades_only() {
        let (store, _, service) = service();
        let now = Utc::now();
        let p = profile(&store, "upgraded", ProfileStatus::Active, now);
        store
            .profiles
            .update(&p.id, |p| {
                p.plan = Some(PlanAssignment {
                    plan_id: Uuid::new_v4(),
                    plan_name: "Pro".to_string(),
                    started_at: now,
                    expires_at: now + ChronoDuration::days(20),
                });
                for days in [-1, 5] {
                    p.upgrades.push(UpgradeAssignment {
                        upgrade_id: Uuid::new_v4(),
                        upgrade_name: format!("u{}", days),
                        expires_at: now + ChronoDuration::days(days),
                    });
                }
                Ok(())
            })
            .unwrap();

        let report = service.run(now);
        assert_eq!(report.expired_profiles, 0);
        assert_eq!(report.expired_upgrades, 1);
        let p = store.profiles.get(&p.id).unwrap();
        assert_eq!(p.status, ProfileStatus::Active);
        assert_eq!(p.upgrades.len(), 1);
    }

    #[test]
    fn test_deletes_stale_drafts_without_invoices() {
        let (store, _, service) = service();
        let now = Utc::now();
        let old = now - ChronoDuration::hours(DEFAULT_DRAFT_TTL_HOURS as i64 + 1);

        let stale = profile(&store, "stale", ProfileStatus::Draft, old);
        let fresh = profile(&store, "fresh", ProfileStatus::Draft, now);
        let awaiting = profile(&store, "awaiting", ProfileStatus::Draft, old);
        invoice(&store, awaiting.id, InvoiceStatus::Pending, now);

        let report = service.run(now);
        assert_eq!(report.deleted_drafts, 1);
        assert!(store.profiles.get(&stale.id).is_none());
        assert!(store.verifications.find_by_key(&stale.id.to_string()).is_none());
        assert!(store.profiles.get(&fresh.id).is_some());
        assert!(store.profiles.get(&awaiting.id).is_some());
    }

    #[test]
    fn test_draft_ttl_setting() {
        let (store, _, service) = service();
        let now = Utc::now();
        store
            .settings
            .insert(ConfigParameter {
                id: Uuid::new_v4(),
                key: SETTING_DRAFT_TTL_HOURS.to_string(),
                value: serde_json::json!(1),
                description: String::new(),
                category: "cleanup".to_string(),
                is_public: false,
                updated_at: now,
            })
            .unwrap();
        profile(&store, "two-hours", ProfileStatus::Draft, now - ChronoDuration::hours(2));

        assert_eq!(service.run(now).deleted_drafts, 1);
    }

    #[test]
    fn test_out_of_range_ttl_falls_back_to_default() {
        let (store, _, service) = service();
        let now = Utc::now();
        for key in [SETTING_DRAFT_TTL_HOURS, SETTING_PENDING_INVOICE_TTL_HOURS] {
            store
                .settings
                .insert(ConfigParameter {
                    id: Uuid::new_v4(),
                    key: key.to_string(),
                    value: serde_json::json!(10_000_000_000u64),
                    description: String::new(),
                    category: "cleanup".to_string(),
                    is_public: false,
                    updated_at: now,
                })
                .unwrap();
        }
        let old = now - ChronoDuration::hours(DEFAULT_PENDING_INVOICE_TTL_HOURS as i64 + 1);
        let stale = profile(&store, "stale", ProfileStatus::Draft, old);
        let other = profile(&store, "other", ProfileStatus::Active, now);
        let pending = invoice(&store, other.id, InvoiceStatus::Pending, old);

        let report = service.run(now);
        assert_eq!(report.deleted_drafts, 1);
        assert_eq!(report.cancelled_invoices, 1);
        assert!(store.profiles.get(&stale.id).is_none());
        assert_eq!(store.invoices.get(&pending.id).unwrap().status, InvoiceStatus::Cancelled);
    }

    #[test]
    fn test_cancels_stale_pending_invoices() {
        let (store, _, service) = service();
        let now = Utc::now();
        let p = profile(&store, "shop", ProfileStatus::Active, now);
        store
            .profiles
            .update(&p.id, |p| {
                p.plan = Some(PlanAssignment {
                    plan_id: Uuid::new_v4(),
                    plan_name: "Pro".to_string(),
                    started_at: now,
                    expires_at: now + ChronoDuration::days(30),
                });
                Ok(())
            })
            .unwrap();

        let old = now - ChronoDuration::hours(DEFAULT_PENDING_INVOICE_TTL_HOURS as i64 + 1);
        let stale = invoice(&store, p.id, InvoiceStatus::Pending, old);
        let recent = invoice(&store, p.id, InvoiceStatus::Pending, now);
        let paid = invoice(&store, p.id, InvoiceStatus::Paid, old);

        let report = service.run(now);
        assert_eq!(report.cancelled_invoices, 1);
        assert_eq!(store.invoices.get(&stale.id).unwrap().status, InvoiceStatus::Cancelled);
        assert_eq!(store.invoices.get(&recent.id).unwrap().status, InvoiceStatus::Pending);
        assert_eq!(store.invoices.get(&paid.id).unwrap().status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_purges_revoked_sessions() {
        let (_, sessions, service) = service();
        let now = Utc::now();
        let user = User::new(
            "ana@example.com".to_string(),
            "Ana".to_string(),
            AuthProvider::Credentials,
            now,
        );
        let issued = sessions.issue(&user, now).unwrap();
        sessions.revoke(&issued.claims);

        assert_eq!(service.run(now).purged_sessions, 0);
        assert_eq!(service.run(now + ChronoDuration::hours(2)).purged_sessions, 1);
    }

    fn scheduler(interval: Duration) -> Arc<CleanupScheduler> {
        let (_, _, service) = service();
        Arc::new(CleanupScheduler::new(Arc::new(service), interval))
    }

    #[tokio::test]
    async fn test_start_stop_state_machine() {
        let scheduler = scheduler(Duration::from_secs(3600));
        assert!(!scheduler.is_running());
        assert!(!scheduler.stop());

        assert!(scheduler.start());
        assert!(!scheduler.start());

        // First pass runs immediately
        for _ in 0..100 {
            if scheduler.status().total_runs > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = scheduler.status();
        assert!(status.running);
        assert_eq!(status.total_runs, 1);
        assert!(status.last_run.is_some());

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.status().running);
        assert!(scheduler.status().next_run_at.is_none());

        // Restartable
        assert!(scheduler.start());
        assert!(scheduler.stop());
    }

    #[tokio::test]
    async fn test_stop_during_pass_leaves_no_next_run() {
        let scheduler = scheduler(Duration::from_secs(3600));

        // Hold the pass lock so the first scheduled pass is still in flight at stop
        let guard = scheduler.run_lock.lock().await;
        assert!(scheduler.start());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.stop());
        drop(guard);

        scheduler.shutdown().await;
        for _ in 0..50 {
            if scheduler.status().total_runs > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = scheduler.status();
        assert!(!status.running);
        assert!(status.next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_manual_runs_serialize() {
        let scheduler = scheduler(Duration::from_secs(3600));
        let (a, b) = tokio::join!(scheduler.run_now(), scheduler.run_now());
        assert_eq!(a.total_changes(), 0);
        assert_eq!(b.total_changes(), 0);
        assert_eq!(scheduler.status().total_runs, 2);
        assert!(!scheduler.status().running);
    }
}
