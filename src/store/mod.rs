//! In-process document store
//!
//! One [`Collection`] per entity plus the invoice number sequence. The whole
//! store can be snapshotted to / restored from a JSON file.

pub mod collection;
pub mod snapshot;

pub use collection::{Collection, Document};
pub use snapshot::{RevokedSession, Snapshot};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    ConfigParameter, ContentPage, Coupon, Invoice, Plan, Profile, ProfileVerification, User,
};
use crate::utils::helpers::slugify;

impl Document for User {
    const COLLECTION: &'static str = "User";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.email.clone())
    }
}

impl Document for Profile {
    const COLLECTION: &'static str = "Profile";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.slug.clone())
    }
}

impl Document for ProfileVerification {
    const COLLECTION: &'static str = "ProfileVerification";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.profile_id.to_string())
    }
}

impl Document for Plan {
    const COLLECTION: &'static str = "Plan";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.code.clone())
    }
}

impl Document for Coupon {
    const COLLECTION: &'static str = "Coupon";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.code.clone())
    }
}

impl Document for Invoice {
    const COLLECTION: &'static str = "Invoice";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.number.clone())
    }
}

impl Document for ContentPage {
    const COLLECTION: &'static str = "ContentPage";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.slug.clone())
    }
}

impl Document for ConfigParameter {
    const COLLECTION: &'static str = "ConfigParameter";
    fn id(&self) -> Uuid {
        self.id
    }
    fn unique_key(&self) -> Option<String> {
        Some(self.key.clone())
    }
}

#[derive(Default)]
pub struct Store {
    pub users: Collection<User>,
    pub profiles: Collection<Profile>,
    pub verifications: Collection<ProfileVerification>,
    pub plans: Collection<Plan>,
    pub coupons: Collection<Coupon>,
    pub invoices: Collection<Invoice>,
    pub pages: Collection<ContentPage>,
    pub settings: Collection<ConfigParameter>,
    /// Revoked session token ids -> token expiry (unix seconds)
    pub revoked_sessions: DashMap<Uuid, i64>,
    invoice_seq: AtomicU64,
    /// Serializes snapshot writes
    save_lock: Mutex<()>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next invoice number; the sequence never repeats within a store
    pub fn next_invoice_number(&self, now: DateTime<Utc>) -> String {
        let seq = self.invoice_seq.fetch_add(1, Ordering::Relaxed) + 1;
        Invoice::format_number(now, seq)
    }

    pub(crate) fn invoice_sequence(&self) -> u64 {
        self.invoice_seq.load(Ordering::Relaxed)
    }

    pub(crate) fn set_invoice_sequence(&self, seq: u64) {
        self.invoice_seq.store(seq, Ordering::Relaxed);
    }

    /// Numeric ConfigParameter, falling back to `default` when absent or malformed
    pub fn setting_u64(&self, key: &str, default: u64) -> u64 {
        self.settings
            .find_by_key(key)
            .and_then(|p| p.as_u64())
            .unwrap_or(default)
    }

    /// Slug derived from `name` that no other profile uses
    pub fn unique_profile_slug(&self, name: &str) -> String {
        let base = slugify(name);
        if !self.profiles.key_exists(&base) {
            return base;
        }
        (2u32..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !self.profiles.key_exists(candidate))
            .unwrap_or(base)
    }

    /// Plan that contains the given upgrade
    pub fn plan_for_upgrade(&self, upgrade_id: Uuid) -> Option<Plan> {
        self.plans
            .filter(|p| p.upgrade(upgrade_id).is_some())
            .into_iter()
            .next()
    }

    /// Remove a profile together with its verification document
    pub fn delete_profile(&self, profile_id: &Uuid) -> Option<Profile> {
        let profile = self.profiles.remove(profile_id)?;
        if let Some(verification) = self.verifications.find_by_key(&profile_id.to_string()) {
            self.verifications.remove(&verification.id);
        }
        Some(profile)
    }
}
