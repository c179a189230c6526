//! JSON snapshot persistence for the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Collection, Document, Store};
use crate::models::{
    AppResult, ConfigParameter, ContentPage, Coupon, Invoice, Plan, Profile, ProfileVerification,
    User,
};

/// Revocation that must survive a restart until the token expires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevokedSession {
    pub jti: Uuid,
    pub exp: i64,
}

/// Serialized form of the whole store
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invoice_seq: u64,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub verifications: Vec<ProfileVerification>,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub coupons: Vec<Coupon>,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub pages: Vec<ContentPage>,
    #[serde(default)]
    pub settings: Vec<ConfigParameter>,
    #[serde(default)]
    pub revoked_sessions: Vec<RevokedSession>,
}

impl Snapshot {
    pub fn document_count(&self) -> usize {
        self.users.len()
            + self.profiles.len()
            + self.verifications.len()
            + self.plans.len()
            + self.coupons.len()
            + self.invoices.len()
            + self.pages.len()
            + self.settings.len()
    }
}

impl Store {
    pub fn to_snapshot(&self) -> Snapshot {
        let now = Utc::now();
        let revoked_sessions = self
            .revoked_sessions
            .iter()
            .filter(|entry| *entry.value() > now.timestamp())
            .map(|entry| RevokedSession {
                jti: *entry.key(),
                exp: *entry.value(),
            })
            .collect();

        Snapshot {
            saved_at: Some(now),
            invoice_seq: self.invoice_sequence(),
            users: self.users.list(),
            profiles: self.profiles.list(),
            verifications: self.verifications.list(),
            plans: self.plans.list(),
            coupons: self.coupons.list(),
            invoices: self.invoices.list(),
            pages: self.pages.list(),
            settings: self.settings.list(),
            revoked_sessions,
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> AppResult<Self> {
        let store = Store::new();
        restore(&store.users, snapshot.users)?;
        restore(&store.profiles, snapshot.profiles)?;
        restore(&store.verifications, snapshot.verifications)?;
        restore(&store.plans, snapshot.plans)?;
        restore(&store.coupons, snapshot.coupons)?;
        restore(&store.pages, snapshot.pages)?;
        restore(&store.settings, snapshot.settings)?;
        for revoked in snapshot.revoked_sessions {
            store.revoked_sessions.insert(revoked.jti, revoked.exp);
        }

        // Never reuse a number, even if the saved counter lags behind
        let max_seen = snapshot
            .invoices
            .iter()
            .filter_map(|i| Invoice::parse_sequence(&i.number))
            .max()
            .unwrap_or(0);
        restore(&store.invoices, snapshot.invoices)?;
        store.set_invoice_sequence(snapshot.invoice_seq.max(max_seen));

        Ok(store)
    }

    /// Load from `path`; a missing file yields an empty store
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            warn!("📭 No snapshot at {}, starting with an empty store", path.display());
            return Ok(Store::new());
        }

        let raw = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        let count = snapshot.document_count();
        let store = Store::from_snapshot(snapshot)?;
        info!("📂 Loaded {} documents from {}", count, path.display());
        Ok(store)
    }

    /// Write to a unique sibling temp file, then rename over `path`.
    /// Concurrent saves run one at a time.
    pub fn save(&self, path: &Path) -> AppResult<usize> {
        let _guard = self
            .save_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot = self.to_snapshot();
        let count = snapshot.document_count();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp = temp_path(path);
        if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        info!("💾 Saved {} documents to {}", count, path.display());
        Ok(count)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

fn restore<T: Document>(collection: &Collection<T>, docs: Vec<T>) -> AppResult<()> {
    for doc in docs {
        collection.insert(doc)?;
    }
    Ok(())
}
