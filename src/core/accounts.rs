//! Account lifecycle: registration, credential login, Google linking and
//! admin user management

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::google::GoogleIdentity;
use super::password::{check_strength, hash_password, verify_password};
use crate::models::{AppError, AppResult, AuthProvider, Role, User};
use crate::store::Store;
use crate::utils::helpers::{is_valid_email, normalize_key};

pub fn register(
    store: &Store,
    email: &str,
    name: &str,
    password: &str,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let email = normalize_key(email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("A valid email is required"));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    check_strength(password)?;

    let mut user = User::new(email, name.to_string(), AuthProvider::Credentials, now);
    user.password_hash = Some(hash_password(password)?);
    let user = store.users.insert(user)?;
    info!("👤 Registered user {}", user.email);
    Ok(user)
}

/// Same error for unknown email and wrong password
pub fn login(store: &Store, email: &str, password: &str) -> AppResult<User> {
    let user = store
        .users
        .find_by_key(&normalize_key(email))
        .ok_or_else(AppError::invalid_credentials)?;

    match &user.password_hash {
        Some(hash) if verify_password(password, hash) => Ok(user),
        _ => Err(AppError::invalid_credentials()),
    }
}

/// Find the account for a Google identity, linking by email or creating one
pub fn upsert_google_user(
    store: &Store,
    identity: &GoogleIdentity,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let linked = store
        .users
        .filter(|u| u.google_id.as_deref() == Some(identity.sub.as_str()))
        .into_iter()
        .next()
        .or_else(|| store.users.find_by_key(&identity.email));

    if let Some(existing) = linked {
        return store.users.update(&existing.id, |u| {
            u.google_id = Some(identity.sub.clone());
            if u.image.is_none() {
                u.image = identity.picture.clone();
            }
            u.updated_at = now;
            Ok(())
        });
    }

    let name = identity
        .name
        .clone()
        .unwrap_or_else(|| identity.email.split('@').next().unwrap_or("user").to_string());
    let mut user = User::new(identity.email.clone(), name, AuthProvider::Google, now);
    user.google_id = Some(identity.sub.clone());
    user.image = identity.picture.clone();
    let user = store.users.insert(user)?;
    info!("👤 Created Google user {}", user.email);
    Ok(user)
}

/// Create the configured admin, or promote the existing account
pub fn ensure_admin(store: &Store, email: &str, password: &str, now: DateTime<Utc>) -> AppResult<User> {
    let email = normalize_key(email);
    if let Some(existing) = store.users.find_by_key(&email) {
        if existing.is_admin() {
            return Ok(existing);
        }
        info!("🛡️ Promoting {} to admin", email);
        return store.users.update(&existing.id, |u| {
            u.role = Role::Admin;
            u.updated_at = now;
            Ok(())
        });
    }

    let user = register(store, &email, "Administrator", password, now)?;
    info!("🛡️ Bootstrapped admin {}", email);
    store.users.update(&user.id, |u| {
        u.role = Role::Admin;
        Ok(())
    })
}

/// Self-service account changes
#[derive(Debug, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub image: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

pub fn update_account(
    store: &Store,
    user_id: Uuid,
    update: AccountUpdate,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let new_hash = match &update.new_password {
        Some(new_password) => {
            check_strength(new_password)?;
            Some(hash_password(new_password)?)
        }
        None => None,
    };

    store.users.update(&user_id, |u| {
        if let Some(name) = &update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::validation("Name cannot be empty"));
            }
            u.name = name.to_string();
        }
        if let Some(image) = &update.image {
            u.image = Some(image.clone()).filter(|i| !i.is_empty());
        }
        if let Some(hash) = new_hash {
            // Google-only accounts may set a first password without one
            if let Some(existing) = &u.password_hash {
                let current = update.current_password.as_deref().unwrap_or_default();
                if !verify_password(current, existing) {
                    return Err(AppError::invalid_credentials());
                }
            }
            u.password_hash = Some(hash);
        }
        u.updated_at = now;
        Ok(())
    })
}

pub fn set_role(store: &Store, acting: Uuid, user_id: Uuid, role: Role, now: DateTime<Utc>) -> AppResult<User> {
    if acting == user_id && role != Role::Admin {
        return Err(AppError::conflict("Admins cannot demote themselves"));
    }
    store.users.update(&user_id, |u| {
        u.role = role;
        u.updated_at = now;
        Ok(())
    })
}

/// Delete a user and every profile they own; returns removed profile count
pub fn delete_user(store: &Store, acting: Uuid, user_id: Uuid) -> AppResult<usize> {
    if acting == user_id {
        return Err(AppError::conflict("Admins cannot delete themselves"));
    }
    let user = store.users.require(&user_id)?;

    let owned = store.profiles.filter(|p| p.user_id == user_id);
    for profile in &owned {
        store.delete_profile(&profile.id);
    }
    store.users.remove(&user.id);
    info!("🗑️ Deleted user {} and {} profiles", user.email, owned.len());
    Ok(owned.len())
}
