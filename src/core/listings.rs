//! Profile listings and their verification workflow

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AppError, AppResult, Profile, ProfileStatus, ProfileVerification, StepStatus,
    VerificationKind, VerificationStatus,
};
use crate::store::Store;
use crate::utils::constants::{
    DEFAULT_MAX_PROFILES_PER_USER, MAX_PROFILE_IMAGES, SETTING_MAX_PROFILES_PER_USER,
};
use crate::utils::helpers::{is_valid_email, slugify};

/// Editable profile fields; `None` leaves a field untouched on update
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileInput {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub contact_email: Option<String>,
    pub images: Option<Vec<String>>,
}

fn required(value: &Option<String>, field: &str) -> AppResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(format!("{} is required", field)))
}

fn apply_input(profile: &mut Profile, input: &ProfileInput) -> AppResult<()> {
    if let Some(name) = &input.display_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("display_name cannot be empty"));
        }
        profile.display_name = name.to_string();
    }
    if let Some(bio) = &input.bio {
        profile.bio = bio.trim().to_string();
    }
    if let Some(category) = &input.category {
        profile.category = category.trim().to_lowercase();
    }
    if let Some(city) = &input.city {
        profile.city = city.trim().to_string();
    }
    if let Some(phone) = &input.phone {
        profile.phone = Some(phone.trim().to_string()).filter(|p| !p.is_empty());
    }
    if let Some(email) = &input.contact_email {
        let email = email.trim().to_lowercase();
        if !email.is_empty() && !is_valid_email(&email) {
            return Err(AppError::validation("contact_email is not a valid email"));
        }
        profile.contact_email = Some(email).filter(|e| !e.is_empty());
    }
    if let Some(images) = &input.images {
        if images.len() > MAX_PROFILE_IMAGES {
            return Err(AppError::validation(format!(
                "A profile can hold at most {} images",
                MAX_PROFILE_IMAGES
            )));
        }
        profile.images = images.clone();
    }
    Ok(())
}

/// New draft profile plus its verification document
pub fn create_profile(
    store: &Store,
    owner: Uuid,
    owner_is_admin: bool,
    input: ProfileInput,
    now: DateTime<Utc>,
) -> AppResult<Profile> {
    let display_name = required(&input.display_name, "display_name")?;
    required(&input.category, "category")?;
    required(&input.city, "city")?;

    if !owner_is_admin {
        let limit = store.setting_u64(SETTING_MAX_PROFILES_PER_USER, DEFAULT_MAX_PROFILES_PER_USER);
        let owned = store.profiles.count(|p| p.user_id == owner) as u64;
        if owned >= limit {
            return Err(AppError::conflict(format!(
                "Profile limit of {} reached",
                limit
            )));
        }
    }

    let mut profile = Profile {
        id: Uuid::new_v4(),
        user_id: owner,
        display_name: display_name.clone(),
        slug: store.unique_profile_slug(&display_name),
        bio: String::new(),
        category: String::new(),
        city: String::new(),
        phone: None,
        contact_email: None,
        images: vec![],
        status: ProfileStatus::Draft,
        plan: None,
        upgrades: vec![],
        verified: false,
        created_at: now,
        updated_at: now,
    };
    apply_input(&mut profile, &input)?;

    let profile = store.profiles.insert(profile)?;
    store
        .verifications
        .insert(ProfileVerification::new(profile.id, now))?;
    info!("📝 Created profile {} ({})", profile.slug, profile.id);
    Ok(profile)
}

/// Apply edits; a changed display name regenerates the slug
pub fn update_profile(
    store: &Store,
    profile_id: Uuid,
    input: ProfileInput,
    now: DateTime<Utc>,
) -> AppResult<Profile> {
    let current = store.profiles.require(&profile_id)?;
    let new_slug = match &input.display_name {
        Some(name) if slugify(name.trim()) != slugify(&current.display_name) => {
            Some(store.unique_profile_slug(name.trim()))
        }
        _ => None,
    };

    store.profiles.update(&profile_id, |p| {
        apply_input(p, &input)?;
        if let Some(slug) = new_slug {
            p.slug = slug;
        }
        p.updated_at = now;
        Ok(())
    })
}

/// Owner-controlled visibility toggle: active <-> paused
pub fn set_paused(store: &Store, profile_id: Uuid, paused: bool, now: DateTime<Utc>) -> AppResult<Profile> {
    store.profiles.update(&profile_id, |p| {
        match (p.status, paused) {
            (ProfileStatus::Active, true) => p.status = ProfileStatus::Paused,
            (ProfileStatus::Paused, false) => {
                p.status = if p.current_plan(now).is_some() {
                    ProfileStatus::Active
                } else {
                    ProfileStatus::Expired
                };
            }
            (status, _) => {
                return Err(AppError::conflict(format!(
                    "Cannot {} a {} profile",
                    if paused { "pause" } else { "resume" },
                    status.as_str()
                )));
            }
        }
        p.updated_at = now;
        Ok(())
    })
}

pub fn verification_for(store: &Store, profile_id: Uuid) -> AppResult<ProfileVerification> {
    store
        .verifications
        .find_by_key(&profile_id.to_string())
        .ok_or_else(|| AppError::not_found("Verification not found"))
}

/// Owner uploads evidence for one step; approved steps are final
pub fn submit_step(
    store: &Store,
    profile_id: Uuid,
    kind: VerificationKind,
    evidence: &str,
    now: DateTime<Utc>,
) -> AppResult<ProfileVerification> {
    let evidence = evidence.trim();
    if evidence.is_empty() {
        return Err(AppError::validation("evidence is required"));
    }
    let verification = verification_for(store, profile_id)?;

    store.verifications.update(&verification.id, |v| {
        let step = v
            .step_mut(kind)
            .ok_or_else(|| AppError::not_found("Verification step not found"))?;
        if step.status == StepStatus::Approved {
            return Err(AppError::conflict("Step is already approved"));
        }
        step.status = StepStatus::Submitted;
        step.evidence = Some(evidence.to_string());
        step.note = None;
        step.updated_at = now;
        v.recompute_status();
        v.updated_at = now;
        Ok(())
    })
}

/// Admin decision on a submitted step; syncs `Profile::verified`
pub fn review_step(
    store: &Store,
    profile_id: Uuid,
    kind: VerificationKind,
    approved: bool,
    note: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<ProfileVerification> {
    let verification = verification_for(store, profile_id)?;

    let updated = store.verifications.update(&verification.id, |v| {
        let step = v
            .step_mut(kind)
            .ok_or_else(|| AppError::not_found("Verification step not found"))?;
        if step.status != StepStatus::Submitted {
            return Err(AppError::conflict("Only submitted steps can be reviewed"));
        }
        step.status = if approved {
            StepStatus::Approved
        } else {
            StepStatus::Rejected
        };
        step.note = note.clone().filter(|n| !n.trim().is_empty());
        step.updated_at = now;
        v.recompute_status();
        v.updated_at = now;
        Ok(())
    })?;

    let verified = updated.status == VerificationStatus::Verified;
    store.profiles.update(&profile_id, |p| {
        p.verified = verified;
        p.updated_at = now;
        Ok(())
    })?;

    info!(
        profile = %profile_id,
        step = ?kind,
        approved,
        "Verification step reviewed"
    );
    Ok(updated)
}
