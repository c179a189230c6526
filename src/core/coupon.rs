//! Coupon eligibility and discount calculation
//!
//! Pricing rules:
//! - percentage:   final = max(0, p - p * v / 100)
//! - fixed_amount: final = max(0, p - v)
//! - a free (zero-price) plan or upgrade is never discounted
//! - a non-empty `valid_plan_ids` restricts which plans qualify
//! - upgrades qualify only when listed in `valid_upgrade_ids`

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::{AppError, Coupon, CouponType, ErrorCode, Plan, Upgrade};
use crate::utils::helpers::round_cents;

/// Why a coupon cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
    NotDiscountCoupon,
    FreePlan,
    PlanNotEligible,
    UpgradeNotEligible,
    NothingToDiscount,
}

impl CouponRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::NotDiscountCoupon => "not_discount_coupon",
            Self::FreePlan => "free_plan",
            Self::PlanNotEligible => "plan_not_eligible",
            Self::UpgradeNotEligible => "upgrade_not_eligible",
            Self::NothingToDiscount => "nothing_to_discount",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "Coupon does not exist",
            Self::Inactive => "Coupon is disabled",
            Self::NotYetValid => "Coupon is not valid yet",
            Self::Expired => "Coupon has expired",
            Self::UsageLimitReached => "Coupon usage limit reached",
            Self::NotDiscountCoupon => "Coupon assigns a plan and cannot discount a price",
            Self::FreePlan => "Coupons cannot be applied to free items",
            Self::PlanNotEligible => "Coupon is not valid for this plan",
            Self::UpgradeNotEligible => "Coupon is not valid for this upgrade",
            Self::NothingToDiscount => "Coupon does not apply to any selected item",
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<CouponRejection> for AppError {
    fn from(rejection: CouponRejection) -> Self {
        AppError::new(ErrorCode::CouponInvalid, rejection.message()).with_details(rejection.as_str())
    }
}

/// Outcome of applying a coupon to one price
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Discount {
    pub original_price: f64,
    pub discount: f64,
    pub final_price: f64,
}

impl Discount {
    pub fn none(price: f64) -> Self {
        Self {
            original_price: price,
            discount: 0.0,
            final_price: price,
        }
    }
}

/// Checks that do not depend on what the coupon is applied to
pub fn check_usable(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), CouponRejection> {
    if !coupon.active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.starts_at.map_or(false, |start| now < start) {
        return Err(CouponRejection::NotYetValid);
    }
    if coupon.expires_at.map_or(false, |end| now >= end) {
        return Err(CouponRejection::Expired);
    }
    if coupon.is_exhausted() {
        return Err(CouponRejection::UsageLimitReached);
    }
    Ok(())
}

pub fn is_coupon_valid_for_plan(
    coupon: &Coupon,
    plan: &Plan,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    check_usable(coupon, now)?;
    if !coupon.kind.is_discount() {
        return Err(CouponRejection::NotDiscountCoupon);
    }
    if plan.is_free() {
        return Err(CouponRejection::FreePlan);
    }
    if !coupon.valid_plan_ids.is_empty() && !coupon.valid_plan_ids.contains(&plan.id) {
        return Err(CouponRejection::PlanNotEligible);
    }
    Ok(())
}

pub fn is_coupon_valid_for_upgrade(
    coupon: &Coupon,
    upgrade: &Upgrade,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    check_usable(coupon, now)?;
    if !coupon.kind.is_discount() {
        return Err(CouponRejection::NotDiscountCoupon);
    }
    if upgrade.is_free() {
        return Err(CouponRejection::FreePlan);
    }
    if !coupon.valid_upgrade_ids.contains(&upgrade.id) {
        return Err(CouponRejection::UpgradeNotEligible);
    }
    Ok(())
}

/// Pure price arithmetic. Free prices and assignment coupons are returned unchanged.
pub fn apply_coupon_to_price(kind: CouponType, value: f64, price: f64) -> Discount {
    if price <= 0.0 {
        return Discount::none(price.max(0.0));
    }

    let final_price = match kind {
        CouponType::Percentage => price - price * value / 100.0,
        CouponType::FixedAmount => price - value,
        CouponType::PlanAssignment => price,
    };
    let final_price = round_cents(final_price.max(0.0).min(price));

    Discount {
        original_price: price,
        discount: round_cents(price - final_price),
        final_price,
    }
}

pub fn apply_coupon_to_plan(
    coupon: &Coupon,
    plan: &Plan,
    now: DateTime<Utc>,
) -> Result<Discount, CouponRejection> {
    is_coupon_valid_for_plan(coupon, plan, now)?;
    Ok(apply_coupon_to_price(coupon.kind, coupon.value, plan.price))
}

pub fn apply_coupon_to_upgrade(
    coupon: &Coupon,
    upgrade: &Upgrade,
    now: DateTime<Utc>,
) -> Result<Discount, CouponRejection> {
    is_coupon_valid_for_upgrade(coupon, upgrade, now)?;
    Ok(apply_coupon_to_price(coupon.kind, coupon.value, upgrade.price))
}

/// Shape checks run when an admin creates or edits a coupon
pub fn validate_coupon_definition(
    kind: CouponType,
    value: f64,
    assigned_plan_id: Option<Uuid>,
) -> Result<(), AppError> {
    if !value.is_finite() {
        return Err(AppError::validation("Coupon value must be a finite number"));
    }
    match kind {
        CouponType::Percentage if value <= 0.0 || value > 100.0 => Err(AppError::validation(
            "Percentage coupons need a value in (0, 100]",
        )),
        CouponType::FixedAmount if value <= 0.0 => Err(AppError::validation(
            "Fixed amount coupons need a positive value",
        )),
        CouponType::PlanAssignment if assigned_plan_id.is_none() => Err(AppError::validation(
            "Plan assignment coupons need assigned_plan_id",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn plan(price: f64) -> Plan {
        let now = Utc::now();
        Plan {
            id: Uuid::new_v4(),
            code: "basic".to_string(),
            name: "Basic".to_string(),
            description: String::new(),
            price,
            duration_days: 30,
            features: vec![],
            upgrades: vec![],
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn coupon(kind: CouponType, value: f64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            description: String::new(),
            kind,
            value,
            valid_plan_ids: vec![],
            valid_upgrade_ids: vec![],
            assigned_plan_id: None,
            assigned_days: None,
            max_uses: None,
            used_count: 0,
            starts_at: None,
            expires_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let d = apply_coupon_to_price(CouponType::Percentage, 25.0, 80.0);
        assert_eq!(d.final_price, 60.0);
        assert_eq!(d.discount, 20.0);
        assert_eq!(d.original_price, 80.0);
    }

    #[test]
    fn test_fixed_amount_clamps_at_zero() {
        let d = apply_coupon_to_price(CouponType::FixedAmount, 50.0, 30.0);
        assert_eq!(d.final_price, 0.0);
        assert_eq!(d.discount, 30.0);
    }

    #[test]
    fn test_full_percentage_is_free() {
        let d = apply_coupon_to_price(CouponType::Percentage, 100.0, 19.99);
        assert_eq!(d.final_price, 0.0);
        assert_eq!(d.discount, 19.99);
    }

    #[test]
    fn test_free_plan_never_discounted() {
        let c = coupon(CouponType::Percentage, 50.0);
        assert_eq!(
            apply_coupon_to_plan(&c, &plan(0.0), Utc::now()),
            Err(CouponRejection::FreePlan)
        );
    }

    #[test]
    fn test_plan_allow_list() {
        let allowed = plan(100.0);
        let other = plan(100.0);
        let mut c = coupon(CouponType::FixedAmount, 10.0);
        c.valid_plan_ids = vec![allowed.id];

        assert!(is_coupon_valid_for_plan(&c, &allowed, Utc::now()).is_ok());
        assert_eq!(
            is_coupon_valid_for_plan(&c, &other, Utc::now()),
            Err(CouponRejection::PlanNotEligible)
        );
    }

    #[test]
    fn test_upgrade_requires_listing() {
        let upgrade = Upgrade {
            id: Uuid::new_v4(),
            code: "featured".to_string(),
            name: "Featured".to_string(),
            price: 20.0,
            duration_days: 7,
        };
        let mut c = coupon(CouponType::Percentage, 50.0);
        assert_eq!(
            apply_coupon_to_upgrade(&c, &upgrade, Utc::now()),
            Err(CouponRejection::UpgradeNotEligible)
        );

        c.valid_upgrade_ids = vec![upgrade.id];
        let d = apply_coupon_to_upgrade(&c, &upgrade, Utc::now()).unwrap();
        assert_eq!(d.final_price, 10.0);
    }

    #[test]
    fn test_date_window_and_usage() {
        let now = Utc::now();
        let p = plan(10.0);

        let mut c = coupon(CouponType::Percentage, 10.0);
        c.starts_at = Some(now + Duration::hours(1));
        assert_eq!(is_coupon_valid_for_plan(&c, &p, now), Err(CouponRejection::NotYetValid));

        c.starts_at = None;
        c.expires_at = Some(now);
        assert_eq!(is_coupon_valid_for_plan(&c, &p, now), Err(CouponRejection::Expired));

        c.expires_at = None;
        c.max_uses = Some(3);
        c.used_count = 3;
        assert_eq!(
            is_coupon_valid_for_plan(&c, &p, now),
            Err(CouponRejection::UsageLimitReached)
        );

        c.used_count = 2;
        c.active = false;
        assert_eq!(is_coupon_valid_for_plan(&c, &p, now), Err(CouponRejection::Inactive));
    }

    #[test]
    fn test_assignment_coupon_is_not_a_discount() {
        let mut c = coupon(CouponType::PlanAssignment, 0.0);
        c.assigned_plan_id = Some(Uuid::new_v4());
        assert_eq!(
            apply_coupon_to_plan(&c, &plan(10.0), Utc::now()),
            Err(CouponRejection::NotDiscountCoupon)
        );
    }

    #[test]
    fn test_definition_validation() {
        assert!(validate_coupon_definition(CouponType::Percentage, 0.0, None).is_err());
        assert!(validate_coupon_definition(CouponType::Percentage, 101.0, None).is_err());
        assert!(validate_coupon_definition(CouponType::Percentage, 100.0, None).is_ok());
        assert!(validate_coupon_definition(CouponType::FixedAmount, -5.0, None).is_err());
        assert!(validate_coupon_definition(CouponType::PlanAssignment, 0.0, None).is_err());
        assert!(
            validate_coupon_definition(CouponType::PlanAssignment, 0.0, Some(Uuid::new_v4()))
                .is_ok()
        );
    }

    #[test]
    fn test_rejection_maps_to_coupon_invalid() {
        let err: AppError = CouponRejection::FreePlan.into();
        assert_eq!(err.code_str(), "COUPON_INVALID");
        assert_eq!(err.details.as_deref(), Some("free_plan"));
    }
}
