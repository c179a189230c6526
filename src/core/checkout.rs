//! Checkout: price quotes, invoices and plan activation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::coupon::{
    apply_coupon_to_plan, apply_coupon_to_upgrade, check_usable, CouponRejection, Discount,
};
use crate::models::{
    AppError, AppResult, Coupon, CouponType, Invoice, InvoiceItem, InvoiceStatus, ItemKind, Plan,
    PlanAssignment, Profile, ProfileStatus, UpgradeAssignment,
};
use crate::store::Store;
use crate::utils::helpers::{normalize_code, round_cents};

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub profile_id: Uuid,
    #[serde(default)]
    pub plan_id: Option<Uuid>,
    #[serde(default)]
    pub upgrade_ids: Vec<Uuid>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Priced items before anything is persisted
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub profile_id: Uuid,
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<Uuid>,
}

fn line(kind: ItemKind, ref_id: Uuid, description: &str, days: u32, d: Discount) -> InvoiceItem {
    InvoiceItem {
        kind,
        ref_id,
        description: description.to_string(),
        unit_price: d.original_price,
        discount: d.discount,
        amount: d.final_price,
        duration_days: days,
    }
}

fn find_coupon(store: &Store, code: &str) -> Result<Coupon, CouponRejection> {
    store
        .coupons
        .find_by_key(&normalize_code(code))
        .ok_or(CouponRejection::NotFound)
}

fn active_plan(store: &Store, plan_id: Uuid) -> AppResult<Plan> {
    let plan = store.plans.require(&plan_id)?;
    if !plan.active {
        return Err(AppError::validation(format!("Plan '{}' is not available", plan.name)));
    }
    Ok(plan)
}

pub fn quote(store: &Store, request: &CheckoutRequest, now: DateTime<Utc>) -> AppResult<Quote> {
    let profile = store.profiles.require(&request.profile_id)?;

    let coupon = match request.coupon_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let coupon = find_coupon(store, code)?;
            check_usable(&coupon, now)?;
            Some(coupon)
        }
        _ => None,
    };

    // An assignment coupon decides which plan is bought
    let assignment = coupon
        .as_ref()
        .filter(|c| c.kind == CouponType::PlanAssignment);
    let plan_id = match assignment {
        Some(c) => Some(c.assigned_plan_id.ok_or_else(|| {
            AppError::internal(format!("Coupon {} has no assigned plan", c.code))
        })?),
        None => request.plan_id,
    };

    let plan = match plan_id {
        Some(id) => Some(active_plan(store, id)?),
        None => None,
    };

    // Upgrades attach to the plan being bought, else to the plan the profile holds
    let upgrade_host = match (&plan, profile.current_plan(now)) {
        (Some(plan), _) => Some(plan.clone()),
        (None, Some(current)) => store.plans.get(&current.plan_id),
        (None, None) => None,
    };

    if plan.is_none() && request.upgrade_ids.is_empty() {
        return Err(AppError::validation("Select a plan or at least one upgrade"));
    }

    let mut items = Vec::new();
    let mut first_rejection: Option<CouponRejection> = None;
    let mut discounted_any = false;

    if let Some(plan) = &plan {
        let (discount, days) = match (&coupon, assignment) {
            (Some(c), Some(_)) => (
                Discount {
                    original_price: plan.price,
                    discount: plan.price,
                    final_price: 0.0,
                },
                c.assigned_days.unwrap_or(plan.duration_days),
            ),
            (Some(c), None) => match apply_coupon_to_plan(c, plan, now) {
                Ok(d) => {
                    discounted_any = true;
                    (d, plan.duration_days)
                }
                Err(rejection) => {
                    first_rejection.get_or_insert(rejection);
                    (Discount::none(plan.price), plan.duration_days)
                }
            },
            (None, _) => (Discount::none(plan.price), plan.duration_days),
        };
        items.push(line(ItemKind::Plan, plan.id, &plan.name, days, discount));
    }

    let mut seen = Vec::with_capacity(request.upgrade_ids.len());
    for upgrade_id in &request.upgrade_ids {
        if seen.contains(upgrade_id) {
            continue;
        }
        seen.push(*upgrade_id);

        let upgrade = upgrade_host
            .as_ref()
            .and_then(|host| host.upgrade(*upgrade_id))
            .ok_or_else(|| {
                AppError::validation(format!(
                    "Upgrade {} is not available for this plan",
                    upgrade_id
                ))
            })?;

        let discount = match (&coupon, assignment) {
            (Some(c), None) => match apply_coupon_to_upgrade(c, upgrade, now) {
                Ok(d) => {
                    discounted_any = true;
                    d
                }
                Err(rejection) => {
                    first_rejection.get_or_insert(rejection);
                    Discount::none(upgrade.price)
                }
            },
            _ => Discount::none(upgrade.price),
        };
        items.push(line(
            ItemKind::Upgrade,
            upgrade.id,
            &upgrade.name,
            upgrade.duration_days,
            discount,
        ));
    }

    if let (Some(_), None) = (&coupon, assignment) {
        if !discounted_any {
            return Err(first_rejection
                .unwrap_or(CouponRejection::NothingToDiscount)
                .into());
        }
    }

    let subtotal = round_cents(items.iter().map(|i| i.unit_price).sum());
    let discount = round_cents(items.iter().map(|i| i.discount).sum());
    let total = round_cents(items.iter().map(|i| i.amount).sum::<f64>().max(0.0));

    Ok(Quote {
        profile_id: profile.id,
        items,
        subtotal,
        discount,
        total,
        coupon_id: coupon.as_ref().map(|c| c.id),
        coupon_code: coupon.map(|c| c.code),
    })
}

/// Persist a quote as a pending invoice; free invoices are paid on the spot
pub fn create_invoice(
    store: &Store,
    user_id: Uuid,
    request: &CheckoutRequest,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let quote = quote(store, request, now)?;

    let invoice = store.invoices.insert(Invoice {
        id: Uuid::new_v4(),
        number: store.next_invoice_number(now),
        user_id,
        profile_id: quote.profile_id,
        items: quote.items,
        subtotal: quote.subtotal,
        discount: quote.discount,
        total: quote.total,
        coupon_code: quote.coupon_code,
        coupon_id: quote.coupon_id,
        status: InvoiceStatus::Pending,
        created_at: now,
        paid_at: None,
        cancelled_at: None,
    })?;
    info!(
        "🧾 Invoice {} created: total {:.2} (discount {:.2})",
        invoice.number, invoice.total, invoice.discount
    );

    if invoice.total <= 0.0 {
        return pay_invoice(store, invoice.id, now);
    }
    Ok(invoice)
}

/// Coupon recorded on the invoice; older invoices only carry the code
fn invoice_coupon(store: &Store, invoice: &Invoice) -> Option<Coupon> {
    match invoice.coupon_id {
        Some(id) => store.coupons.get(&id),
        None => invoice
            .coupon_code
            .as_deref()
            .and_then(|code| find_coupon(store, code).ok()),
    }
}

/// Mark paid, consume the coupon and activate everything on the profile.
///
/// The pending -> paid transition happens first, so concurrent payments of
/// the same invoice consume its coupon once.
pub fn pay_invoice(store: &Store, invoice_id: Uuid, now: DateTime<Utc>) -> AppResult<Invoice> {
    let invoice = store.invoices.require(&invoice_id)?;
    if invoice.status != InvoiceStatus::Pending {
        return Err(AppError::conflict(format!(
            "Invoice {} is {}",
            invoice.number,
            invoice.status.as_str()
        )));
    }
    store.profiles.require(&invoice.profile_id)?;

    let coupon = invoice_coupon(store, &invoice);
    if coupon.as_ref().is_some_and(Coupon::is_exhausted) {
        return Err(CouponRejection::UsageLimitReached.into());
    }

    let paid = store.invoices.update(&invoice_id, |i| {
        if i.status != InvoiceStatus::Pending {
            return Err(AppError::conflict("Invoice is no longer pending"));
        }
        i.status = InvoiceStatus::Paid;
        i.paid_at = Some(now);
        Ok(())
    })?;

    match coupon {
        Some(coupon) => {
            let consumed = store.coupons.update(&coupon.id, |c| {
                if c.is_exhausted() {
                    warn!(coupon = %c.code, invoice = %paid.number, "Coupon used past its limit");
                }
                c.used_count += 1;
                c.updated_at = now;
                Ok(())
            });
            if consumed.is_err() {
                warn!(coupon = %coupon.code, invoice = %paid.number, "Coupon vanished during payment");
            }
        }
        None => {
            if let Some(code) = &paid.coupon_code {
                warn!(coupon = %code, invoice = %paid.number, "Coupon no longer exists, nothing to consume");
            }
        }
    }

    store
        .profiles
        .update(&paid.profile_id, |p| activate(p, &paid, now))?;
    info!("✅ Invoice {} paid, profile {} activated", paid.number, paid.profile_id);
    Ok(paid)
}

pub fn cancel_invoice(store: &Store, invoice_id: Uuid, now: DateTime<Utc>) -> AppResult<Invoice> {
    store.invoices.update(&invoice_id, |i| {
        if i.status != InvoiceStatus::Pending {
            return Err(AppError::conflict(format!(
                "Only pending invoices can be cancelled (invoice is {})",
                i.status.as_str()
            )));
        }
        i.status = InvoiceStatus::Cancelled;
        i.cancelled_at = Some(now);
        Ok(())
    })
}

/// Renewing the same unexpired plan or upgrade extends from its current expiry
fn activate(profile: &mut Profile, invoice: &Invoice, now: DateTime<Utc>) -> AppResult<()> {
    for item in &invoice.items {
        let days = Duration::days(i64::from(item.duration_days));
        match item.kind {
            ItemKind::Plan => {
                let renewing = profile
                    .current_plan(now)
                    .filter(|current| current.plan_id == item.ref_id)
                    .cloned();
                let plan = match renewing {
                    Some(current) => PlanAssignment {
                        expires_at: current.expires_at + days,
                        ..current
                    },
                    None => {
                        // A different plan replaces the old one and its upgrades
                        profile.upgrades.clear();
                        PlanAssignment {
                            plan_id: item.ref_id,
                            plan_name: item.description.clone(),
                            started_at: now,
                            expires_at: now + days,
                        }
                    }
                };
                profile.plan = Some(plan);
            }
            ItemKind::Upgrade => {
                match profile
                    .upgrades
                    .iter_mut()
                    .find(|u| u.upgrade_id == item.ref_id)
                {
                    Some(existing) => {
                        let base = existing.expires_at.max(now);
                        existing.expires_at = base + days;
                    }
                    None => profile.upgrades.push(UpgradeAssignment {
                        upgrade_id: item.ref_id,
                        upgrade_name: item.description.clone(),
                        expires_at: now + days,
                    }),
                }
            }
        }
    }

    if matches!(profile.status, ProfileStatus::Draft | ProfileStatus::Expired) {
        profile.status = ProfileStatus::Active;
    }
    profile.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Upgrade;

    struct Fixture {
        store: Store,
        profile: Profile,
        paid: Plan,
        free: Plan,
    }

    fn plan(code: &str, price: f64) -> Plan {
        let now = Utc::now();
        Plan {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_uppercase(),
            description: String::new(),
            price,
            duration_days: 30,
            features: vec![],
            upgrades: vec![Upgrade {
                id: Uuid::new_v4(),
                code: format!("{}-featured", code),
                name: "Featured".to_string(),
                price: 10.0,
                duration_days: 7,
            }],
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn coupon(code: &str, kind: CouponType, value: f64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
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

    fn fixture() -> Fixture {
        let store = Store::new();
        let now = Utc::now();
        let paid = store.plans.insert(plan("pro", 50.0)).unwrap();
        let free = store.plans.insert(plan("free", 0.0)).unwrap();
        let profile = crate::core::listings::create_profile(
            &store,
            Uuid::new_v4(),
            false,
            crate::core::listings::ProfileInput {
                display_name: Some("Ana".to_string()),
                category: Some("cleaning".to_string()),
                city: Some("Porto".to_string()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        Fixture {
            store,
            profile,
            paid,
            free,
        }
    }

    fn request(f: &Fixture, plan: &Plan, coupon: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            profile_id: f.profile.id,
            plan_id: Some(plan.id),
            upgrade_ids: vec![],
            coupon_code: coupon.map(str::to_string),
        }
    }

    #[test]
    fn test_quote_without_coupon() {
        let f = fixture();
        let q = quote(&f.store, &request(&f, &f.paid, None), Utc::now()).unwrap();
        assert_eq!(q.subtotal, 50.0);
        assert_eq!(q.total, 50.0);
        assert_eq!(q.items.len(), 1);
    }

    #[test]
    fn test_percentage_coupon_case_insensitive() {
        let f = fixture();
        f.store
            .coupons
            .insert(coupon("SAVE20", CouponType::Percentage, 20.0))
            .unwrap();
        let q = quote(&f.store, &request(&f, &f.paid, Some("save20")), Utc::now()).unwrap();
        assert_eq!(q.discount, 10.0);
        assert_eq!(q.total, 40.0);
        assert_eq!(q.coupon_code.as_deref(), Some("SAVE20"));
    }

    #[test]
    fn test_coupon_rejected_on_free_plan() {
        let f = fixture();
        f.store
            .coupons
            .insert(coupon("SAVE20", CouponType::Percentage, 20.0))
            .unwrap();
        let err = quote(&f.store, &request(&f, &f.free, Some("SAVE20")), Utc::now()).unwrap_err();
        assert_eq!(err.code_str(), "COUPON_INVALID");
        assert_eq!(err.details.as_deref(), Some("free_plan"));
    }

    #[test]
    fn test_unknown_coupon() {
        let f = fixture();
        let err = quote(&f.store, &request(&f, &f.paid, Some("NOPE")), Utc::now()).unwrap_err();
        assert_eq!(err.details.as_deref(), Some("not_found"));
    }

    #[test]
    fn test_upgrade_only_discount() {
        let f = fixture();
        let upgrade_id = f.paid.upgrades[0].id;
        let mut c = coupon("UPG", CouponType::FixedAmount, 4.0);
        c.valid_plan_ids = vec![f.free.id];
        c.valid_upgrade_ids = vec![upgrade_id];
        f.store.coupons.insert(c).unwrap();

        let mut req = request(&f, &f.paid, Some("UPG"));
        req.upgrade_ids = vec![upgrade_id, upgrade_id];
        let q = quote(&f.store, &req, Utc::now()).unwrap();

        // Plan not eligible, upgrade is; duplicate upgrade ids collapse
        assert_eq!(q.items.len(), 2);
        assert_eq!(q.items[0].discount, 0.0);
        assert_eq!(q.items[1].amount, 6.0);
        assert_eq!(q.total, 56.0);
    }

    #[test]
    fn test_upgrade_without_plan_needs_current_plan() {
        let f = fixture();
        let req = CheckoutRequest {
            profile_id: f.profile.id,
            plan_id: None,
            upgrade_ids: vec![f.paid.upgrades[0].id],
            coupon_code: None,
        };
        assert!(quote(&f.store, &req, Utc::now()).is_err());
    }

    #[test]
    fn test_pay_activates_profile_and_consumes_coupon() {
        let f = fixture();
        let now = Utc::now();
        let mut c = coupon("ONCE", CouponType::FixedAmount, 5.0);
        c.max_uses = Some(1);
        f.store.coupons.insert(c).unwrap();

        let invoice = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, Some("ONCE")), now).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.total, 45.0);

        let paid = pay_invoice(&f.store, invoice.id, now).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);

        let profile = f.store.profiles.get(&f.profile.id).unwrap();
        assert_eq!(profile.status, ProfileStatus::Active);
        let assignment = profile.plan.unwrap();
        assert_eq!(assignment.plan_id, f.paid.id);
        assert_eq!(assignment.expires_at, now + Duration::days(30));

        assert_eq!(f.store.coupons.find_by_key("ONCE").unwrap().used_count, 1);
        assert!(pay_invoice(&f.store, invoice.id, now).is_err());

        // Limit reached for the next checkout
        let err = quote(&f.store, &request(&f, &f.paid, Some("ONCE")), now).unwrap_err();
        assert_eq!(err.details.as_deref(), Some("usage_limit_reached"));
    }

    #[test]
    fn test_pay_after_coupon_deleted() {
        let f = fixture();
        let now = Utc::now();
        let c = f
            .store
            .coupons
            .insert(coupon("SAVE", CouponType::Percentage, 10.0))
            .unwrap();
        let invoice = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, Some("SAVE")), now).unwrap();
        assert_eq!(invoice.coupon_id, Some(c.id));

        f.store.coupons.remove(&c.id);
        let paid = pay_invoice(&f.store, invoice.id, now).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.total, 45.0);
        assert_eq!(
            f.store.profiles.get(&f.profile.id).unwrap().status,
            ProfileStatus::Active
        );
    }

    #[test]
    fn test_pay_after_coupon_renamed() {
        let f = fixture();
        let now = Utc::now();
        let c = f
            .store
            .coupons
            .insert(coupon("SAVE", CouponType::Percentage, 10.0))
            .unwrap();
        let invoice = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, Some("SAVE")), now).unwrap();

        f.store
            .coupons
            .update(&c.id, |c| {
                c.code = "SAVE-NOW".to_string();
                Ok(())
            })
            .unwrap();
        pay_invoice(&f.store, invoice.id, now).unwrap();
        assert_eq!(f.store.coupons.get(&c.id).unwrap().used_count, 1);
    }

    #[test]
    fn test_concurrent_pay_consumes_coupon_once() {
        let f = fixture();
        let now = Utc::now();
        let c = f
            .store
            .coupons
            .insert(coupon("RACE", CouponType::FixedAmount, 5.0))
            .unwrap();
        let invoice = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, Some("RACE")), now).unwrap();

        let store = &f.store;
        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || pay_invoice(store, invoice.id, now).is_ok()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(f.store.coupons.get(&c.id).unwrap().used_count, 1);
    }

    #[test]
    fn test_renewal_extends_expiry() {
        let f = fixture();
        let now = Utc::now();
        let first = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, None), now).unwrap();
        pay_invoice(&f.store, first.id, now).unwrap();
        let second = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, None), now).unwrap();
        pay_invoice(&f.store, second.id, now).unwrap();

        let plan = f.store.profiles.get(&f.profile.id).unwrap().plan.unwrap();
        assert_eq!(plan.expires_at, now + Duration::days(60));
        assert_eq!(plan.started_at, now);
    }

    #[test]
    fn test_plan_assignment_coupon_is_paid_immediately() {
        let f = fixture();
        let now = Utc::now();
        let mut c = coupon("GIFT", CouponType::PlanAssignment, 0.0);
        c.assigned_plan_id = Some(f.paid.id);
        c.assigned_days = Some(90);
        f.store.coupons.insert(c).unwrap();

        let req = CheckoutRequest {
            profile_id: f.profile.id,
            plan_id: None,
            upgrade_ids: vec![],
            coupon_code: Some("GIFT".to_string()),
        };
        let invoice = create_invoice(&f.store, f.profile.user_id, &req, now).unwrap();
        assert_eq!(invoice.total, 0.0);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.items[0].duration_days, 90);

        let profile = f.store.profiles.get(&f.profile.id).unwrap();
        assert_eq!(profile.plan.unwrap().expires_at, now + Duration::days(90));
    }

    #[test]
    fn test_cancel_only_pending() {
        let f = fixture();
        let now = Utc::now();
        let invoice = create_invoice(&f.store, f.profile.user_id, &request(&f, &f.paid, None), now).unwrap();
        let cancelled = cancel_invoice(&f.store, invoice.id, now).unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert!(cancel_invoice(&f.store, invoice.id, now).is_err());
        assert!(pay_invoice(&f.store, invoice.id, now).is_err());
    }
}
