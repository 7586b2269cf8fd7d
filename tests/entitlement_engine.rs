mod common;

use common::{count_purchases, now, plus_days, plus_months, utc, TestDbGuard, BUSY_TIMEOUT_MS};
use focus_billing::error::AppError;
use focus_billing::types::{Platform, SubscribeRequest, SubscriptionStatus, SubscriptionTier};
use focus_billing::{db, orchestrator, query, store};
use std::sync::{Arc, Barrier};

fn purchase(
    tier: SubscriptionTier,
    transaction_id: &str,
    purchased_at: chrono::NaiveDateTime,
) -> SubscribeRequest {
    SubscribeRequest::new(tier, Platform::Apple, "focus.premium", transaction_id)
        .purchased_at(utc(purchased_at))
}

#[test]
fn test_same_transaction_applies_once() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    let request = purchase(SubscriptionTier::Monthly, "txn-A", d);
    let first = orchestrator::subscribe_at(&mut conn, "user_1", &request, d).unwrap();
    assert_eq!(first.end_date, Some(utc(plus_months(d, 1))));

    let second = orchestrator::subscribe_at(&mut conn, "user_1", &request, d);
    assert!(matches!(second, Err(AppError::DuplicatePurchase(ref txn)) if txn == "txn-A"));

    assert_eq!(count_purchases(&mut conn, "txn-A"), 1);
    let history = query::history_at(&mut conn, "user_1", d).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].end_date, Some(utc(plus_months(d, 1))));
}

#[test]
fn test_transaction_id_is_unique_across_users() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    db_guard.seed_user("user_2");
    let mut conn = db_guard.connection();
    let d = now();

    let request = purchase(SubscriptionTier::Weekly, "shared-txn", d);
    orchestrator::subscribe_at(&mut conn, "user_1", &request, d).unwrap();

    let result = orchestrator::subscribe_at(&mut conn, "user_2", &request, d);
    assert!(matches!(result, Err(AppError::DuplicatePurchase(_))));
    assert!(query::status_at(&mut conn, "user_2", d).unwrap().is_none());
    assert!(store::find_purchases_by_user(&mut conn, "user_2")
        .unwrap()
        .is_empty());
}

#[test]
fn test_extension_builds_on_unexpired_window() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    // Weekly bought two days ago: five days remain.
    orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Weekly, "txn-1", plus_days(d, -2)),
        d,
    )
    .unwrap();

    let status = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Monthly, "txn-2", d),
        d,
    )
    .unwrap();

    assert_eq!(status.tier, SubscriptionTier::Monthly);
    assert_eq!(status.end_date, Some(utc(plus_months(plus_days(d, 5), 1))));
    assert_eq!(status.status, SubscriptionStatus::Active);
}

#[test]
fn test_extension_after_lapse_anchors_on_purchase() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();
    let bought = plus_days(d, -40);

    let lapsed = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Monthly, "txn-C", bought),
        d,
    )
    .unwrap();
    assert_eq!(lapsed.end_date, Some(utc(plus_months(bought, 1))));
    assert_eq!(lapsed.status, SubscriptionStatus::Expired);
    assert!(query::status_at(&mut conn, "user_1", d).unwrap().is_none());

    // Still stored as ACTIVE; expiry is only ever computed.
    let stored = store::find_active_subscription_by_user(&mut conn, "user_1")
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);

    let renewed = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Weekly, "txn-D", d),
        d,
    )
    .unwrap();
    assert_eq!(renewed.end_date, Some(utc(plus_days(d, 7))));
    assert_eq!(renewed.status, SubscriptionStatus::Active);
    assert_eq!(query::history_at(&mut conn, "user_1", d).unwrap().len(), 1);
}

#[test]
fn test_monthly_then_weekly_scenario() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    let first = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Monthly, "A", d),
        d,
    )
    .unwrap();
    assert_eq!(first.status, SubscriptionStatus::Active);
    assert_eq!(first.tier, SubscriptionTier::Monthly);
    assert_eq!(first.start_date, utc(d));
    assert_eq!(first.end_date, Some(utc(plus_months(d, 1))));

    let second = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Weekly, "B", plus_days(d, 3)),
        plus_days(d, 3),
    )
    .unwrap();
    assert_eq!(second.status, SubscriptionStatus::Active);
    assert_eq!(second.tier, SubscriptionTier::Weekly);
    assert_eq!(second.start_date, utc(d));
    assert_eq!(second.end_date, Some(utc(plus_days(plus_months(d, 1), 7))));
}

#[test]
fn test_unlimited_stays_unlimited() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Monthly, "txn-1", d),
        d,
    )
    .unwrap();
    let unlimited = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Unlimited, "txn-2", d),
        d,
    )
    .unwrap();
    assert_eq!(unlimited.end_date, None);
    assert_eq!(unlimited.tier, SubscriptionTier::Unlimited);

    let after_weekly = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Weekly, "txn-3", plus_days(d, 10)),
        plus_days(d, 10),
    )
    .unwrap();
    assert_eq!(after_weekly.end_date, None);
    assert_eq!(after_weekly.tier, SubscriptionTier::Unlimited);
    assert_eq!(after_weekly.status, SubscriptionStatus::Active);

    // The dated purchase is still recorded.
    assert_eq!(count_purchases(&mut conn, "txn-3"), 1);
}

#[test]
fn test_cancel_is_soft_and_idempotent() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Monthly, "txn-1", d),
        d,
    )
    .unwrap();

    let cancelled = orchestrator::cancel_at(&mut conn, "user_1", d)
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert_eq!(cancelled.end_date, Some(utc(plus_months(d, 1))));

    assert!(orchestrator::cancel_at(&mut conn, "user_1", d)
        .unwrap()
        .is_none());

    // Access continues until the window ends.
    let status = query::status_at(&mut conn, "user_1", plus_days(d, 2))
        .unwrap()
        .unwrap();
    assert_eq!(status.status, SubscriptionStatus::Cancelled);
    assert!(query::user_entitlement_at(&mut conn, "user_1", plus_days(d, 2))
        .unwrap()
        .is_premium);

    assert!(query::status_at(&mut conn, "user_1", plus_days(d, 40))
        .unwrap()
        .is_none());
    assert!(!query::user_entitlement_at(&mut conn, "user_1", plus_days(d, 40))
        .unwrap()
        .is_premium);
}

#[test]
fn test_purchase_after_cancel_opens_new_row() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Weekly, "txn-1", d),
        d,
    )
    .unwrap();
    orchestrator::cancel_at(&mut conn, "user_1", d).unwrap();

    let later = plus_days(d, 2);
    let fresh = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Monthly, "txn-2", later),
        later,
    )
    .unwrap();
    assert_eq!(fresh.start_date, utc(later));
    assert_eq!(fresh.end_date, Some(utc(plus_months(later, 1))));
    assert_eq!(fresh.status, SubscriptionStatus::Active);

    let history = query::history_at(&mut conn, "user_1", later).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].tier, SubscriptionTier::Monthly);
    assert_eq!(history[0].status, SubscriptionStatus::Active);
    assert_eq!(history[1].tier, SubscriptionTier::Weekly);
    assert_eq!(history[1].status, SubscriptionStatus::Cancelled);

    let status = query::status_at(&mut conn, "user_1", later).unwrap().unwrap();
    assert_eq!(status.tier, SubscriptionTier::Monthly);

    let entitlement = query::user_entitlement_at(&mut conn, "user_1", later).unwrap();
    assert_eq!(entitlement.subscription_ids.len(), 2);
    assert!(entitlement.is_premium);
}

#[test]
fn test_history_reports_expiry_without_writing_it() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Weekly, "txn-1", plus_days(d, -30)),
        d,
    )
    .unwrap();

    let history = query::history_at(&mut conn, "user_1", d).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SubscriptionStatus::Expired);

    let stored = store::find_all_subscriptions_by_user(&mut conn, "user_1").unwrap();
    assert_eq!(stored[0].status, SubscriptionStatus::Active);
}

#[test]
fn test_two_active_rows_are_refused() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let d = now();
    db_guard.seed_two_active_subscriptions("user_1", d);
    let mut conn = db_guard.connection();

    let result = orchestrator::subscribe_at(
        &mut conn,
        "user_1",
        &purchase(SubscriptionTier::Yearly, "txn-blocked", d),
        d,
    );
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    // the ledger insert rolls back with the failed transaction
    assert_eq!(count_purchases(&mut conn, "txn-blocked"), 0);

    assert!(matches!(
        orchestrator::cancel_at(&mut conn, "user_1", d),
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        query::status_at(&mut conn, "user_1", d),
        Err(AppError::InvalidState(_))
    ));

    let history = query::history_at(&mut conn, "user_1", d).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|entry| entry.status == SubscriptionStatus::Active));
}

#[test]
fn test_unknown_user_and_empty_user() {
    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let mut conn = db_guard.connection();
    let d = now();

    let result = orchestrator::subscribe_at(
        &mut conn,
        "ghost",
        &purchase(SubscriptionTier::Weekly, "txn-1", d),
        d,
    );
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(count_purchases(&mut conn, "txn-1"), 0);

    assert!(matches!(
        orchestrator::cancel_at(&mut conn, "ghost", d),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        query::history_at(&mut conn, "ghost", d),
        Err(AppError::NotFound(_))
    ));

    assert!(orchestrator::cancel_at(&mut conn, "user_1", d)
        .unwrap()
        .is_none());
    assert!(query::status_at(&mut conn, "user_1", d).unwrap().is_none());
    assert!(query::history_at(&mut conn, "user_1", d).unwrap().is_empty());
}

#[test]
fn test_validation_runs_before_store_access() {
    let db_guard = TestDbGuard::new();
    let mut conn = db_guard.connection();
    let d = now();

    let request = purchase(SubscriptionTier::Weekly, "  ", d);
    let result = orchestrator::subscribe_at(&mut conn, "ghost", &request, d);
    assert!(matches!(result, Err(AppError::Validation(_))));

    let mut request = purchase(SubscriptionTier::Weekly, "txn-1", d);
    request.product_id = String::new();
    let result = orchestrator::subscribe_at(&mut conn, "ghost", &request, d);
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn test_concurrent_purchases_compose_into_one_active_row() {
    const PURCHASES: usize = 8;

    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let d = now();
    let barrier = Arc::new(Barrier::new(PURCHASES));

    let handles: Vec<_> = (0..PURCHASES)
        .map(|i| {
            let database_url = db_guard.database_url().to_string();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let mut conn = db::establish_connection(&database_url, BUSY_TIMEOUT_MS).unwrap();
                let request = purchase(SubscriptionTier::Weekly, &format!("txn-{i}"), d);
                barrier.wait();
                orchestrator::subscribe_at(&mut conn, "user_1", &request, d)
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let mut conn = db_guard.connection();
    let rows = store::find_all_subscriptions_by_user(&mut conn, "user_1").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, SubscriptionStatus::Active);
    assert_eq!(rows[0].end_date, Some(plus_days(d, 7 * PURCHASES as i64)));
    assert_eq!(
        store::find_purchases_by_user(&mut conn, "user_1").unwrap().len(),
        PURCHASES
    );
}

#[test]
fn test_concurrent_duplicates_apply_once() {
    const ATTEMPTS: usize = 6;

    let db_guard = TestDbGuard::new();
    db_guard.seed_user("user_1");
    let d = now();
    let barrier = Arc::new(Barrier::new(ATTEMPTS));

    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let database_url = db_guard.database_url().to_string();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let mut conn = db::establish_connection(&database_url, BUSY_TIMEOUT_MS).unwrap();
                let request = purchase(SubscriptionTier::Monthly, "retried-txn", d);
                barrier.wait();
                orchestrator::subscribe_at(&mut conn, "user_1", &request, d)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(AppError::DuplicatePurchase(_)))));

    let mut conn = db_guard.connection();
    assert_eq!(count_purchases(&mut conn, "retried-txn"), 1);
    let status = query::status_at(&mut conn, "user_1", d).unwrap().unwrap();
    assert_eq!(status.end_date, Some(utc(plus_months(d, 1))));
}
