//! Read-only entitlement projections. Status is evaluated against the clock
//! and never written back.

use chrono::{NaiveDateTime, Utc};
use diesel::sqlite::SqliteConnection;

use crate::entitlement::Entitlement;
use crate::error::AppResult;
use crate::model::{PurchaseRecord, Subscription};
use crate::store;
use crate::types::{
    to_utc, PurchaseLedgerEntry, SubscriptionHistoryEntry, SubscriptionStatus, SubscriptionStatusResponse,
    UserEntitlementResponse,
};

pub fn snapshot(sub: &Subscription, now: NaiveDateTime) -> SubscriptionStatusResponse {
    SubscriptionStatusResponse {
        tier: sub.tier,
        start_date: to_utc(sub.start_date),
        end_date: sub.end_date.map(to_utc),
        status: Entitlement::evaluate(sub, now).status(),
    }
}

/// The row currently granting access. The stored-ACTIVE row wins over a
/// soft-cancelled one that still has time left. Expects `subs` in store order,
/// most recent first.
pub fn current_status(
    subs: &[Subscription],
    now: NaiveDateTime,
) -> Option<SubscriptionStatusResponse> {
    let grants = |sub: &&Subscription| Entitlement::evaluate(sub, now).grants_access();

    subs.iter()
        .filter(|sub| sub.status == SubscriptionStatus::Active)
        .find(grants)
        .or_else(|| subs.iter().find(grants))
        .map(|sub| snapshot(sub, now))
}

/// History rows with evaluated status, in the order given. Ordering belongs to
/// `store::find_all_subscriptions_by_user`.
pub fn history_entries(
    subs: &[Subscription],
    now: NaiveDateTime,
) -> Vec<SubscriptionHistoryEntry> {
    subs.iter()
        .map(|sub| SubscriptionHistoryEntry {
            id: sub.id.clone(),
            tier: sub.tier,
            start_date: to_utc(sub.start_date),
            end_date: sub.end_date.map(to_utc),
            status: Entitlement::evaluate(sub, now).status(),
        })
        .collect()
}

pub fn status(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Option<SubscriptionStatusResponse>> {
    status_at(conn, user_id, Utc::now().naive_utc())
}

pub fn status_at(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: NaiveDateTime,
) -> AppResult<Option<SubscriptionStatusResponse>> {
    let user = store::find_user_by_id(conn, user_id)?;
    let subs = store::find_all_subscriptions_by_user(conn, &user.id)?;

    let active = subs
        .iter()
        .filter(|sub| sub.status == SubscriptionStatus::Active)
        .count();
    if active > 1 {
        return Err(store::multiple_active(&user.id, active));
    }
    Ok(current_status(&subs, now))
}

pub fn history(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Vec<SubscriptionHistoryEntry>> {
    history_at(conn, user_id, Utc::now().naive_utc())
}

pub fn history_at(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: NaiveDateTime,
) -> AppResult<Vec<SubscriptionHistoryEntry>> {
    let user = store::find_user_by_id(conn, user_id)?;
    let subs = store::find_all_subscriptions_by_user(conn, &user.id)?;
    Ok(history_entries(&subs, now))
}

pub fn user_entitlement(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<UserEntitlementResponse> {
    user_entitlement_at(conn, user_id, Utc::now().naive_utc())
}

/// The user's subscription ids plus a premium flag recomputed from them.
pub fn user_entitlement_at(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: NaiveDateTime,
) -> AppResult<UserEntitlementResponse> {
    let user = store::find_user_by_id(conn, user_id)?;
    let subs = store::find_all_subscriptions_by_user(conn, &user.id)?;

    Ok(UserEntitlementResponse {
        is_premium: subs
            .iter()
            .any(|sub| Entitlement::evaluate(sub, now).grants_access()),
        subscription_ids: subs.into_iter().map(|sub| sub.id).collect(),
        user_id: user.id,
    })
}

impl From<PurchaseRecord> for PurchaseLedgerEntry {
    fn from(record: PurchaseRecord) -> Self {
        Self {
            transaction_id: record.transaction_id,
            platform: record.platform,
            product_id: record.product_id,
            purchased_at: to_utc(record.purchased_at),
            expires_at: record.expires_at.map(to_utc),
            price_amount: record.price_amount,
            currency_code: record.currency_code,
        }
    }
}

/// Ledger rows applied to the user, oldest purchase first.
pub fn purchases(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Vec<PurchaseLedgerEntry>> {
    let user = store::find_user_by_id(conn, user_id)?;
    let records = store::find_purchases_by_user(conn, &user.id)?;
    Ok(records.into_iter().map(PurchaseLedgerEntry::from).collect())
}
