//! Transactional subscribe/cancel use cases.
//!
//! Both operations run in `BEGIN IMMEDIATE` transactions: SQLite's write lock
//! is taken before the current ACTIVE row is read, so concurrent calls for the
//! same user are applied one after another and the ledger row commits or
//! rolls back together with the entitlement change.
//!
//! The lock covers the whole database, not one user: writers for different
//! users also queue behind each other. A call that waits longer than the
//! connection's `busy_timeout` fails with `AppError::DatabaseOperation`.
//! Reads are not blocked.

use chrono::{NaiveDateTime, Utc};
use diesel::sqlite::SqliteConnection;
use validator::Validate;

use crate::entitlement;
use crate::error::{AppError, AppResult};
use crate::ledger::{self, LedgerOutcome};
use crate::model::PurchaseRecord;
use crate::query;
use crate::store;
use crate::types::{SubscribeRequest, SubscriptionStatusResponse};

pub fn subscribe(
    conn: &mut SqliteConnection,
    user_id: &str,
    request: &SubscribeRequest,
) -> AppResult<SubscriptionStatusResponse> {
    subscribe_at(conn, user_id, request, Utc::now().naive_utc())
}

/// Apply a purchase to the user's entitlement, creating or extending the
/// ACTIVE window. A transaction id seen before fails with
/// `AppError::DuplicatePurchase` and changes nothing.
pub fn subscribe_at(
    conn: &mut SqliteConnection,
    user_id: &str,
    request: &SubscribeRequest,
    now: NaiveDateTime,
) -> AppResult<SubscriptionStatusResponse> {
    request.validate()?;

    conn.immediate_transaction(|conn| {
        let user = store::find_user_by_id(conn, user_id)?;
        let record = PurchaseRecord::from_request(&user.id, request, now);

        if ledger::record_if_new(conn, &record)? == LedgerOutcome::DuplicateRejected {
            tracing::warn!(
                user_id = %user.id,
                transaction_id = %record.transaction_id,
                "duplicate purchase rejected"
            );
            return Err(AppError::DuplicatePurchase(record.transaction_id));
        }

        let anchor = record.purchased_at;
        let subscription = match store::find_active_subscription_by_user(conn, &user.id)? {
            None => {
                let created = entitlement::create(&user.id, request.tier, anchor, now)?;
                store::insert_subscription(conn, &created)?;
                tracing::info!(
                    user_id = %user.id,
                    transaction_id = %record.transaction_id,
                    tier = %created.tier,
                    end_date = ?created.end_date,
                    "subscription created"
                );
                created
            }
            Some(mut existing) => {
                entitlement::extend(&mut existing, request.tier, anchor, now)?;
                store::save_subscription(conn, &existing)?;
                tracing::info!(
                    user_id = %user.id,
                    transaction_id = %record.transaction_id,
                    tier = %existing.tier,
                    end_date = ?existing.end_date,
                    "subscription extended"
                );
                existing
            }
        };

        Ok(query::snapshot(&subscription, now))
    })
}

pub fn cancel(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Option<SubscriptionStatusResponse>> {
    cancel_at(conn, user_id, Utc::now().naive_utc())
}

/// Soft-cancel the ACTIVE row. Returns `None` when there is nothing to cancel,
/// so repeated calls are harmless.
pub fn cancel_at(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: NaiveDateTime,
) -> AppResult<Option<SubscriptionStatusResponse>> {
    conn.immediate_transaction(|conn| {
        let user = store::find_user_by_id(conn, user_id)?;

        let Some(mut active) = store::find_active_subscription_by_user(conn, &user.id)? else {
            tracing::debug!(user_id = %user.id, "no active subscription to cancel");
            return Ok(None);
        };

        entitlement::cancel(&mut active, now);
        store::save_subscription(conn, &active)?;
        tracing::info!(
            user_id = %user.id,
            subscription_id = %active.id,
            end_date = ?active.end_date,
            "subscription cancelled"
        );

        Ok(Some(query::snapshot(&active, now)))
    })
}
