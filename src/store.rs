//! Persistence operations the entitlement engine needs from SQLite.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::error::{AppError, AppResult};
use crate::model::{PurchaseRecord, Subscription, User};
use crate::schema::{purchases, subscriptions, users};
use crate::types::SubscriptionStatus;

pub fn find_user_by_id(conn: &mut SqliteConnection, user_id: &str) -> AppResult<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(user_id.to_string()))
}

pub fn insert_user(conn: &mut SqliteConnection, user: &User) -> AppResult<()> {
    diesel::insert_into(users::table)
        .values(user)
        .execute(conn)?;
    Ok(())
}

pub fn exists_purchase_by_transaction_id(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> AppResult<bool> {
    let exists = diesel::select(diesel::dsl::exists(
        purchases::table.filter(purchases::transaction_id.eq(transaction_id)),
    ))
    .get_result(conn)?;
    Ok(exists)
}

/// Raw insert; the diesel error is returned as-is so the ledger can tell a
/// uniqueness violation from other failures.
pub fn insert_purchase(
    conn: &mut SqliteConnection,
    record: &PurchaseRecord,
) -> Result<usize, diesel::result::Error> {
    diesel::insert_into(purchases::table)
        .values(record)
        .execute(conn)
}

pub fn find_purchases_by_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Vec<PurchaseRecord>> {
    let records = purchases::table
        .filter(purchases::user_id.eq(user_id))
        .order(purchases::purchased_at.asc())
        .select(PurchaseRecord::as_select())
        .load(conn)?;
    Ok(records)
}

/// The user's ACTIVE row regardless of whether its window has elapsed.
pub fn find_active_subscription_by_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Option<Subscription>> {
    let mut rows = subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .filter(subscriptions::status.eq(SubscriptionStatus::Active))
        .select(Subscription::as_select())
        .load(conn)?;

    if rows.len() > 1 {
        return Err(multiple_active(user_id, rows.len()));
    }
    Ok(rows.pop())
}

/// Error for a user holding more than one stored-ACTIVE row.
pub(crate) fn multiple_active(user_id: &str, count: usize) -> AppError {
    tracing::error!(user_id, count, "multiple ACTIVE subscriptions");
    AppError::InvalidState(format!("user {user_id} has {count} ACTIVE subscriptions"))
}

/// Every row for the user, most recent start first (ties broken by creation
/// time). Read paths rely on this order and do not re-sort.
pub fn find_all_subscriptions_by_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> AppResult<Vec<Subscription>> {
    let rows = subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .order((
            subscriptions::start_date.desc(),
            subscriptions::created_at.desc(),
        ))
        .select(Subscription::as_select())
        .load(conn)?;
    Ok(rows)
}

pub fn insert_subscription(conn: &mut SqliteConnection, sub: &Subscription) -> AppResult<()> {
    diesel::insert_into(subscriptions::table)
        .values(sub)
        .execute(conn)?;
    Ok(())
}

pub fn save_subscription(conn: &mut SqliteConnection, sub: &Subscription) -> AppResult<()> {
    let updated = diesel::update(subscriptions::table.find(&sub.id))
        .set((
            subscriptions::tier.eq(sub.tier),
            subscriptions::end_date.eq(sub.end_date),
            subscriptions::status.eq(sub.status),
            subscriptions::updated_at.eq(sub.updated_at),
        ))
        .execute(conn)?;

    if updated == 0 {
        return Err(AppError::InternalError(format!(
            "subscription {} vanished during update",
            sub.id
        )));
    }
    Ok(())
}
