use crate::types::{Platform, SubscribeRequest, SubscriptionStatus, SubscriptionTier};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

/// Owner of entitlement rows. Subscriptions point at their user; the user row
/// holds no back-references.
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: String,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Ledger entry for a processed purchase. Never updated after insert.
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::purchases)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PurchaseRecord {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub product_id: String,
    pub transaction_id: String,
    pub receipt_data: Option<String>,
    pub purchase_token: Option<String>,
    pub purchased_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
    pub price_amount: Option<i64>,
    pub currency_code: Option<String>,
    pub created_at: NaiveDateTime,
}

impl PurchaseRecord {
    /// Build the ledger entry for `request`. A missing purchase timestamp is
    /// recorded as `now`.
    pub fn from_request(user_id: &str, request: &SubscribeRequest, now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            platform: request.platform,
            product_id: request.product_id.trim().to_string(),
            transaction_id: request.transaction_id.trim().to_string(),
            receipt_data: request.receipt_data.clone(),
            purchase_token: request.purchase_token.clone(),
            purchased_at: request
                .purchased_at
                .map(|ts| ts.naive_utc())
                .unwrap_or(now),
            expires_at: request.expires_at.map(|ts| ts.naive_utc()),
            price_amount: request.price_amount,
            currency_code: request.currency_code.clone(),
            created_at: now,
        }
    }
}

/// One entitlement window. `end_date` is `None` only for UNLIMITED windows.
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub status: SubscriptionStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
