use base64::prelude::*;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Store the purchase was made through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Apple,
    Google,
}

impl ToSql<Text, Sqlite> for Platform {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        match *self {
            Platform::Apple => <&str as ToSql<Text, Sqlite>>::to_sql(&"APPLE", out),
            Platform::Google => <&str as ToSql<Text, Sqlite>>::to_sql(&"GOOGLE", out),
        }
    }
}

impl FromSql<Text, Sqlite> for Platform {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let platform_str = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        match platform_str.as_str() {
            "APPLE" => Ok(Platform::Apple),
            "GOOGLE" => Ok(Platform::Google),
            _ => Err("Invalid purchase platform".into()),
        }
    }
}

/// Subscription product class. Each tier carries a fixed duration rule,
/// see `crate::entitlement::TierDuration`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    AsExpression,
    FromSqlRow,
    ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    Trial,
    Weekly,
    Monthly,
    Yearly,
    Unlimited,
}

impl SubscriptionTier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Trial => "TRIAL",
            SubscriptionTier::Weekly => "WEEKLY",
            SubscriptionTier::Monthly => "MONTHLY",
            SubscriptionTier::Yearly => "YEARLY",
            SubscriptionTier::Unlimited => "UNLIMITED",
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Sqlite> for SubscriptionTier {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        match *self {
            SubscriptionTier::Trial => <&str as ToSql<Text, Sqlite>>::to_sql(&"TRIAL", out),
            SubscriptionTier::Weekly => <&str as ToSql<Text, Sqlite>>::to_sql(&"WEEKLY", out),
            SubscriptionTier::Monthly => <&str as ToSql<Text, Sqlite>>::to_sql(&"MONTHLY", out),
            SubscriptionTier::Yearly => <&str as ToSql<Text, Sqlite>>::to_sql(&"YEARLY", out),
            SubscriptionTier::Unlimited => {
                <&str as ToSql<Text, Sqlite>>::to_sql(&"UNLIMITED", out)
            }
        }
    }
}

impl FromSql<Text, Sqlite> for SubscriptionTier {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let tier_str = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        match tier_str.as_str() {
            "TRIAL" => Ok(SubscriptionTier::Trial),
            "WEEKLY" => Ok(SubscriptionTier::Weekly),
            "MONTHLY" => Ok(SubscriptionTier::Monthly),
            "YEARLY" => Ok(SubscriptionTier::Yearly),
            "UNLIMITED" => Ok(SubscriptionTier::Unlimited),
            _ => Err("Invalid subscription tier".into()),
        }
    }
}

/// Subscription status. The stored column only ever moves ACTIVE -> CANCELLED;
/// EXPIRED is produced when a row is evaluated against the clock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl ToSql<Text, Sqlite> for SubscriptionStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        match *self {
            SubscriptionStatus::Active => <&str as ToSql<Text, Sqlite>>::to_sql(&"ACTIVE", out),
            SubscriptionStatus::Cancelled => {
                <&str as ToSql<Text, Sqlite>>::to_sql(&"CANCELLED", out)
            }
            SubscriptionStatus::Expired => <&str as ToSql<Text, Sqlite>>::to_sql(&"EXPIRED", out),
        }
    }
}

impl FromSql<Text, Sqlite> for SubscriptionStatus {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let status_str = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        match status_str.as_str() {
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "CANCELLED" => Ok(SubscriptionStatus::Cancelled),
            "EXPIRED" => Ok(SubscriptionStatus::Expired),
            _ => Err("Invalid subscription status".into()),
        }
    }
}

/// Purchase facts extracted upstream from an already validated store receipt.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[validate(schema(function = "validate_purchase_facts"))]
pub struct SubscribeRequest {
    pub tier: SubscriptionTier,
    pub platform: Platform,
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub product_id: String,
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub transaction_id: String,
    #[validate(custom = "validate_not_blank")]
    pub purchase_token: Option<String>,
    #[validate(custom = "validate_receipt_data")]
    pub receipt_data: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Price in minor currency units
    pub price_amount: Option<i64>,
    #[validate(custom = "validate_currency_code")]
    pub currency_code: Option<String>,
}

impl SubscribeRequest {
    /// Minimal command for `tier` identified by `transaction_id`.
    pub fn new(
        tier: SubscriptionTier,
        platform: Platform,
        product_id: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            tier,
            platform,
            product_id: product_id.into(),
            transaction_id: transaction_id.into(),
            purchase_token: None,
            receipt_data: None,
            purchased_at: None,
            expires_at: None,
            price_amount: None,
            currency_code: None,
        }
    }

    pub fn purchased_at(mut self, purchased_at: DateTime<Utc>) -> Self {
        self.purchased_at = Some(purchased_at);
        self
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_receipt_data(value: &str) -> Result<(), ValidationError> {
    validate_not_blank(value)?;
    if BASE64_STANDARD.decode(value.trim()).is_err() {
        let mut err = ValidationError::new("receipt_encoding");
        err.message = Some("receipt data must be base64".into());
        return Err(err);
    }
    Ok(())
}

fn validate_currency_code(value: &str) -> Result<(), ValidationError> {
    if value.len() != 3 || !value.chars().all(|c| c.is_ascii_uppercase()) {
        let mut err = ValidationError::new("currency_code");
        err.message = Some("currency code must be three uppercase letters".into());
        return Err(err);
    }
    Ok(())
}

fn validate_purchase_facts(request: &SubscribeRequest) -> Result<(), ValidationError> {
    if matches!(request.price_amount, Some(amount) if amount < 0) {
        let mut err = ValidationError::new("negative_price");
        err.message = Some("price_amount must not be negative".into());
        return Err(err);
    }
    if let (Some(purchased_at), Some(expires_at)) = (request.purchased_at, request.expires_at) {
        if expires_at < purchased_at {
            let mut err = ValidationError::new("expires_before_purchase");
            err.message = Some("expires_at precedes purchased_at".into());
            return Err(err);
        }
    }
    Ok(())
}

/// Snapshot of one entitlement window with its status evaluated at read time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct SubscriptionStatusResponse {
    pub tier: SubscriptionTier,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct SubscriptionHistoryEntry {
    pub id: String,
    pub tier: SubscriptionTier,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
}

/// A processed purchase as recorded in the ledger. Receipt payloads and store
/// tokens are not echoed back.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct PurchaseLedgerEntry {
    pub transaction_id: String,
    pub platform: Platform,
    pub product_id: String,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Price in minor currency units
    pub price_amount: Option<i64>,
    pub currency_code: Option<String>,
}

/// Derived premium flag for a user, always recomputed from subscription rows.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct UserEntitlementResponse {
    pub user_id: String,
    pub subscription_ids: Vec<String>,
    pub is_premium: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct EmptyData {}

/// Envelope for every JSON response body.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            msg: None,
            data: Some(data),
        }
    }

    pub fn ok_with_msg(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            msg: Some(msg.into()),
            data: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: Some(msg.into()),
            data: None,
        }
    }
}

pub(crate) fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}
