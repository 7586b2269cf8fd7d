//! Entitlement state machine.
//!
//! Stored rows only ever move from ACTIVE to CANCELLED. Expiry is never
//! written back: it is derived from `end_date` against the evaluation instant
//! every time a row is read, so there is no sweep job to drift out of sync
//! with access checks.

use chrono::{Duration, Months, NaiveDateTime};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Subscription;
use crate::types::{SubscriptionStatus, SubscriptionTier};

/// How far a purchase of a given tier pushes an entitlement window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierDuration {
    Days(i64),
    /// Calendar months. Day-of-month clamps to the end of shorter months.
    Months(u32),
    Unbounded,
}

impl TierDuration {
    /// End of a window of this duration starting at `anchor`, `None` when unbounded.
    pub fn end_from(self, anchor: NaiveDateTime) -> AppResult<Option<NaiveDateTime>> {
        let end = match self {
            TierDuration::Days(days) => anchor.checked_add_signed(Duration::days(days)),
            TierDuration::Months(months) => anchor.checked_add_months(Months::new(months)),
            TierDuration::Unbounded => return Ok(None),
        };

        end.map(Some).ok_or_else(|| {
            AppError::Validation(format!("entitlement window starting at {anchor} overflows"))
        })
    }
}

impl SubscriptionTier {
    pub const fn duration(&self) -> TierDuration {
        match self {
            SubscriptionTier::Trial | SubscriptionTier::Weekly => TierDuration::Days(7),
            SubscriptionTier::Monthly => TierDuration::Months(1),
            SubscriptionTier::Yearly => TierDuration::Months(12),
            SubscriptionTier::Unlimited => TierDuration::Unbounded,
        }
    }
}

/// Status of a row as seen at a particular instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    Active { until: Option<NaiveDateTime> },
    /// Soft-cancelled: access continues until the stored end date.
    Cancelled { until: Option<NaiveDateTime> },
    Expired,
}

impl Entitlement {
    pub fn evaluate(sub: &Subscription, now: NaiveDateTime) -> Self {
        if matches!(sub.end_date, Some(end) if end <= now) {
            return Entitlement::Expired;
        }
        match sub.status {
            SubscriptionStatus::Active => Entitlement::Active {
                until: sub.end_date,
            },
            SubscriptionStatus::Cancelled => Entitlement::Cancelled {
                until: sub.end_date,
            },
            SubscriptionStatus::Expired => Entitlement::Expired,
        }
    }

    pub fn grants_access(&self) -> bool {
        !matches!(self, Entitlement::Expired)
    }

    pub fn status(&self) -> SubscriptionStatus {
        match self {
            Entitlement::Active { .. } => SubscriptionStatus::Active,
            Entitlement::Cancelled { .. } => SubscriptionStatus::Cancelled,
            Entitlement::Expired => SubscriptionStatus::Expired,
        }
    }
}

/// Stored status is ACTIVE and the window has not elapsed at `now`.
pub fn is_active(sub: &Subscription, now: NaiveDateTime) -> bool {
    matches!(Entitlement::evaluate(sub, now), Entitlement::Active { .. })
}

/// Open a fresh ACTIVE window for `tier` starting at `anchor`.
pub fn create(
    user_id: &str,
    tier: SubscriptionTier,
    anchor: NaiveDateTime,
    now: NaiveDateTime,
) -> AppResult<Subscription> {
    let end_date = tier.duration().end_from(anchor)?;
    Ok(Subscription {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        tier,
        start_date: anchor,
        end_date,
        status: SubscriptionStatus::Active,
        created_at: now,
        updated_at: now,
    })
}

/// Apply a purchase of `tier` to the user's ACTIVE row.
///
/// A dated purchase lengthens the window from whichever is later: the current
/// end date (still running) or `anchor` (already lapsed). An UNLIMITED window
/// never reverts to a dated one; a dated purchase on top of it leaves both the
/// tier and the open end untouched.
pub fn extend(
    existing: &mut Subscription,
    tier: SubscriptionTier,
    anchor: NaiveDateTime,
    now: NaiveDateTime,
) -> AppResult<()> {
    if existing.status != SubscriptionStatus::Active {
        return Err(AppError::InvalidState(format!(
            "subscription {} is {:?} and cannot be extended",
            existing.id, existing.status
        )));
    }

    let current_end = match existing.end_date {
        None => {
            existing.tier = SubscriptionTier::Unlimited;
            existing.updated_at = now;
            return Ok(());
        }
        Some(end) => end,
    };

    let base = current_end.max(anchor);
    existing.end_date = tier.duration().end_from(base)?;
    existing.tier = tier;
    existing.updated_at = now;
    Ok(())
}

/// Soft cancel. The end date is kept so access runs out naturally.
pub fn cancel(existing: &mut Subscription, now: NaiveDateTime) {
    existing.status = SubscriptionStatus::Cancelled;
    existing.updated_at = now;
}
