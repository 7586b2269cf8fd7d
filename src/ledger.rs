//! Append-only record of processed purchases, keyed by platform transaction id.
//!
//! Recording is the idempotency gate: a purchase is applied only if its
//! ledger row was written by the same transaction.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;

use crate::error::AppResult;
use crate::model::PurchaseRecord;
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Accepted,
    DuplicateRejected,
}

/// Insert `record` unless its transaction id is already known.
///
/// The existence check and the UNIQUE constraint on `transaction_id` both map
/// to `DuplicateRejected`, so a racing writer that slips past the check is
/// still rejected by the insert.
pub fn record_if_new(
    conn: &mut SqliteConnection,
    record: &PurchaseRecord,
) -> AppResult<LedgerOutcome> {
    if store::exists_purchase_by_transaction_id(conn, &record.transaction_id)? {
        return Ok(LedgerOutcome::DuplicateRejected);
    }

    match store::insert_purchase(conn, record) {
        Ok(_) => Ok(LedgerOutcome::Accepted),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Ok(LedgerOutcome::DuplicateRejected)
        }
        Err(err) => Err(err.into()),
    }
}
