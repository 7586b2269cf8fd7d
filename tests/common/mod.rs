#![allow(dead_code)]

use chrono::{DateTime, Months, NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use focus_billing::db;
use focus_billing::entitlement;
use focus_billing::model::User;
use focus_billing::schema::purchases;
use focus_billing::store;
use focus_billing::types::SubscriptionTier;
use std::path::PathBuf;

pub const BUSY_TIMEOUT_MS: u64 = 10_000;

// Helper struct to ensure test database cleanup
pub struct TestDbGuard {
    db_path: PathBuf,
    database_url: String,
}

impl TestDbGuard {
    pub fn new() -> Self {
        let db_path =
            std::env::temp_dir().join(format!("focus_billing_test_{}.db", uuid::Uuid::new_v4()));
        let database_url = db_path.to_str().unwrap().to_string();

        let mut conn = db::establish_connection(&database_url, BUSY_TIMEOUT_MS).unwrap();
        db::run_migrations(&mut conn).unwrap();

        Self {
            db_path,
            database_url,
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn connection(&self) -> SqliteConnection {
        db::establish_connection(&self.database_url, BUSY_TIMEOUT_MS).unwrap()
    }

    pub fn seed_user(&self, user_id: &str) {
        let mut conn = self.connection();
        store::insert_user(&mut conn, &User::new(user_id)).unwrap();
    }

    /// Drop the one-ACTIVE-per-user index and store two ACTIVE rows for
    /// `user_id`, the state the engine must refuse to act on.
    pub fn seed_two_active_subscriptions(&self, user_id: &str, at: NaiveDateTime) {
        let mut conn = self.connection();
        conn.batch_execute("DROP INDEX subscriptions_one_active_per_user;")
            .unwrap();
        for tier in [SubscriptionTier::Weekly, SubscriptionTier::Monthly] {
            let sub = entitlement::create(user_id, tier, at, at).unwrap();
            store::insert_subscription(&mut conn, &sub).unwrap();
        }
    }
}

/// Ledger rows stored under `transaction_id`.
pub fn count_purchases(conn: &mut SqliteConnection, transaction_id: &str) -> i64 {
    purchases::table
        .filter(purchases::transaction_id.eq(transaction_id))
        .count()
        .get_result(conn)
        .unwrap()
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(self.db_path.with_extension("db-journal"));
    }
}

/// Whole-second "now" so timestamps survive every round trip unchanged.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now - chrono::Duration::nanoseconds(i64::from(now.and_utc().timestamp_subsec_nanos()))
}

pub fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

pub fn plus_months(anchor: NaiveDateTime, months: u32) -> NaiveDateTime {
    anchor.checked_add_months(Months::new(months)).unwrap()
}

pub fn plus_days(anchor: NaiveDateTime, days: i64) -> NaiveDateTime {
    anchor + chrono::Duration::days(days)
}
