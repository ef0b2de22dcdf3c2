// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! `SQLite` persistence for the affiliate ledger.
//!
//! [`SqliteStore`] implements the core `LedgerStore` contract on Diesel.
//! Each entity is stored as a JSON document next to the key and timestamp
//! columns queries filter on; uniqueness (commission source keys, referral
//! codes, one active withdrawal per referrer) is enforced by the schema.
//!
//! ## Transactions
//!
//! Every `try_transaction` runs inside `BEGIN IMMEDIATE`, so the write lock
//! is taken before the body reads anything. A second process holding the
//! lock past the busy timeout surfaces as `StoreError::Conflict`, which the
//! retry loop in `run_transaction` handles.
//!
//! ## Testing
//!
//! [`SqliteStore::new_in_memory`] gives every call its own shared-cache
//! memory database, so tests are isolated without touching the filesystem.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::suspicious,
    clippy::complexity,
    clippy::perf,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::multiple_crate_versions)]

use diesel::SqliteConnection;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use affilink::{DueCursor, LedgerStore, LedgerTx, StoreError, TxFailure};
use affilink_audit::AuditEvent;
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, CodeSlot, Commission, CommissionId, CommissionStatus,
    CommissionType, FraudAlert, ProfileId, Referral, ReferralScheme, SourceKey, Withdrawal,
    WithdrawalId, WithdrawalStatus,
};
use time::OffsetDateTime;

mod backend;
mod data_models;
mod diesel_schema;
mod error;
mod mutations;
mod queries;

#[cfg(test)]
mod tests;

pub use error::PersistenceError;

/// Atomic counter for generating unique in-memory database names.
static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A `LedgerStore` backed by a single `SQLite` connection.
pub struct SqliteStore {
    conn: Mutex<SqliteConnection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Creates a store over a fresh, uniquely named in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn new_in_memory() -> Result<Self, PersistenceError> {
        let db_id: u64 = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let shared_memory_url: String = format!("file:affilink_memdb_{db_id}?mode=memory&cache=shared");

        let mut conn: SqliteConnection = backend::sqlite::initialize_database(&shared_memory_url)?;
        backend::sqlite::verify_foreign_key_enforcement(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (or creates) a file-based database.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the `SQLite` database file
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new_with_file<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path_str: &str = path.as_ref().to_str().ok_or_else(|| {
            PersistenceError::InitializationError("Invalid database path".to_string())
        })?;

        let mut conn: SqliteConnection = backend::sqlite::initialize_database(path_str)?;
        backend::sqlite::enable_wal_mode(&mut conn)?;
        backend::sqlite::verify_foreign_key_enforcement(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Why an immediate transaction rolled back.
enum Abort<E> {
    Body(E),
    Database(diesel::result::Error),
}

impl<E> From<diesel::result::Error> for Abort<E> {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err)
    }
}

impl LedgerStore for SqliteStore {
    fn try_transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        E: TxFailure,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
    {
        // Diesel rolls back before the error reaches us, so the connection
        // behind a poisoned lock is idle and usable.
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.immediate_transaction(|conn| {
            let mut tx: SqliteTx<'_> = SqliteTx { conn };
            body(&mut tx).map_err(Abort::Body)
        })
        .map_err(|abort| match abort {
            Abort::Body(err) => err,
            Abort::Database(err) => E::from(StoreError::from(PersistenceError::from(err))),
        })
    }
}

/// The `LedgerTx` view of a connection inside an open transaction.
struct SqliteTx<'a> {
    conn: &'a mut SqliteConnection,
}

impl LedgerTx for SqliteTx<'_> {
    fn profile(&mut self, id: &ProfileId) -> Result<Option<AffiliateProfile>, StoreError> {
        Ok(queries::profiles::get_profile(self.conn, id)?)
    }

    fn insert_profile(&mut self, profile: &AffiliateProfile) -> Result<(), StoreError> {
        Ok(mutations::profiles::insert_profile(self.conn, profile)?)
    }

    fn put_profile(&mut self, profile: &AffiliateProfile) -> Result<(), StoreError> {
        Ok(mutations::profiles::update_profile(self.conn, profile)?)
    }

    fn find_profile_by_code(
        &mut self,
        slot: CodeSlot,
        code: &str,
    ) -> Result<Option<ProfileId>, StoreError> {
        Ok(queries::profiles::find_profile_by_code(self.conn, slot, code)?)
    }

    fn count_profiles_by_ip_since(
        &mut self,
        ip: &str,
        since: OffsetDateTime,
        exclude: &ProfileId,
    ) -> Result<u32, StoreError> {
        Ok(queries::profiles::count_profiles_by_ip_since(
            self.conn, ip, since, exclude,
        )?)
    }

    fn count_profiles_by_device(
        &mut self,
        device: &str,
        exclude: &ProfileId,
    ) -> Result<u32, StoreError> {
        Ok(queries::profiles::count_profiles_by_device(
            self.conn, device, exclude,
        )?)
    }

    fn profiles_with_qualified_referrals(&mut self) -> Result<Vec<ProfileId>, StoreError> {
        Ok(queries::profiles::profiles_with_qualified_referrals(
            self.conn,
        )?)
    }

    fn commission(&mut self, id: &CommissionId) -> Result<Option<Commission>, StoreError> {
        Ok(queries::commissions::get_commission(self.conn, id)?)
    }

    fn find_commission_by_source(
        &mut self,
        key: &SourceKey,
    ) -> Result<Option<Commission>, StoreError> {
        Ok(queries::commissions::find_commission_by_source(
            self.conn, key,
        )?)
    }

    fn insert_commission(&mut self, commission: &Commission) -> Result<(), StoreError> {
        Ok(mutations::commissions::insert_commission(
            self.conn, commission,
        )?)
    }

    fn put_commission(&mut self, commission: &Commission) -> Result<(), StoreError> {
        Ok(mutations::commissions::update_commission(
            self.conn, commission,
        )?)
    }

    fn due_commissions(
        &mut self,
        status: CommissionStatus,
        now: OffsetDateTime,
        after: Option<&DueCursor>,
        limit: usize,
    ) -> Result<Vec<Commission>, StoreError> {
        Ok(queries::commissions::due_commissions(
            self.conn, status, now, after, limit,
        )?)
    }

    fn available_commissions(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Commission>, StoreError> {
        Ok(queries::commissions::commissions_for_referrer(
            self.conn,
            referrer,
            Some(CommissionStatus::Available),
        )?)
    }

    fn commissions_for_referrer(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Commission>, StoreError> {
        Ok(queries::commissions::commissions_for_referrer(
            self.conn, referrer, None,
        )?)
    }

    fn count_commissions(
        &mut self,
        referrer: &ProfileId,
        commission_type: CommissionType,
        referee: Option<&ProfileId>,
        since: Option<OffsetDateTime>,
    ) -> Result<u32, StoreError> {
        Ok(queries::commissions::count_commissions(
            self.conn,
            referrer,
            commission_type,
            referee,
            since,
        )?)
    }

    fn referral(
        &mut self,
        referee: &ProfileId,
        scheme: ReferralScheme,
    ) -> Result<Option<Referral>, StoreError> {
        Ok(queries::referrals::get_referral(self.conn, referee, scheme)?)
    }

    fn put_referral(&mut self, referral: &Referral) -> Result<(), StoreError> {
        Ok(mutations::referrals::upsert_referral(self.conn, referral)?)
    }

    fn referrals_by_referrer(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Referral>, StoreError> {
        Ok(queries::referrals::referrals_by_referrer(
            self.conn, referrer,
        )?)
    }

    fn withdrawal(&mut self, id: &WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        Ok(queries::withdrawals::get_withdrawal(self.conn, id)?)
    }

    fn insert_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        Ok(mutations::withdrawals::insert_withdrawal(
            self.conn, withdrawal,
        )?)
    }

    fn put_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        Ok(mutations::withdrawals::update_withdrawal(
            self.conn, withdrawal,
        )?)
    }

    fn active_withdrawal(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Option<Withdrawal>, StoreError> {
        Ok(queries::withdrawals::active_withdrawal(self.conn, referrer)?)
    }

    fn withdrawals_since(
        &mut self,
        referrer: &ProfileId,
        since: OffsetDateTime,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        Ok(queries::withdrawals::withdrawals_since(
            self.conn, referrer, since,
        )?)
    }

    fn withdrawals_by_status(
        &mut self,
        status: WithdrawalStatus,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        Ok(queries::withdrawals::withdrawals_by_status(
            self.conn, status,
        )?)
    }

    fn config(&mut self) -> Result<Option<AffiliateConfig>, StoreError> {
        Ok(queries::records::get_config(self.conn)?)
    }

    fn put_config(&mut self, config: &AffiliateConfig) -> Result<(), StoreError> {
        Ok(mutations::records::put_config(self.conn, config)?)
    }

    fn insert_fraud_alert(&mut self, alert: &FraudAlert) -> Result<(), StoreError> {
        Ok(mutations::records::insert_fraud_alert(self.conn, alert)?)
    }

    fn fraud_alerts_for(&mut self, subject: &ProfileId) -> Result<Vec<FraudAlert>, StoreError> {
        Ok(queries::records::fraud_alerts_for(self.conn, subject)?)
    }

    fn append_audit_event(&mut self, event: &AuditEvent) -> Result<(), StoreError> {
        Ok(mutations::records::append_audit_event(self.conn, event)?)
    }

    fn audit_events_for(
        &mut self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(queries::records::audit_events_for(
            self.conn,
            entity_type,
            entity_id,
        )?)
    }
}
