// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Transactional services of the affiliate commission engine.
//!
//! Components share an [`EngineContext`]: a [`LedgerStore`], a [`Clock`]
//! and a cached [`ConfigStore`]. All state changes run inside
//! `LedgerStore::run_transaction`, re-reading the documents they touch so a
//! retried transaction never acts on stale data.

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

mod attribution;
mod audit_log;
mod clock;
mod config_store;
mod context;
mod engine;
mod error;
mod fraud_gate;
mod graph;
mod ledger;
mod memory;
mod payout;
mod rates;
mod reconciler;
mod store;

#[cfg(test)]
mod tests;

pub use attribution::{
    AttributionDecision, AttributionRejection, AttributionResolver, ResolvedCode,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::{ConfigStore, DEFAULT_CONFIG_TTL};
pub use context::EngineContext;
pub use engine::{
    ActionEvent, ActionOutcome, AffiliateEngine, AttributionStatus, ReferredAction, Registration,
    RegistrationOutcome, SubscriptionPeriod,
};
pub use error::{CoreError, StoreError, TxFailure};
pub use fraud_gate::{FraudGate, FraudScorer, GateOutcome, PayoutCheck, RuleBasedScorer, check_payout};
pub use graph::{LegOutcome, ReferralGraph, TierScanReport};
pub use ledger::{CommissionCreationResult, CommissionInput, CommissionLedger, TransitionOutcome};
pub use memory::InMemoryStore;
pub use payout::{
    PayoutOrchestrator, PollReport, ProviderError, Quote, TransferProvider, TransferStatus,
};
pub use rates::{capture_rates, ensure_captured};
pub use reconciler::{DEFAULT_PAGE_SIZE, ReconcileReport, Reconciler};
pub use store::{
    DueCursor, LedgerStore, LedgerTx, MAX_TRANSACTION_ATTEMPTS, run_transaction_async,
};
