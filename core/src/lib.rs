//! schoolcost-core: expense ledger and cost-per-student metrics for a
//! network of schools.
//!
//! Raw facts (expense entries, payroll, student counts) are written only
//! through `LedgerService`. Every write recomputes the derived metric for
//! its (institution, period) key in the same transaction.

pub mod account;
pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod metrics;
pub mod period;
pub mod registration;
pub mod reporting;
pub mod role;
pub mod store;
pub mod types;
pub mod variance;
