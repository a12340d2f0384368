//! Ledger, loan accounting, and dual-layer persistence for a shared
//! community economy.
//!
//! The [`TreasuryEngine`] owns all economy state: account balances, active
//! loans, the bounded transaction journal, and GDP records for group
//! entities. Every mutation is validated before state is touched, journaled,
//! and written through to local JSON snapshots with an optional remote
//! PostgreSQL mirror that is authoritative across restarts. An anomaly
//! corrector repairs invalid states at boot and on a schedule.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod gdp;
pub mod journal;
pub mod loans;
pub mod storage;
pub mod store;
pub mod sweep;
pub mod types;

pub use engine::{EconomySnapshot, EngineConfig, TreasuryEngine};
pub use error::TreasuryError;
pub use gdp::GdpRegistry;
pub use journal::{TransactionJournal, JOURNAL_CAPACITY};
pub use loans::{LoanBook, RepaymentOutcome};
pub use storage::{
    MirrorConfig, PersistenceGateway, PostgresMirror, RemoteMirror, RemoteSnapshot, SnapshotStore,
    Table,
};
pub use store::LedgerStore;
pub use sweep::{AnomalyCorrector, Correction, SweepConfig, SweepReport};
pub use types::{GdpRecord, Loan, Repayment, Transaction, TransactionKind};
