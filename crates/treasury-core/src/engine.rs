use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::TreasuryError;
use crate::gdp::GdpRegistry;
use crate::journal::{TransactionJournal, JOURNAL_CAPACITY};
use crate::loans::{LoanBook, RepaymentOutcome};
use crate::storage::{MirrorConfig, PersistenceGateway, Table};
use crate::store::LedgerStore;
use crate::sweep::{AnomalyCorrector, SweepConfig, SweepReport};
use crate::types::{GdpRecord, Loan, Transaction, TransactionKind};

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub mirror: MirrorConfig,
    pub journal_capacity: usize,
    pub sweep: SweepConfig,
    /// Community scope stamped on every journal entry (one ledger serves
    /// one community).
    pub scope_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            mirror: MirrorConfig::Disabled,
            journal_capacity: JOURNAL_CAPACITY,
            sweep: SweepConfig::default(),
            scope_id: None,
        }
    }
}

/// The economy service object: owns all ledger state and the persistence
/// gateway, constructed once per process and passed by reference into
/// whatever dispatches commands.
///
/// Single-threaded cooperative model: each operation runs to completion
/// under one `&mut self` borrow, so same-account operations cannot
/// interleave mid-mutation. Persistence failures are logged and never fail
/// a committed ledger mutation; in-memory state stays authoritative for the
/// life of the process.
pub struct TreasuryEngine {
    store: LedgerStore,
    gdp: GdpRegistry,
    loans: LoanBook,
    journal: TransactionJournal,
    corrector: AnomalyCorrector,
    gateway: PersistenceGateway,
    scope_id: Option<String>,
}

impl TreasuryEngine {
    /// Boot sequence: pull the remote mirror over local storage, load local
    /// snapshots into memory, then run the boot-time anomaly sweep.
    pub async fn bootstrap(config: EngineConfig) -> Result<Self, TreasuryError> {
        let gateway = PersistenceGateway::bootstrap(&config.data_dir, config.mirror).await?;

        match gateway.restore_from_remote().await {
            Ok(0) => {}
            Ok(n) => info!(tables = n, "remote mirror restored before load"),
            // a dead mirror at boot degrades to local snapshots, not a crash
            Err(e) => warn!(error = %e, "remote restore failed, loading local snapshots"),
        }

        let balances: BTreeMap<String, i64> = gateway.load(Table::Balances);
        let loans: Vec<Loan> = gateway.load(Table::Loans);
        let transactions: Vec<Transaction> = gateway.load(Table::Transactions);
        let gdp: BTreeMap<String, GdpRecord> = gateway.load(Table::Gdp);

        let mut engine = Self {
            store: LedgerStore::from_snapshot(balances),
            gdp: GdpRegistry::from_snapshot(gdp),
            loans: LoanBook::from_snapshot(loans),
            journal: TransactionJournal::from_snapshot(config.journal_capacity, transactions),
            corrector: AnomalyCorrector::new(config.sweep),
            gateway,
            scope_id: config.scope_id,
        };

        let report = engine.run_sweep();
        if report.changed() {
            info!(
                clamped = report.negative_clamped.len(),
                corrected = report.magnitude_corrected.len(),
                "boot sweep repaired ledger state"
            );
        }
        info!(
            accounts = engine.store.len(),
            loans = engine.loans.len(),
            journal = engine.journal.len(),
            "treasury engine ready"
        );
        Ok(engine)
    }

    // --- Ledger operations ---

    pub fn balance(&self, id: &str) -> i64 {
        self.store.balance(id)
    }

    pub fn total_supply(&self) -> i64 {
        self.store.total_supply()
    }

    /// Administrative mint into an account. Not journaled (the journal
    /// tracks movements between entities, not issuance adjustments).
    pub fn credit(&mut self, id: &str, amount: i64) -> Result<i64, TreasuryError> {
        let balance = self.store.credit(id, amount)?;
        self.flush(Table::Balances);
        Ok(balance)
    }

    /// Administrative burn from an account. Not journaled.
    pub fn debit(&mut self, id: &str, amount: i64) -> Result<i64, TreasuryError> {
        let balance = self.store.debit(id, amount)?;
        self.flush(Table::Balances);
        Ok(balance)
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: i64) -> Result<(), TreasuryError> {
        self.store.transfer(from, to, amount)?;
        self.record(TransactionKind::Transfer, Some(from), Some(to), amount);
        self.flush(Table::Balances);
        self.flush(Table::Transactions);
        Ok(())
    }

    /// Remove funds from circulation (payment to the central issuer).
    pub fn destroy(&mut self, id: &str, amount: i64) -> Result<i64, TreasuryError> {
        let balance = self.store.destroy(id, amount)?;
        self.record(TransactionKind::Destroy, Some(id), None, amount);
        self.flush(Table::Balances);
        self.flush(Table::Transactions);
        Ok(balance)
    }

    // --- Loans ---

    pub fn issue_loan(
        &mut self,
        borrower_id: &str,
        principal: i64,
        rate_percent: f64,
        term_days: i64,
        lender_id: Option<&str>,
    ) -> Result<Loan, TreasuryError> {
        let loan = self.loans.issue(
            &mut self.store,
            &self.gdp,
            borrower_id,
            principal,
            rate_percent,
            term_days,
            lender_id,
        )?;
        self.record(
            TransactionKind::LoanIssue,
            lender_id,
            Some(borrower_id),
            principal,
        );
        self.flush(Table::Balances);
        self.flush(Table::Loans);
        self.flush(Table::Transactions);
        Ok(loan)
    }

    pub fn repay_loan(
        &mut self,
        loan_id: &str,
        caller_id: &str,
        amount: i64,
    ) -> Result<RepaymentOutcome, TreasuryError> {
        let outcome = self.loans.repay(&mut self.store, loan_id, caller_id, amount)?;
        self.record(
            TransactionKind::LoanRepay,
            Some(caller_id),
            outcome.loan.lender_id.as_deref(),
            amount,
        );
        self.flush(Table::Balances);
        self.flush(Table::Loans);
        self.flush(Table::Transactions);
        Ok(outcome)
    }

    pub fn list_loans(&self, owner_id: &str) -> Vec<Loan> {
        self.loans.loans_for(owner_id)
    }

    pub fn find_loan(&self, loan_id: &str) -> Option<Loan> {
        self.loans.find(loan_id).cloned()
    }

    // --- GDP records ---

    pub fn set_gdp(&mut self, entity_id: &str, gdp: i64) -> Result<(), TreasuryError> {
        self.gdp.set(entity_id, gdp)?;
        self.flush(Table::Gdp);
        Ok(())
    }

    pub fn get_gdp(&self, entity_id: &str) -> Option<i64> {
        self.gdp.get(entity_id)
    }

    /// Entity deletion: drop the GDP record and prune journal entries that
    /// reference the entity. Balances are left for the caller to settle.
    pub fn remove_entity(&mut self, entity_id: &str) {
        let had_gdp = self.gdp.remove(entity_id).is_some();
        let pruned = self.journal.prune_entity(entity_id);
        if had_gdp {
            self.flush(Table::Gdp);
        }
        if pruned > 0 {
            self.flush(Table::Transactions);
        }
        info!(entity = entity_id, pruned, "entity removed from economy");
    }

    // --- Observability and maintenance ---

    pub fn recent_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.journal.recent(limit)
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Run both corrector passes and persist any repairs.
    pub fn run_sweep(&mut self) -> SweepReport {
        let report = self.corrector.sweep(&mut self.store);
        if report.changed() {
            self.flush(Table::Balances);
        }
        report
    }

    /// Administrative reset: clears balances, loans, GDP records, and the
    /// journal, then flushes the now-empty tables.
    pub fn reset(&mut self) {
        self.store.reset();
        self.loans.clear();
        self.journal.clear();
        self.gdp.clear();
        self.flush_all();
        warn!("economy reset: all tables cleared");
    }

    /// Flush every table, waiting on the remote mirror. Used by the
    /// periodic autosave and the shutdown path.
    pub async fn flush_all_sync(&self) {
        for table in Table::ALL {
            let Some(content) = self.serialize_table(table) else {
                continue;
            };
            if let Err(e) = self.gateway.flush_sync(table, content).await {
                warn!(table = table.key(), error = %e, "synchronous flush failed");
            }
        }
    }

    fn flush_all(&self) {
        for table in Table::ALL {
            self.flush(table);
        }
    }

    /// Write-through for one table. Availability over durability: a failed
    /// local write is logged and the in-memory state stays authoritative.
    fn flush(&self, table: Table) {
        let Some(content) = self.serialize_table(table) else {
            return;
        };
        if let Err(e) = self.gateway.flush(table, content) {
            warn!(table = table.key(), error = %e, "snapshot flush failed");
        }
    }

    fn serialize_table(&self, table: Table) -> Option<String> {
        let result = match table {
            Table::Balances => serde_json::to_string(&self.store.snapshot()),
            Table::Loans => serde_json::to_string(&self.loans.snapshot()),
            Table::Transactions => serde_json::to_string(&self.journal.snapshot()),
            Table::Gdp => serde_json::to_string(&self.gdp.snapshot()),
        };
        match result {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(table = table.key(), error = %e, "table serialization failed");
                None
            }
        }
    }

    fn record(
        &mut self,
        kind: TransactionKind,
        from: Option<&str>,
        to: Option<&str>,
        amount: i64,
    ) {
        self.journal.record(Transaction::new(
            kind,
            from.map(str::to_string),
            to.map(str::to_string),
            amount,
            self.scope_id.clone(),
        ));
    }
}

/// Serializable point-in-time view of all tables, for round-trip checks and
/// admin inspection.
#[derive(Debug, Serialize, PartialEq)]
pub struct EconomySnapshot {
    pub balances: BTreeMap<String, i64>,
    pub loans: Vec<Loan>,
    pub transactions: Vec<Transaction>,
    pub gdp: BTreeMap<String, GdpRecord>,
}

impl TreasuryEngine {
    pub fn snapshot(&self) -> EconomySnapshot {
        EconomySnapshot {
            balances: self.store.snapshot(),
            loans: self.loans.snapshot(),
            transactions: self.journal.snapshot(),
            gdp: self.gdp.snapshot(),
        }
    }
}
