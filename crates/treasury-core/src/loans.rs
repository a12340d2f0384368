use chrono::Utc;
use tracing::info;

use crate::error::TreasuryError;
use crate::gdp::GdpRegistry;
use crate::store::LedgerStore;
use crate::types::{validate_amount, validate_entity_id, Loan, Repayment};

/// Outcome of a validated repayment.
#[derive(Debug, Clone)]
pub struct RepaymentOutcome {
    /// Post-repayment state of the loan.
    pub loan: Loan,
    /// True when the repayment brought the outstanding principal to zero
    /// and the loan left the active set.
    pub closed: bool,
}

/// Active loan set with issuance and repayment logic.
///
/// State machine per loan: active, zero or more partial repayments, removed
/// on full repayment. No default state and no enforced deadline; `term_days`
/// is informational.
#[derive(Debug, Default, Clone)]
pub struct LoanBook {
    loans: Vec<Loan>,
}

impl LoanBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(loans: Vec<Loan>) -> Self {
        Self { loans }
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    pub fn find(&self, loan_id: &str) -> Option<&Loan> {
        self.loans.iter().find(|loan| loan.id == loan_id)
    }

    /// Active loans borrowed by `owner`.
    pub fn loans_for(&self, owner: &str) -> Vec<Loan> {
        self.loans
            .iter()
            .filter(|loan| loan.borrower_id == owner)
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.loans.clear();
    }

    pub fn snapshot(&self) -> Vec<Loan> {
        self.loans.clone()
    }

    /// Issue a loan: validate, apply the GDP cap when the lender is a group
    /// entity with a declared output, debit the lender (the central issuer
    /// mints instead), and credit the borrower with the principal.
    ///
    /// Interest is fixed upfront: the borrower owes
    /// `floor(principal * (1 + rate/100))` from the moment of issuance.
    /// All validation happens before any balance mutation.
    pub fn issue(
        &mut self,
        store: &mut LedgerStore,
        gdp: &GdpRegistry,
        borrower_id: &str,
        principal: i64,
        rate_percent: f64,
        term_days: i64,
        lender_id: Option<&str>,
    ) -> Result<Loan, TreasuryError> {
        validate_entity_id(borrower_id)?;
        validate_amount(principal)?;
        if !rate_percent.is_finite() || rate_percent < 0.0 {
            return Err(TreasuryError::InvalidRate { rate: rate_percent });
        }
        if term_days <= 0 {
            return Err(TreasuryError::InvalidAmount { amount: term_days });
        }
        if let Some(lender) = lender_id {
            validate_entity_id(lender)?;
            if let Some(output) = gdp.get(lender) {
                let cap = output / 2;
                if principal > cap {
                    return Err(TreasuryError::CapExceeded { principal, cap });
                }
            }
        }

        // Funds move only after every check has passed. The lender debit is
        // the one remaining failure point and runs before the credit.
        if let Some(lender) = lender_id {
            store.debit(lender, principal)?;
        }
        store.credit(borrower_id, principal)?;

        let total_owed = Loan::compute_total_owed(principal, rate_percent);
        let loan = Loan {
            id: self.next_loan_id(borrower_id),
            borrower_id: borrower_id.to_string(),
            lender_id: lender_id.map(str::to_string),
            principal,
            rate_percent,
            term_days,
            total_owed,
            outstanding: total_owed,
            repayments: Vec::new(),
            created_at: Utc::now(),
        };
        info!(
            loan_id = %loan.id,
            borrower = %loan.borrower_id,
            principal,
            total_owed,
            "loan issued"
        );
        self.loans.push(loan.clone());
        Ok(loan)
    }

    /// Repay part or all of an active loan owned by `caller_id`.
    ///
    /// The caller is debited; the lender is credited, or the amount leaves
    /// circulation when the lender is the central issuer. A loan whose
    /// outstanding reaches zero is removed from the active set.
    pub fn repay(
        &mut self,
        store: &mut LedgerStore,
        loan_id: &str,
        caller_id: &str,
        amount: i64,
    ) -> Result<RepaymentOutcome, TreasuryError> {
        let index = self
            .loans
            .iter()
            .position(|loan| loan.id == loan_id && loan.borrower_id == caller_id)
            .ok_or_else(|| TreasuryError::LoanNotFound {
                loan_id: loan_id.to_string(),
            })?;

        validate_amount(amount)?;
        let outstanding = self.loans[index].outstanding;
        if amount > outstanding {
            return Err(TreasuryError::RepaymentTooLarge {
                requested: amount,
                outstanding,
            });
        }

        store.debit(caller_id, amount)?;
        if let Some(lender) = self.loans[index].lender_id.clone() {
            store.credit(&lender, amount)?;
        }
        // No lender: the repayment is destroyed at the central issuer.

        let loan = &mut self.loans[index];
        loan.outstanding -= amount;
        loan.repayments.push(Repayment {
            amount,
            paid_at: Utc::now(),
        });

        let closed = loan.outstanding == 0;
        let loan = if closed {
            let loan = self.loans.remove(index);
            info!(loan_id = %loan.id, borrower = %loan.borrower_id, "loan fully repaid and closed");
            loan
        } else {
            self.loans[index].clone()
        };
        Ok(RepaymentOutcome { loan, closed })
    }

    /// Loan ids follow `{borrower}-{unix_ts}`; a same-second reissue gets a
    /// sequence suffix so ids stay unique.
    fn next_loan_id(&self, borrower_id: &str) -> String {
        let base = format!("{}-{}", borrower_id, Utc::now().timestamp());
        if self.find(&base).is_none() {
            return base;
        }
        let mut seq = 2;
        loop {
            let candidate = format!("{base}-{seq}");
            if self.find(&candidate).is_none() {
                return candidate;
            }
            seq += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (LoanBook, LedgerStore, GdpRegistry) {
        (LoanBook::new(), LedgerStore::new(), GdpRegistry::new())
    }

    #[test]
    fn central_issuer_loan_mints_principal() {
        let (mut book, mut store, gdp) = setup();
        let loan = book
            .issue(&mut store, &gdp, "U1", 100, 10.0, 30, None)
            .unwrap();

        assert_eq!(loan.total_owed, 110);
        assert_eq!(loan.outstanding, 110);
        assert_eq!(store.balance("U1"), 100);
        assert_eq!(store.total_supply(), 100);
    }

    #[test]
    fn partial_repayments_close_exactly_at_total_owed() {
        let (mut book, mut store, gdp) = setup();
        let loan = book
            .issue(&mut store, &gdp, "U1", 100, 10.0, 30, None)
            .unwrap();
        // cover the 10 interest on top of the minted principal
        store.credit("U1", 10).unwrap();

        let partial = book.repay(&mut store, &loan.id, "U1", 60).unwrap();
        assert!(!partial.closed);
        assert_eq!(partial.loan.outstanding, 50);
        assert_eq!(book.len(), 1);

        let closing = book.repay(&mut store, &loan.id, "U1", 50).unwrap();
        assert!(closing.closed);
        assert_eq!(closing.loan.outstanding, 0);
        assert!(book.is_empty());
        // repaid to the central issuer: destroyed
        assert_eq!(store.total_supply(), 0);
    }

    #[test]
    fn repayments_to_group_lender_return_funds() {
        let (mut book, mut store, gdp) = setup();
        store.credit("nation-1", 1000).unwrap();

        let loan = book
            .issue(&mut store, &gdp, "U1", 200, 0.0, 30, Some("nation-1"))
            .unwrap();
        assert_eq!(store.balance("nation-1"), 800);
        assert_eq!(store.balance("U1"), 200);

        book.repay(&mut store, &loan.id, "U1", 200).unwrap();
        assert_eq!(store.balance("nation-1"), 1000);
        assert_eq!(store.balance("U1"), 0);
    }

    #[test]
    fn gdp_cap_boundary() {
        let (mut book, mut store, mut gdp) = setup();
        store.credit("nation-1", 10_000).unwrap();
        gdp.set("nation-1", 1000).unwrap();

        // exactly half the declared output succeeds
        book.issue(&mut store, &gdp, "U1", 500, 0.0, 30, Some("nation-1"))
            .unwrap();

        // one unit over fails before any mutation
        let before = store.snapshot();
        let err = book
            .issue(&mut store, &gdp, "U2", 501, 0.0, 30, Some("nation-1"))
            .unwrap_err();
        assert!(matches!(
            err,
            TreasuryError::CapExceeded {
                principal: 501,
                cap: 500
            }
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn lender_without_gdp_record_is_uncapped() {
        let (mut book, mut store, gdp) = setup();
        store.credit("whale", 1_000_000).unwrap();
        book.issue(&mut store, &gdp, "U1", 900_000, 1.0, 30, Some("whale"))
            .unwrap();
        assert_eq!(store.balance("U1"), 900_000);
    }

    #[test]
    fn lender_must_cover_principal() {
        let (mut book, mut store, gdp) = setup();
        store.credit("nation-1", 50).unwrap();
        let err = book
            .issue(&mut store, &gdp, "U1", 100, 0.0, 30, Some("nation-1"))
            .unwrap_err();
        assert!(matches!(err, TreasuryError::InsufficientFunds { .. }));
        assert_eq!(store.balance("U1"), 0);
        assert!(book.is_empty());
    }

    #[test]
    fn repay_requires_ownership() {
        let (mut book, mut store, gdp) = setup();
        let loan = book
            .issue(&mut store, &gdp, "U1", 100, 0.0, 30, None)
            .unwrap();

        let err = book.repay(&mut store, &loan.id, "U2", 50).unwrap_err();
        assert!(matches!(err, TreasuryError::LoanNotFound { .. }));
    }

    #[test]
    fn overpayment_rejected_without_mutation() {
        let (mut book, mut store, gdp) = setup();
        let loan = book
            .issue(&mut store, &gdp, "U1", 100, 0.0, 30, None)
            .unwrap();

        let err = book.repay(&mut store, &loan.id, "U1", 101).unwrap_err();
        assert!(matches!(
            err,
            TreasuryError::RepaymentTooLarge {
                requested: 101,
                outstanding: 100
            }
        ));
        assert_eq!(store.balance("U1"), 100);
        assert_eq!(book.find(&loan.id).unwrap().outstanding, 100);
    }

    #[test]
    fn invalid_rate_rejected() {
        let (mut book, mut store, gdp) = setup();
        for rate in [-1.0, f64::NAN, f64::INFINITY] {
            let err = book
                .issue(&mut store, &gdp, "U1", 100, rate, 30, None)
                .unwrap_err();
            assert!(matches!(err, TreasuryError::InvalidRate { .. }));
        }
    }

    #[test]
    fn same_second_issuance_gets_unique_ids() {
        let (mut book, mut store, gdp) = setup();
        let a = book
            .issue(&mut store, &gdp, "U1", 10, 0.0, 30, None)
            .unwrap();
        let b = book
            .issue(&mut store, &gdp, "U1", 10, 0.0, 30, None)
            .unwrap();
        assert_ne!(a.id, b.id);
    }
}
