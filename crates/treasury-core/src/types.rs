use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TreasuryError;

/// Journal entry classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    Destroy,
    LoanIssue,
    LoanRepay,
}

/// One committed ledger event.
///
/// `from_id`/`to_id` of `None` denote the central issuer: credited funds are
/// minted, debited funds leave circulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    pub amount: i64,
    pub kind: TransactionKind,
    pub at: DateTime<Utc>,
    pub scope_id: Option<String>,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        from_id: Option<String>,
        to_id: Option<String>,
        amount: i64,
        scope_id: Option<String>,
    ) -> Self {
        Self {
            from_id,
            to_id,
            amount,
            kind,
            at: Utc::now(),
            scope_id,
        }
    }

    /// True when the entry names `entity_id` as source or destination.
    pub fn references(&self, entity_id: &str) -> bool {
        self.from_id.as_deref() == Some(entity_id) || self.to_id.as_deref() == Some(entity_id)
    }
}

/// One validated repayment against an active loan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repayment {
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
}

/// An active interest-bearing loan.
///
/// `outstanding` starts at `total_owed` (interest is fixed upfront at
/// issuance) and only decreases through validated repayments. A loan whose
/// outstanding principal reaches zero is removed from the active set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Loan {
    pub id: String,
    pub borrower_id: String,
    /// `None` = the abstract central issuer.
    pub lender_id: Option<String>,
    pub principal: i64,
    pub rate_percent: f64,
    /// Informational only; no deadline is enforced.
    pub term_days: i64,
    pub total_owed: i64,
    pub outstanding: i64,
    pub repayments: Vec<Repayment>,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    /// Total owed under the upfront-interest model.
    pub fn compute_total_owed(principal: i64, rate_percent: f64) -> i64 {
        principal + (principal as f64 * rate_percent / 100.0).floor() as i64
    }
}

/// Declared output metric for a group entity, the loan-cap input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GdpRecord {
    pub gdp: i64,
}

/// Boundary check for externally supplied entity ids: non-empty, no
/// whitespace. Ids are otherwise opaque.
pub fn validate_entity_id(id: &str) -> Result<(), TreasuryError> {
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(TreasuryError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Boundary check for externally supplied amounts: strictly positive.
pub fn validate_amount(amount: i64) -> Result<(), TreasuryError> {
    if amount <= 0 {
        return Err(TreasuryError::InvalidAmount { amount });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionKind::LoanIssue).unwrap();
        assert_eq!(json, "\"loan_issue\"");
    }

    #[test]
    fn upfront_interest_floors() {
        assert_eq!(Loan::compute_total_owed(100, 10.0), 110);
        assert_eq!(Loan::compute_total_owed(100, 0.0), 100);
        // 7 * 3.5% = 0.245, floored away
        assert_eq!(Loan::compute_total_owed(7, 3.5), 7);
        assert_eq!(Loan::compute_total_owed(1000, 2.5), 1025);
    }

    #[test]
    fn entity_id_boundary() {
        assert!(validate_entity_id("123456789012345678").is_ok());
        assert!(validate_entity_id("U1").is_ok());
        assert!(validate_entity_id("").is_err());
        assert!(validate_entity_id("has space").is_err());
    }

    #[test]
    fn transaction_references_either_side() {
        let tx = Transaction::new(
            TransactionKind::Transfer,
            Some("a".into()),
            Some("b".into()),
            10,
            None,
        );
        assert!(tx.references("a"));
        assert!(tx.references("b"));
        assert!(!tx.references("c"));
    }
}
