use thiserror::Error;

/// Treasury runtime errors.
///
/// Validation failures are raised before any state mutation, so a rejected
/// operation never leaves partial effects. Persistence and remote-sync
/// failures are logged by the engine and never surfaced to ledger callers.
#[derive(Debug, Error)]
pub enum TreasuryError {
    // --- Input validation ---
    #[error("invalid entity id: {0:?}")]
    InvalidId(String),

    #[error("amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("interest rate must be a finite non-negative percentage, got {rate}")]
    InvalidRate { rate: f64 },

    #[error("repayment of {requested} exceeds outstanding principal {outstanding}")]
    RepaymentTooLarge { requested: i64, outstanding: i64 },

    // --- Ledger ---
    #[error("insufficient funds on {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: String,
        requested: i64,
        available: i64,
    },

    // --- Loans ---
    #[error("no active loan {loan_id} owned by caller")]
    LoanNotFound { loan_id: String },

    #[error("loan principal {principal} exceeds cap {cap} (half of lender GDP)")]
    CapExceeded { principal: i64, cap: i64 },

    // --- Persistence ---
    #[error("local snapshot error: {0}")]
    Persistence(String),

    #[error("remote mirror error: {0}")]
    RemoteSync(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TreasuryError {
    /// True when the error is a pre-mutation validation reject rather than
    /// an infrastructure failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidId(_)
                | Self::InvalidAmount { .. }
                | Self::InvalidRate { .. }
                | Self::RepaymentTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_display() {
        let err = TreasuryError::InsufficientFunds {
            account: "nation-1".into(),
            requested: 500,
            available: 120,
        };
        let s = err.to_string();
        assert!(s.contains("nation-1"));
        assert!(s.contains("500"));
        assert!(s.contains("120"));
    }

    #[test]
    fn cap_exceeded_display() {
        let err = TreasuryError::CapExceeded {
            principal: 600,
            cap: 500,
        };
        assert!(err.to_string().contains("600"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn validation_predicate() {
        assert!(TreasuryError::InvalidAmount { amount: -3 }.is_validation());
        assert!(!TreasuryError::Persistence("disk full".into()).is_validation());
    }
}
