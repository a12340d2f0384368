use serde::Serialize;
use tracing::warn;

use crate::store::LedgerStore;

/// Anomaly sweep tuning.
///
/// The magnitude heuristic reverses a historically observed triple-credit
/// defect: group-entity accounts (long all-digit ids) holding more than the
/// threshold are floor-divided by the divisor. Because the defect may no
/// longer be live, corrections are only applied when
/// `apply_magnitude_corrections` is set; otherwise suspects are flagged in
/// the report and logged, and balances are left untouched.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub magnitude_threshold: i64,
    pub group_id_min_digits: usize,
    pub magnitude_divisor: i64,
    pub apply_magnitude_corrections: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            magnitude_threshold: 3_000_000_000,
            group_id_min_digits: 18,
            magnitude_divisor: 3,
            apply_magnitude_corrections: false,
        }
    }
}

/// One applied balance correction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Correction {
    pub account: String,
    pub before: i64,
    pub after: i64,
}

/// Result of one sweep pass. Every field is empty when state was healthy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Negative balances clamped to zero.
    pub negative_clamped: Vec<Correction>,
    /// Magnitude-heuristic corrections that were applied.
    pub magnitude_corrected: Vec<Correction>,
    /// Suspect accounts flagged but left untouched (heuristic not applied).
    pub magnitude_flagged: Vec<Correction>,
}

impl SweepReport {
    pub fn changed(&self) -> bool {
        !self.negative_clamped.is_empty() || !self.magnitude_corrected.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.changed() && self.magnitude_flagged.is_empty()
    }
}

/// Boot-time and periodic self-correction over the ledger store.
///
/// Both passes are idempotent: a clamped balance is non-negative, and a
/// divided balance falls back under the threshold.
#[derive(Debug, Clone, Default)]
pub struct AnomalyCorrector {
    config: SweepConfig,
}

impl AnomalyCorrector {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn sweep(&self, store: &mut LedgerStore) -> SweepReport {
        let mut report = SweepReport::default();

        for (account, balance) in store.balances_mut().iter_mut() {
            if *balance < 0 {
                warn!(account = %account, balance = *balance, "clamping negative balance to 0");
                report.negative_clamped.push(Correction {
                    account: account.clone(),
                    before: *balance,
                    after: 0,
                });
                *balance = 0;
                continue;
            }

            if self.is_group_shaped(account) && *balance > self.config.magnitude_threshold {
                let corrected = *balance / self.config.magnitude_divisor;
                let correction = Correction {
                    account: account.clone(),
                    before: *balance,
                    after: corrected,
                };
                if self.config.apply_magnitude_corrections {
                    warn!(
                        account = %account,
                        before = correction.before,
                        after = correction.after,
                        "suspected duplicated credit, dividing balance"
                    );
                    *balance = corrected;
                    report.magnitude_corrected.push(correction);
                } else {
                    warn!(
                        account = %account,
                        balance = correction.before,
                        "suspected duplicated credit, flagged only (corrections not enabled)"
                    );
                    report.magnitude_flagged.push(correction);
                }
            }
        }

        report
    }

    /// Group-entity ids are long and numeric-looking.
    fn is_group_shaped(&self, id: &str) -> bool {
        id.len() >= self.config.group_id_min_digits && id.bytes().all(|b| b.is_ascii_digit())
    }
}
