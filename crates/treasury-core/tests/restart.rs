//! Restart round-trips: clear in-memory state, reload from local snapshots
//! only (no remote pull), and compare tables against the pre-restart view.

use tempfile::TempDir;
use treasury_core::{EngineConfig, TreasuryEngine};

fn config_at(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn tables_survive_a_restart_byte_for_byte() {
    let dir = TempDir::new().unwrap();

    let before = {
        let mut engine = TreasuryEngine::bootstrap(config_at(&dir)).await.unwrap();
        engine.credit("123456789012345678", 5_000).unwrap();
        engine.credit("U1", 750).unwrap();
        engine.set_gdp("123456789012345678", 10_000).unwrap();
        engine.transfer("123456789012345678", "U1", 250).unwrap();
        engine
            .issue_loan("U1", 400, 5.0, 30, Some("123456789012345678"))
            .unwrap();
        engine.destroy("U1", 100).unwrap();
        engine.flush_all_sync().await;
        engine.snapshot()
    };

    let reloaded = TreasuryEngine::bootstrap(config_at(&dir)).await.unwrap();
    let after = reloaded.snapshot();

    assert_eq!(after.balances, before.balances);
    assert_eq!(after.loans, before.loans);
    assert_eq!(after.transactions, before.transactions);
    assert_eq!(after.gdp, before.gdp);
    assert_eq!(
        serde_json::to_string(&after).unwrap(),
        serde_json::to_string(&before).unwrap()
    );
}

#[tokio::test]
async fn partial_repayment_state_survives_restart() {
    let dir = TempDir::new().unwrap();

    let loan_id = {
        let mut engine = TreasuryEngine::bootstrap(config_at(&dir)).await.unwrap();
        let loan = engine.issue_loan("U1", 100, 10.0, 30, None).unwrap();
        engine.repay_loan(&loan.id, "U1", 60).unwrap();
        engine.flush_all_sync().await;
        loan.id
    };

    let mut engine = TreasuryEngine::bootstrap(config_at(&dir)).await.unwrap();
    let loan = engine.find_loan(&loan_id).expect("loan still active");
    assert_eq!(loan.outstanding, 50);
    assert_eq!(loan.repayments.len(), 1);

    // the reloaded loan closes normally
    engine.credit("U1", 10).unwrap();
    let outcome = engine.repay_loan(&loan_id, "U1", 50).unwrap();
    assert!(outcome.closed);
    assert!(engine.find_loan(&loan_id).is_none());
}

#[tokio::test]
async fn boot_sweep_repairs_corrupted_snapshot() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("balances.json"),
        r#"{"U1":-300,"U2":40}"#,
    )
    .unwrap();

    let engine = TreasuryEngine::bootstrap(config_at(&dir)).await.unwrap();
    assert_eq!(engine.balance("U1"), 0);
    assert_eq!(engine.balance("U2"), 40);
}
