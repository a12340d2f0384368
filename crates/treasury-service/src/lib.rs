//! REST surface over the treasury engine.
//!
//! The platform side (command parsing, permissions, rendering) lives
//! elsewhere and calls these endpoints; identity and authorization are
//! resolved by the caller, and the ids it passes are trusted.

#![deny(unsafe_code)]

pub mod tasks;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use treasury_core::{
    EngineConfig, Loan, SweepReport, Transaction, TreasuryEngine, TreasuryError,
};

/// Service bootstrap parameters.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
}

/// Shared handler state. The engine mutex serializes all ledger access,
/// preserving the single-writer model the core assumes.
#[derive(Clone)]
pub struct ServiceState {
    engine: Arc<Mutex<TreasuryEngine>>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, TreasuryError> {
        let engine = TreasuryEngine::bootstrap(config.engine).await?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
        })
    }

    pub fn engine(&self) -> Arc<Mutex<TreasuryEngine>> {
        self.engine.clone()
    }
}

/// Typed error → HTTP status. Validation rejects are client errors; ledger
/// conflicts map to 409; persistence problems never reach here because the
/// engine swallows them.
struct ApiError(TreasuryError);

impl From<TreasuryError> for ApiError {
    fn from(err: TreasuryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TreasuryError::InvalidId(_)
            | TreasuryError::InvalidAmount { .. }
            | TreasuryError::InvalidRate { .. }
            | TreasuryError::RepaymentTooLarge { .. } => StatusCode::BAD_REQUEST,
            TreasuryError::InsufficientFunds { .. } | TreasuryError::CapExceeded { .. } => {
                StatusCode::CONFLICT
            }
            TreasuryError::LoanNotFound { .. } => StatusCode::NOT_FOUND,
            TreasuryError::Persistence(_)
            | TreasuryError::RemoteSync(_)
            | TreasuryError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct AmountRequest {
    account: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    from: String,
    /// Absent destination = the central issuer: the amount is destroyed.
    to: Option<String>,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct IssueLoanRequest {
    borrower: String,
    principal: i64,
    rate_percent: f64,
    term_days: i64,
    /// Absent lender = the central issuer mints the principal.
    lender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepayRequest {
    caller: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct GdpRequest {
    gdp: i64,
}

#[derive(Debug, Deserialize)]
struct TransactionsQuery {
    #[serde(default = "default_transactions_limit")]
    limit: usize,
}

fn default_transactions_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    account: String,
    balance: i64,
}

#[derive(Debug, Serialize)]
struct SupplyResponse {
    total_supply: i64,
}

#[derive(Debug, Serialize)]
struct RepayResponse {
    loan: Loan,
    closed: bool,
}

#[derive(Debug, Serialize)]
struct GdpResponse {
    entity: String,
    gdp: i64,
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/balance/:id", get(get_balance))
        .route("/supply", get(get_supply))
        .route("/credit", post(post_credit))
        .route("/debit", post(post_debit))
        .route("/transfer", post(post_transfer))
        .route("/loans", post(post_issue_loan))
        .route("/loans/:owner", get(get_loans))
        .route("/loans/:id/repayments", post(post_repay))
        .route("/gdp/:id", put(put_gdp).get(get_gdp).delete(delete_entity))
        .route("/transactions", get(get_transactions))
        .route("/sweep", post(post_sweep))
        .route("/reset", post(post_reset))
        .with_state(state)
}

async fn get_balance(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Json<BalanceResponse> {
    let engine = state.engine.lock().await;
    Json(BalanceResponse {
        balance: engine.balance(&id),
        account: id,
    })
}

async fn get_supply(State(state): State<ServiceState>) -> Json<SupplyResponse> {
    let engine = state.engine.lock().await;
    Json(SupplyResponse {
        total_supply: engine.total_supply(),
    })
}

async fn post_credit(
    State(state): State<ServiceState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let mut engine = state.engine.lock().await;
    let balance = engine.credit(&req.account, req.amount)?;
    Ok(Json(BalanceResponse {
        account: req.account,
        balance,
    }))
}

async fn post_debit(
    State(state): State<ServiceState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let mut engine = state.engine.lock().await;
    let balance = engine.debit(&req.account, req.amount)?;
    Ok(Json(BalanceResponse {
        account: req.account,
        balance,
    }))
}

async fn post_transfer(
    State(state): State<ServiceState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let mut engine = state.engine.lock().await;
    let balance = match &req.to {
        Some(to) => {
            engine.transfer(&req.from, to, req.amount)?;
            engine.balance(&req.from)
        }
        None => engine.destroy(&req.from, req.amount)?,
    };
    Ok(Json(BalanceResponse {
        account: req.from,
        balance,
    }))
}

async fn post_issue_loan(
    State(state): State<ServiceState>,
    Json(req): Json<IssueLoanRequest>,
) -> Result<(StatusCode, Json<Loan>), ApiError> {
    let mut engine = state.engine.lock().await;
    let loan = engine.issue_loan(
        &req.borrower,
        req.principal,
        req.rate_percent,
        req.term_days,
        req.lender.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(loan)))
}

async fn get_loans(
    State(state): State<ServiceState>,
    Path(owner): Path<String>,
) -> Json<Vec<Loan>> {
    let engine = state.engine.lock().await;
    Json(engine.list_loans(&owner))
}

async fn post_repay(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<RepayRequest>,
) -> Result<Json<RepayResponse>, ApiError> {
    let mut engine = state.engine.lock().await;
    let outcome = engine.repay_loan(&id, &req.caller, req.amount)?;
    Ok(Json(RepayResponse {
        loan: outcome.loan,
        closed: outcome.closed,
    }))
}

async fn put_gdp(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<GdpRequest>,
) -> Result<StatusCode, ApiError> {
    let mut engine = state.engine.lock().await;
    engine.set_gdp(&id, req.gdp)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_gdp(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<GdpResponse>, StatusCode> {
    let engine = state.engine.lock().await;
    match engine.get_gdp(&id) {
        Some(gdp) => Ok(Json(GdpResponse { entity: id, gdp })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn delete_entity(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> StatusCode {
    let mut engine = state.engine.lock().await;
    engine.remove_entity(&id);
    StatusCode::NO_CONTENT
}

async fn get_transactions(
    State(state): State<ServiceState>,
    Query(query): Query<TransactionsQuery>,
) -> Json<Vec<Transaction>> {
    let engine = state.engine.lock().await;
    Json(engine.recent_transactions(query.limit))
}

async fn post_sweep(State(state): State<ServiceState>) -> Json<SweepReport> {
    let mut engine = state.engine.lock().await;
    Json(engine.run_sweep())
}

async fn post_reset(State(state): State<ServiceState>) -> StatusCode {
    let mut engine = state.engine.lock().await;
    engine.reset();
    StatusCode::NO_CONTENT
}
