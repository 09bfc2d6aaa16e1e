//! # REST API
//!
//! Builds the axum router that exposes the chain over HTTP. All endpoints
//! share application state through axum's `State` extractor; the chain sits
//! behind a `tokio::sync::RwLock`, so reads run concurrently and calls are
//! applied one at a time.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Description                          |
//! |--------|---------------------------------|--------------------------------------|
//! | GET    | `/health`                       | Liveness probe                       |
//! | GET    | `/status`                       | Institution and ledger summary       |
//! | GET    | `/ledger`                       | Token metadata and supply            |
//! | GET    | `/accounts/:id`                 | Balances and records for an account  |
//! | GET    | `/allowances/:owner/:spender`   | Remaining delegated allowance        |
//! | GET    | `/payers`                       | Payer records, registration order    |
//! | GET    | `/payees`                       | Payee records, registration order    |
//! | GET    | `/fees`                         | Fee schedule                         |
//! | GET    | `/events?since=N`               | Event log from position N            |
//! | POST   | `/calls`                        | Submit a call                        |
//!
//! Failures are returned as `{ "code": ..., "message": ... }`.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bursar_contracts::{Call, Chain, EventRecord, ExecutionError, Payee, Payer, Receipt, Tier};
use bursar_protocol::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone. Everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The chain being served.
    pub chain: Arc<RwLock<Chain>>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wraps a chain for serving.
    pub fn new(version: String, chain: Chain, metrics: SharedMetrics) -> Self {
        Self {
            version,
            chain: Arc::new(RwLock::new(chain)),
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ledger", get(ledger_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/allowances/:owner/:spender", get(allowance_handler))
        .route("/payers", get(payers_handler))
        .route("/payees", get(payees_handler))
        .route("/fees", get(fees_handler))
        .route("/events", get(events_handler))
        .route("/calls", post(submit_call_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /calls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    /// Account the call runs as.
    pub caller: AccountId,
    /// Native value to attach.
    #[serde(default)]
    pub value: Amount,
    /// The call.
    pub call: Call,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Institution admin.
    pub admin: AccountId,
    /// Institution account.
    pub institution: AccountId,
    /// Token supply.
    pub total_supply: Amount,
    /// Native treasury total.
    pub native_treasury: Amount,
    /// Token treasury total.
    pub token_treasury: Amount,
    /// Registered payers.
    pub payers: usize,
    /// Registered payees.
    pub payees: usize,
    /// Event log length.
    pub events: usize,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /ledger`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerResponse {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Amount,
    pub institution: AccountId,
    /// Accounts that have ever held a balance.
    pub holders: usize,
}

/// Response payload for `GET /accounts/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: AccountId,
    pub token_balance: Amount,
    pub native_balance: Amount,
    /// Present if the account registered as a payer.
    pub payer: Option<Payer>,
    /// Present if the account is a payee.
    pub payee: Option<Payee>,
}

/// Response payload for `GET /allowances/:owner/:spender`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub owner: AccountId,
    pub spender: AccountId,
    pub amount: Amount,
}

/// One row of `GET /fees`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeEntry {
    pub tier: Tier,
    pub fee: Amount,
}

/// Query string of `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// First log position to return.
    #[serde(default)]
    pub since: usize,
}

/// Error body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Taxonomy name, e.g. `SalaryAlreadyPaid`.
    pub code: String,
    /// Human-readable reason.
    pub message: String,
}

impl From<&ExecutionError> for ErrorResponse {
    fn from(e: &ExecutionError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// An error with the status code it is served under.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(code: &str, message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                code: code.to_string(),
                message,
            },
        }
    }

    fn reverted(e: &ExecutionError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorResponse::from(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn parse_account(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse::<AccountId>()
        .map_err(|e| ApiError::bad_request("InvalidAccountId", format!("{raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` returns 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let chain = state.chain.read().await;
    let institution = chain.institution();
    Json(StatusResponse {
        version: state.version.clone(),
        admin: institution.admin(),
        institution: institution.account(),
        total_supply: chain.ledger().total_supply(),
        native_treasury: institution.native_treasury(),
        token_treasury: institution.token_treasury(),
        payers: institution.list_payers().len(),
        payees: institution.list_payees().len(),
        events: chain.events().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /ledger`
async fn ledger_handler(State(state): State<AppState>) -> Json<LedgerResponse> {
    let chain = state.chain.read().await;
    let ledger = chain.ledger();
    Json(LedgerResponse {
        name: ledger.name().to_string(),
        symbol: ledger.symbol().to_string(),
        decimals: ledger.decimals(),
        total_supply: ledger.total_supply(),
        institution: ledger.institution(),
        holders: ledger.account_count(),
    })
}

/// `GET /accounts/:id` returns zero balances for accounts never touched.
async fn account_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = parse_account(&id)?;
    let chain = state.chain.read().await;
    let institution = chain.institution();
    Ok(Json(AccountResponse {
        account,
        token_balance: chain.ledger().balance_of(account),
        native_balance: chain.native_balance_of(account),
        payer: institution.payer(account).cloned(),
        payee: institution.payee(account).cloned(),
    }))
}

/// `GET /allowances/:owner/:spender`
async fn allowance_handler(
    Path((owner, spender)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let owner = parse_account(&owner)?;
    let spender = parse_account(&spender)?;
    let chain = state.chain.read().await;
    Ok(Json(AllowanceResponse {
        owner,
        spender,
        amount: chain.ledger().allowance(owner, spender),
    }))
}

/// `GET /payers`
async fn payers_handler(State(state): State<AppState>) -> Json<Vec<Payer>> {
    let chain = state.chain.read().await;
    Json(chain.institution().payers().cloned().collect())
}

/// `GET /payees`
async fn payees_handler(State(state): State<AppState>) -> Json<Vec<Payee>> {
    let chain = state.chain.read().await;
    Json(chain.institution().payees().cloned().collect())
}

/// `GET /fees`
async fn fees_handler(State(state): State<AppState>) -> Json<Vec<FeeEntry>> {
    let chain = state.chain.read().await;
    Json(
        chain
            .institution()
            .fee_schedule()
            .iter()
            .map(|(tier, fee)| FeeEntry { tier, fee })
            .collect(),
    )
}

/// `GET /events?since=N`
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<EventRecord>> {
    let chain = state.chain.read().await;
    Json(chain.events().since(query.since).to_vec())
}

/// `POST /calls` executes a call and returns its receipt, or 422 with the
/// reason it reverted.
async fn submit_call_handler(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<Receipt>, ApiError> {
    let mut chain = state.chain.write().await;
    let started = Instant::now();
    let result = chain.submit(req.caller, req.value, req.call);
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(receipt) => {
            state.metrics.record_commit(elapsed, chain.events().len());
            Ok(Json(receipt))
        }
        Err(e) => {
            state.metrics.record_revert(elapsed, e.code());
            Err(ApiError::reverted(&e))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
