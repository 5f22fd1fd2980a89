//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the vault. Handlers call straight
//! into the [`VaultGateway`]; after every state-changing call the node
//! drains the vault's events, logs and counts them, and pushes them to
//! WebSocket subscribers.
//!
//! ## Endpoints
//!
//! | Method | Path                       | Description                           |
//! |--------|----------------------------|---------------------------------------|
//! | GET    | `/health`                  | Liveness probe                        |
//! | GET    | `/status`                  | Vault books and positions             |
//! | GET    | `/allocations`             | Current allocation table              |
//! | GET    | `/accounts/:owner`         | Units, value, wallet, requests        |
//! | GET    | `/ws`                      | Live vault events                     |
//! | POST   | `/deposit`                 | Deposit asset for units               |
//! | POST   | `/withdraw`                | Withdraw by value or units            |
//! | POST   | `/claim`                   | Claim matured queued requests         |
//! | POST   | `/fill-buffer`             | Return liquidity to the vault         |
//! | POST   | `/rebalance`               | Manager: rebalance to weights         |
//! | POST   | `/allocations`             | Manager: replace the table            |
//! | POST   | `/buffer-target`           | Manager: set the buffer target        |
//! | POST   | `/recall`                  | Manager: recall a retired strategy    |
//! | POST   | `/pause`, `/unpause`       | Emergency: freeze or unfreeze         |
//! | POST   | `/faucet`                  | Mint test asset                       |
//! | POST   | `/custody/:id/sweep`       | Custodial: holding → venue            |
//! | POST   | `/custody/:id/recall`      | Custodial: venue → holding            |
//! | POST   | `/custody/:id/settle`      | Custodial: holding → vault            |
//! | POST   | `/strategies/:id/accrue`   | Yield vault: inject yield             |

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tidepool_contracts::CustodyError;
use tidepool_protocol::vault::{
    AccountView, AllocationEntry, AllocationView, ClaimReceipt, FillReceipt, QueueError,
    RebalanceReport, RouterError, VaultError, VaultStatus, WithdrawalOutcome,
};
use tidepool_protocol::{
    AccessError, AssetError, AssetTransfer, GatewayError, InMemoryAsset, Role, StrategyError,
    VaultEvent, VaultGateway,
};

use crate::deploy::StrategyBook;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Reported version string.
    pub version: String,
    /// The vault.
    pub gateway: Arc<VaultGateway>,
    /// The asset ledger the vault and strategies share.
    pub asset: Arc<InMemoryAsset>,
    /// Deployed strategies by id.
    pub strategies: Arc<StrategyBook>,
    /// Largest single faucet mint; zero disables the faucet.
    pub faucet_limit: u64,
    /// Live event fan-out.
    pub event_tx: broadcast::Sender<VaultEvent>,
    /// Prometheus handles.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Drains pending vault events into logs, metrics, and subscribers, then
    /// refreshes the book gauges.
    pub fn publish(&self) {
        let events = match self.gateway.drain_events() {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "could not drain vault events");
                return;
            }
        };
        for event in events {
            tracing::info!(kind = event.kind(), ?event, "vault event");
            self.metrics
                .events_total
                .with_label_values(&[event.kind()])
                .inc();
            // No subscribers is not an error.
            let _ = self.event_tx.send(event);
        }
        if let Ok(status) = self.gateway.status() {
            self.metrics.observe_status(&status);
        }
    }

    fn require_manager(&self, caller: &str) -> Result<(), ApiError> {
        self.gateway
            .roles()
            .require(caller, Role::Manager)
            .map_err(|e| GatewayError::from(e).into())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed call, with the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = match &e {
            GatewayError::Access(AccessError::Unauthorized { .. }) => StatusCode::FORBIDDEN,
            GatewayError::Access(AccessError::Reentrant) => StatusCode::CONFLICT,
            GatewayError::Paused => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Vault(v) => match v {
                VaultError::Queue(QueueError::TooEarly { .. })
                | VaultError::Queue(QueueError::DeficitNotFilled { .. })
                | VaultError::Insolvent { .. } => StatusCode::CONFLICT,
                VaultError::Router(RouterError::UnknownStrategy(_)) => StatusCode::NOT_FOUND,
                VaultError::Router(RouterError::Strategy { .. }) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::BAD_REQUEST,
            },
        };
        Self::new(status, e.to_string())
    }
}

impl From<CustodyError> for ApiError {
    fn from(e: CustodyError) -> Self {
        match e {
            CustodyError::Settlement(inner) => inner.into(),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(e: AssetError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<StrategyError> for ApiError {
    fn from(e: StrategyError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Runs a state-changing call: times it, counts rejections, and publishes
/// whatever events it raised.
fn execute<T>(
    state: &AppState,
    endpoint: &'static str,
    call: impl FnOnce(&AppState) -> Result<T, ApiError>,
) -> Result<Json<T>, ApiError> {
    let timer = state.metrics.call_latency_seconds.start_timer();
    let result = call(state);
    timer.observe_duration();
    state.publish();

    result.map(Json).map_err(|e| {
        state
            .metrics
            .rejected_calls_total
            .with_label_values(&[endpoint])
            .inc();
        tracing::debug!(endpoint, status = %e.status, error = %e.message, "call rejected");
        e
    })
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with every route, CORS, and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/allocations",
            get(allocations_handler).post(set_allocations_handler),
        )
        .route("/accounts/:owner", get(account_handler))
        .route("/ws", get(ws_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/claim", post(claim_handler))
        .route("/fill-buffer", post(fill_buffer_handler))
        .route("/rebalance", post(rebalance_handler))
        .route("/buffer-target", post(buffer_target_handler))
        .route("/recall", post(recall_handler))
        .route("/pause", post(pause_handler))
        .route("/unpause", post(unpause_handler))
        .route("/faucet", post(faucet_handler))
        .route("/custody/:id/sweep", post(custody_sweep_handler))
        .route("/custody/:id/recall", post(custody_recall_handler))
        .route("/custody/:id/settle", post(custody_settle_handler))
        .route("/strategies/:id/accrue", post(accrue_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request & Response Types
// ---------------------------------------------------------------------------

/// `POST /deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub owner: String,
    pub value: u64,
}

/// Units minted by a deposit.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub units: u64,
}

/// `POST /withdraw`. Exactly one of `value` and `units` must be set.
/// With `units` and `queue: true` the request always joins the queue.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub owner: String,
    #[serde(default)]
    pub value: Option<u64>,
    #[serde(default)]
    pub units: Option<u64>,
    #[serde(default)]
    pub queue: bool,
}

/// `POST /claim`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub owner: String,
    pub indexes: Vec<usize>,
}

/// `POST /fill-buffer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FillBufferRequest {
    pub supplier: String,
    pub amount: u64,
}

/// Body of role-gated calls that take no other input.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallerRequest {
    pub caller: String,
}

/// One row of `POST /allocations`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllocationSpec {
    pub strategy: String,
    pub weight_bps: u16,
}

/// `POST /allocations`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetAllocationsRequest {
    pub caller: String,
    pub entries: Vec<AllocationSpec>,
}

/// `POST /buffer-target`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BufferTargetRequest {
    pub caller: String,
    pub target: u64,
}

/// `POST /recall`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecallRequest {
    pub caller: String,
    pub strategy: String,
}

/// `POST /faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub to: String,
    pub amount: u64,
}

/// Body of custodial and yield-vault operator calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperatorRequest {
    pub caller: String,
    #[serde(default)]
    pub amount: u64,
}

/// `POST /strategies/:id/accrue`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccrueRequest {
    pub source: String,
    pub amount: u64,
}

/// Response of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub paused: bool,
    pub vault: VaultStatus,
}

/// Response of `GET /accounts/:owner`.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: AccountView,
    /// Asset the owner holds outside the vault.
    pub wallet_balance: u64,
}

/// A single amount.
#[derive(Debug, Serialize, Deserialize)]
pub struct AmountResponse {
    pub amount: u64,
}

/// Pause state after a pause or unpause.
#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub paused: bool,
}

// ---------------------------------------------------------------------------
// Read Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness only.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let vault = state.gateway.status()?;
    state.metrics.observe_status(&vault);
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        paused: state.gateway.is_paused(),
        vault,
    }))
}

/// `GET /allocations`
async fn allocations_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<AllocationView>>, ApiError> {
    Ok(Json(state.gateway.allocations()?))
}

/// `GET /accounts/:owner`
async fn account_handler(
    Path(owner): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.gateway.account(&owner)?;
    Ok(Json(AccountResponse {
        account,
        wallet_balance: state.asset.balance_of(&owner),
    }))
}

/// `GET /ws`: pushes every [`VaultEvent`] as JSON. Client messages are
/// ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Depositor Handlers
// ---------------------------------------------------------------------------

/// `POST /deposit`
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    execute(&state, "deposit", |s| {
        let units = s.gateway.deposit(&req.owner, req.value)?;
        Ok(DepositResponse { units })
    })
}

/// `POST /withdraw`
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawalOutcome>, ApiError> {
    execute(&state, "withdraw", |s| match (req.value, req.units, req.queue) {
        (Some(value), None, false) => Ok(s.gateway.withdraw(&req.owner, value)?),
        (None, Some(units), false) => Ok(s.gateway.redeem(&req.owner, units)?),
        (None, Some(units), true) => {
            let request = s.gateway.request_withdrawal(&req.owner, units)?;
            Ok(WithdrawalOutcome::Queued { request })
        }
        (Some(_), None, true) => Err(ApiError::bad_request(
            "queued withdrawals are requested by units",
        )),
        _ => Err(ApiError::bad_request(
            "exactly one of value and units must be given",
        )),
    })
}

/// `POST /claim`
async fn claim_handler(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimReceipt>, ApiError> {
    execute(&state, "claim", |s| {
        Ok(s.gateway.claim(&req.owner, &req.indexes)?)
    })
}

/// `POST /fill-buffer`
async fn fill_buffer_handler(
    State(state): State<AppState>,
    Json(req): Json<FillBufferRequest>,
) -> Result<Json<FillReceipt>, ApiError> {
    execute(&state, "fill_buffer", |s| {
        Ok(s.gateway.fill_buffer(&req.supplier, req.amount)?)
    })
}

// ---------------------------------------------------------------------------
// Manager & Emergency Handlers
// ---------------------------------------------------------------------------

/// `POST /allocations`
async fn set_allocations_handler(
    State(state): State<AppState>,
    Json(req): Json<SetAllocationsRequest>,
) -> Result<Json<Vec<AllocationView>>, ApiError> {
    execute(&state, "set_allocations", |s| {
        let entries = req
            .entries
            .iter()
            .map(|row| {
                s.strategies
                    .strategy(&row.strategy)
                    .map(|strategy| AllocationEntry::new(strategy, row.weight_bps))
                    .ok_or_else(|| {
                        ApiError::not_found(format!("unknown strategy: {}", row.strategy))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        s.gateway.set_allocations(&req.caller, entries)?;
        Ok(s.gateway.allocations()?)
    })
}

/// `POST /rebalance`
async fn rebalance_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<RebalanceReport>, ApiError> {
    execute(&state, "rebalance", |s| Ok(s.gateway.rebalance(&req.caller)?))
}

/// `POST /buffer-target`
async fn buffer_target_handler(
    State(state): State<AppState>,
    Json(req): Json<BufferTargetRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    execute(&state, "buffer_target", |s| {
        s.gateway.set_buffer_target(&req.caller, req.target)?;
        Ok(AmountResponse { amount: req.target })
    })
}

/// `POST /recall`
async fn recall_handler(
    State(state): State<AppState>,
    Json(req): Json<RecallRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    execute(&state, "recall", |s| {
        let amount = s.gateway.recall(&req.caller, &req.strategy)?;
        Ok(AmountResponse { amount })
    })
}

/// `POST /pause`
async fn pause_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<PauseResponse>, ApiError> {
    execute(&state, "pause", |s| {
        s.gateway.pause(&req.caller)?;
        Ok(PauseResponse { paused: true })
    })
}

/// `POST /unpause`
async fn unpause_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<PauseResponse>, ApiError> {
    execute(&state, "unpause", |s| {
        s.gateway.unpause(&req.caller)?;
        Ok(PauseResponse { paused: false })
    })
}

// ---------------------------------------------------------------------------
// Devnet & Operator Handlers
// ---------------------------------------------------------------------------

/// `POST /faucet`: mints test asset, capped per call.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    execute(&state, "faucet", |s| {
        if s.faucet_limit == 0 {
            return Err(ApiError::new(StatusCode::FORBIDDEN, "faucet disabled"));
        }
        if req.amount == 0 || req.amount > s.faucet_limit {
            return Err(ApiError::bad_request(format!(
                "faucet amount must be between 1 and {}",
                s.faucet_limit
            )));
        }
        let balance = s.asset.mint(&req.to, req.amount)?;
        s.metrics.faucet_mints_total.inc();
        tracing::info!(to = %req.to, amount = req.amount, "faucet mint");
        Ok(AmountResponse { amount: balance })
    })
}

fn custodial<'a>(
    state: &'a AppState,
    id: &str,
) -> Result<&'a Arc<tidepool_contracts::CustodialStrategy>, ApiError> {
    state
        .strategies
        .custodial(id)
        .ok_or_else(|| ApiError::not_found(format!("no custodial strategy {id}")))
}

/// `POST /custody/:id/sweep`
async fn custody_sweep_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<OperatorRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    execute(&state, "custody_sweep", |s| {
        s.require_manager(&req.caller)?;
        let amount = custodial(s, &id)?.sweep()?;
        Ok(AmountResponse { amount })
    })
}

/// `POST /custody/:id/recall`
async fn custody_recall_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<OperatorRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    execute(&state, "custody_recall", |s| {
        s.require_manager(&req.caller)?;
        custodial(s, &id)?.recall(req.amount)?;
        Ok(AmountResponse { amount: req.amount })
    })
}

/// `POST /custody/:id/settle`
async fn custody_settle_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<OperatorRequest>,
) -> Result<Json<FillReceipt>, ApiError> {
    execute(&state, "custody_settle", |s| {
        s.require_manager(&req.caller)?;
        Ok(custodial(s, &id)?.settle(&s.gateway, req.amount)?)
    })
}

/// `POST /strategies/:id/accrue`
async fn accrue_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<AccrueRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    execute(&state, "accrue", |s| {
        let vault = s
            .strategies
            .yield_vault(&id)
            .ok_or_else(|| ApiError::not_found(format!("no yield vault {id}")))?;
        vault.accrue(&req.source, req.amount)?;
        Ok(AmountResponse {
            amount: vault.total_assets(),
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
