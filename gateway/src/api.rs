//! # REST API
//!
//! Builds the axum router for the gateway's HTTP surface. All handlers
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                                  | Description                      |
//! |--------|-------------------------------------------------------|----------------------------------|
//! | GET    | `/health`                                             | Liveness probe                   |
//! | GET    | `/api/v0/user/proxy`                                  | Stage a proxy delegation         |
//! | GET    | `/api/v0/user/proxy/commit/:proxyToken`               | Commit a staged proxy            |
//! | GET    | `/api/v0/ticket/`                                     | Price & availability (read-only) |
//! | POST   | `/api/v0/ticket/purchase`                             | Stage a two-leg ticket purchase  |
//! | POST   | `/api/v0/ticket/purchase/extra`                       | Stage an extras purchase         |
//! | POST   | `/api/v0/ticket/purchase/commit/:coinToken/:movieToken` | Commit a staged purchase       |
//! | GET    | `/api/v0/token/balance/:kind`                         | Balance lookup                   |
//!
//! Authentication proper lives in front of this service; the gateway
//! consumes the already-verified principal from the `Authorization`
//! bearer header as a typed value carrying exactly one thing: the
//! caller's ledger account.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use marquee_core::balance::{BalanceKind, BalanceQueryService, BalanceReport};
use marquee_core::config::GatewayConfig;
use marquee_core::error::StagingError;
use marquee_core::ledger::{LedgerClient, LedgerError};
use marquee_core::staging::{CommitCoordinator, CommitOutcome, PendingStore, TokenIssuer};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Stages transactions and mints tokens.
    pub issuer: Arc<TokenIssuer>,
    /// Executes commits.
    pub coordinator: Arc<CommitCoordinator>,
    /// Read-only balance lookups.
    pub balances: Arc<BalanceQueryService>,
    /// The shared descriptor store (also swept by the background task).
    pub store: Arc<PendingStore>,
    /// Startup configuration.
    pub config: Arc<GatewayConfig>,
    /// Prometheus handles for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wires the staging core around one ledger client.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        config: Arc<GatewayConfig>,
        metrics: SharedMetrics,
    ) -> Self {
        let store = Arc::new(PendingStore::new());
        let issuer = Arc::new(TokenIssuer::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&config),
        ));
        let coordinator = Arc::new(CommitCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            config.leg_timeout(),
        ));
        let balances = Arc::new(BalanceQueryService::new(ledger, Arc::clone(&config)));

        Self {
            issuer,
            coordinator,
            balances,
            store,
            config,
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// The authenticated caller, reduced to the one field the core needs.
///
/// The identity provider in front of the gateway verifies credentials and
/// forwards the caller's ledger account as the bearer value.
pub struct Principal {
    /// Ledger account of the caller.
    pub account: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|a| !a.is_empty());

        match account {
            Some(account) => Ok(Principal {
                account: account.to_string(),
            }),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("missing bearer credential")),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/v0/user/proxy`.
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    /// Allowance the operator is being granted.
    pub amount: u64,
}

/// Body of `POST /api/v0/ticket/purchase`.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// Index of the movie token being bought.
    #[serde(rename = "movieTokenIndex")]
    pub movie_token_index: String,
}

/// Body of `POST /api/v0/ticket/purchase/extra`.
#[derive(Debug, Deserialize)]
pub struct ExtraPurchaseRequest {
    /// Base-coin price of the extras; 0 for a free grant.
    pub price: u64,
    /// Number of fungible extra tokens.
    pub quantity: u64,
}

/// Response payload for a staged proxy delegation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyStagedResponse {
    #[serde(rename = "proxyToken")]
    pub proxy_token: String,
}

/// Response payload for a staged ticket purchase.
#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseStagedResponse {
    #[serde(rename = "baseCoinTransferToken")]
    pub base_coin_transfer_token: String,
    #[serde(rename = "movieTokenTransferToken")]
    pub movie_token_transfer_token: String,
}

/// Response payload for a staged extras purchase.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtraStagedResponse {
    /// Staging tokens, in leg order. All must be presented at commit.
    pub tokens: Vec<String>,
}

/// Response payload for a successful commit.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    #[serde(rename = "ledgerTxIds")]
    pub ledger_tx_ids: Vec<String>,
}

/// Response payload for `GET /api/v0/ticket/`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseInfoResponse {
    /// Base-coin price of one ticket.
    pub price: u64,
    /// Movie tokens currently available for purchase.
    #[serde(rename = "availableTokenIndexes")]
    pub available_token_indexes: Vec<String>,
}

/// Generic error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Present only on partial commit failures: ledger transaction ids of
    /// the legs that did commit, for reconciliation.
    #[serde(rename = "committedTxIds", skip_serializing_if = "Option::is_none")]
    pub committed_tx_ids: Option<Vec<String>>,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            committed_tx_ids: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps a [`StagingError`] onto an HTTP status and error body.
fn staging_error_response(err: StagingError) -> ApiError {
    let status = match &err {
        StagingError::InvalidAmount(_)
        | StagingError::InvalidAddress(_)
        | StagingError::IncompleteCommitSet => StatusCode::BAD_REQUEST,
        StagingError::UnknownAsset(_) | StagingError::TokenNotFound => StatusCode::NOT_FOUND,
        StagingError::TokenExpired => StatusCode::GONE,
        StagingError::InsufficientBalance { .. }
        | StagingError::TicketUnavailable(_)
        | StagingError::AlreadyInProgress
        | StagingError::AlreadyCommitted => StatusCode::CONFLICT,
        StagingError::LegFailed { .. } | StagingError::PartialCommitFailure { .. } => {
            StatusCode::BAD_GATEWAY
        }
        StagingError::Ledger(LedgerError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
        StagingError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let mut body = ErrorResponse::new(err.to_string());
    if let StagingError::PartialCommitFailure {
        committed_tx_ids, ..
    } = err
    {
        body.committed_tx_ids = Some(committed_tx_ids);
    }
    (status, Json(body))
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
        .route("/api/v0/user/proxy", get(request_proxy_handler))
        .route(
            "/api/v0/user/proxy/commit/:proxyToken",
            get(commit_proxy_handler),
        )
        .route("/api/v0/ticket/", get(purchase_info_handler))
        .route("/api/v0/ticket/purchase", post(request_purchase_handler))
        .route(
            "/api/v0/ticket/purchase/extra",
            post(request_extra_handler),
        )
        .route(
            "/api/v0/ticket/purchase/commit/:coinToken/:movieToken",
            post(commit_purchase_handler),
        )
        .route("/api/v0/token/balance/:kind", get(balance_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness probe for orchestrators. Intentionally does
/// not touch the ledger; a dead ledger is a degraded gateway, not a dead
/// one.
async fn health_handler() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /api/v0/user/proxy?amount=` — stages a proxy delegation for the
/// caller's wallet and returns the staging token.
async fn request_proxy_handler(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ProxyQuery>,
) -> Result<Json<ProxyStagedResponse>, ApiError> {
    let proxy_token = state
        .issuer
        .request_proxy(&principal.account, query.amount)
        .await
        .map_err(staging_error_response)?;

    state.metrics.staged_total.inc();
    state.metrics.pending_descriptors.set(state.store.len() as i64);
    Ok(Json(ProxyStagedResponse { proxy_token }))
}

/// `GET /api/v0/user/proxy/commit/:proxyToken` — commits a staged proxy
/// delegation.
async fn commit_proxy_handler(
    State(state): State<AppState>,
    _principal: Principal,
    Path(proxy_token): Path<String>,
) -> Result<Json<CommitResponse>, ApiError> {
    run_commit(&state, &[&proxy_token]).await
}

/// `GET /api/v0/ticket/` — current price and available movie tokens.
async fn purchase_info_handler(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<PurchaseInfoResponse>, ApiError> {
    let inventory = state
        .balances
        .balance(&state.config.operator_address, BalanceKind::MovieTicket)
        .await
        .map_err(staging_error_response)?;

    Ok(Json(PurchaseInfoResponse {
        price: state.config.ticket_price,
        available_token_indexes: inventory.token_indexes.unwrap_or_default(),
    }))
}

/// `POST /api/v0/ticket/purchase` — stages the two-leg ticket purchase
/// and returns both staging tokens. The price is the configured ticket
/// price, not client input.
async fn request_purchase_handler(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseStagedResponse>, ApiError> {
    let (base_coin_transfer_token, movie_token_transfer_token) = state
        .issuer
        .request_ticket_purchase(
            &principal.account,
            state.config.ticket_price,
            &request.movie_token_index,
        )
        .await
        .map_err(staging_error_response)?;

    state.metrics.staged_total.inc();
    state.metrics.pending_descriptors.set(state.store.len() as i64);
    Ok(Json(PurchaseStagedResponse {
        base_coin_transfer_token,
        movie_token_transfer_token,
    }))
}

/// `POST /api/v0/ticket/purchase/extra` — stages an extras purchase.
async fn request_extra_handler(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ExtraPurchaseRequest>,
) -> Result<Json<ExtraStagedResponse>, ApiError> {
    let tokens = state
        .issuer
        .request_extra_purchase(&principal.account, request.price, request.quantity)
        .await
        .map_err(staging_error_response)?;

    state.metrics.staged_total.inc();
    state.metrics.pending_descriptors.set(state.store.len() as i64);
    Ok(Json(ExtraStagedResponse { tokens }))
}

/// `POST /api/v0/ticket/purchase/commit/:coinToken/:movieToken` —
/// commits a staged purchase. Both tokens must belong to the same staged
/// transaction; presenting one leg's token alone cannot commit anything.
async fn commit_purchase_handler(
    State(state): State<AppState>,
    _principal: Principal,
    Path((coin_token, movie_token)): Path<(String, String)>,
) -> Result<Json<CommitResponse>, ApiError> {
    run_commit(&state, &[&coin_token, &movie_token]).await
}

/// `GET /api/v0/token/balance/:kind` — balance lookup for the caller.
async fn balance_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(kind): Path<String>,
) -> Result<Json<BalanceReport>, ApiError> {
    let kind: BalanceKind = kind.parse().map_err(staging_error_response)?;
    let report = state
        .balances
        .balance(&principal.account, kind)
        .await
        .map_err(staging_error_response)?;
    Ok(Json(report))
}

/// Runs a commit and records metrics for whichever way it resolves.
async fn run_commit(state: &AppState, tokens: &[&str]) -> Result<Json<CommitResponse>, ApiError> {
    let timer = state.metrics.commit_latency_seconds.start_timer();
    let result = state.coordinator.commit(tokens).await;
    timer.observe_duration();

    match result {
        Ok(CommitOutcome { ledger_tx_ids }) => {
            state.metrics.committed_total.inc();
            Ok(Json(CommitResponse { ledger_tx_ids }))
        }
        Err(err) => {
            match &err {
                StagingError::LegFailed { .. } => state.metrics.failed_total.inc(),
                StagingError::PartialCommitFailure { .. } => {
                    state.metrics.partial_failures_total.inc()
                }
                _ => {}
            }
            Err(staging_error_response(err))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
