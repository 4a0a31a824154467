//! HTTP API handlers.
//!
//! Reads take the engine's read lock. Every write takes the write lock for
//! the whole engine call, so requests apply one at a time. The caller
//! address in a write body is checked by the engine's authorizer.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::amm::bps_to_decimal;
use crate::error::{MarketError, OracleError};
use crate::market::{MarketEngine, MarketId, MarketSnapshot, MarketState, Outcome, Settlement, Side, Trade};
use crate::oracle::{AssertionId, LocalOracle, OracleAdapter, OracleCallback};
use crate::treasury::InMemoryTreasury;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// The engine.
    pub engine: Arc<RwLock<MarketEngine>>,
    /// In-process oracle, when the service runs one.
    pub oracle: Option<Arc<LocalOracle>>,
    /// In-process collateral token, when the service runs one.
    pub treasury: Option<Arc<InMemoryTreasury>>,
    /// Prometheus render handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(engine: Arc<RwLock<MarketEngine>>) -> Self {
        Self {
            engine,
            oracle: None,
            treasury: None,
            metrics: None,
        }
    }

    /// Expose the local oracle's dispute and arbitration routes.
    pub fn with_oracle(mut self, oracle: Arc<LocalOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Expose collateral balances.
    pub fn with_treasury(mut self, treasury: Arc<InMemoryTreasury>) -> Self {
        self.treasury = Some(treasury);
        self
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn local_oracle(&self) -> Result<&Arc<LocalOracle>, ApiError> {
        self.oracle
            .as_ref()
            .ok_or_else(|| ApiError::NotFound("no local oracle attached".to_string()))
    }
}

/// Handler error mapped onto a status code.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or rejected request.
    BadRequest(String),
    /// Caller may not perform the action.
    Forbidden(String),
    /// Unknown resource.
    NotFound(String),
    /// Request conflicts with the current lifecycle state.
    Conflict(String),
    /// Anything else.
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::Forbidden(e) => (StatusCode::FORBIDDEN, e),
            ApiError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            ApiError::Conflict(e) => (StatusCode::CONFLICT, e),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        match e {
            MarketError::MarketNotFound(_) => ApiError::NotFound(e.to_string()),
            MarketError::Unauthorized { .. } | MarketError::OnlyOracle { .. } => {
                ApiError::Forbidden(e.to_string())
            }
            MarketError::MarketResolved(_)
            | MarketError::MarketNotResolved(_)
            | MarketError::ActiveAssertionExists { .. }
            | MarketError::UnknownAssertion(_) => ApiError::Conflict(e.to_string()),
            MarketError::Oracle(inner) => inner.into(),
            ref fatal if fatal.is_fatal() => ApiError::Internal(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::UnknownAssertion(_) => ApiError::NotFound(e.to_string()),
            OracleError::QuoteFailed(_) | OracleError::SubmissionFailed(_) => {
                ApiError::Internal(e.to_string())
            }
            OracleError::Bond(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Conflict(other.to_string()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
    /// Number of markets.
    pub markets: usize,
}

/// Market listing entry.
#[derive(Debug, Serialize)]
pub struct MarketSummary {
    /// Market id.
    pub id: String,
    /// Question text.
    pub description: String,
    /// Lifecycle state.
    pub state: MarketState,
}

/// Market listing response.
#[derive(Debug, Serialize)]
pub struct MarketListResponse {
    /// Markets in creation order.
    pub markets: Vec<MarketSummary>,
}

/// Full market record. Amounts are strings to survive JSON number limits.
#[derive(Debug, Serialize)]
pub struct MarketResponse {
    /// Market id.
    pub id: String,
    /// Creator address.
    pub creator: String,
    /// Question text.
    pub description: String,
    /// First outcome label.
    pub outcome1: String,
    /// Second outcome label.
    pub outcome2: String,
    /// Lifecycle state.
    pub state: MarketState,
    /// Whether the market is resolved.
    pub resolved: bool,
    /// Asserted label hash, zero when none.
    pub asserted_outcome_hash: String,
    /// Asserted outcome, if any.
    pub asserted_outcome: Option<Outcome>,
    /// In-flight assertion, if any.
    pub active_assertion: Option<String>,
    /// Asserter reward.
    pub reward: String,
    /// Creator-specified minimum bond.
    pub required_bond: String,
    /// Collateral in the pool.
    pub total_collateral: String,
    /// Outstanding first-outcome claims.
    pub claim1_supply: String,
    /// Outstanding second-outcome claims.
    pub claim2_supply: String,
    /// Venue fees retained.
    pub fees_accrued: String,
    /// Every outstanding claim shares the pool.
    pub pays_all_claims: bool,
    /// Unix creation timestamp.
    pub created_at: i64,
}

impl From<MarketSnapshot> for MarketResponse {
    fn from(snap: MarketSnapshot) -> Self {
        let m = snap.market;
        Self {
            id: m.id.to_string(),
            creator: m.creator.to_string(),
            description: m.description,
            outcome1: m.outcome1,
            outcome2: m.outcome2,
            state: snap.state,
            resolved: m.resolved,
            asserted_outcome_hash: m.asserted_outcome_hash.to_string(),
            asserted_outcome: m.asserted_outcome,
            active_assertion: m.active_assertion.map(|a| a.to_string()),
            reward: m.reward.to_string(),
            required_bond: m.required_bond.to_string(),
            total_collateral: m.total_collateral.to_string(),
            claim1_supply: snap.claim1_supply.to_string(),
            claim2_supply: snap.claim2_supply.to_string(),
            fees_accrued: m.fees_accrued.to_string(),
            pays_all_claims: m.pays_all_claims,
            created_at: m.created_at,
        }
    }
}

/// Implied probability response.
#[derive(Debug, Serialize)]
pub struct ProbabilityResponse {
    /// First outcome, basis points.
    pub p1_bps: u32,
    /// Second outcome, basis points.
    pub p2_bps: u32,
    /// First outcome as a fraction.
    pub price1: String,
    /// Second outcome as a fraction.
    pub price2: String,
}

/// Venue reserves response.
#[derive(Debug, Serialize)]
pub struct ReservesResponse {
    /// First reserve.
    pub reserve1: String,
    /// Second reserve.
    pub reserve2: String,
}

/// Market creation request.
#[derive(Debug, Deserialize)]
pub struct CreateMarketRequest {
    /// Creating account; pays the reward.
    pub caller: String,
    /// First outcome label.
    pub outcome1: String,
    /// Second outcome label.
    pub outcome2: String,
    /// Question text.
    pub description: String,
    /// Reward for the upheld asserter.
    #[serde(default)]
    pub reward: u128,
    /// Minimum bond for assertions.
    #[serde(default)]
    pub required_bond: u128,
}

/// Mint request.
#[derive(Debug, Deserialize)]
pub struct MintRequest {
    /// Depositing account.
    pub caller: String,
    /// Collateral to lock.
    pub amount: u128,
}

/// Assertion request.
#[derive(Debug, Deserialize)]
pub struct AssertRequest {
    /// Asserting account; posts the bond.
    pub caller: String,
    /// Asserted label.
    pub outcome: String,
}

/// Venue purchase request.
#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    /// Buying account.
    pub caller: String,
    /// Outcome to buy.
    pub side: Side,
    /// Collateral paid, fee included.
    pub input: u128,
    /// Smallest acceptable output.
    #[serde(default)]
    pub min_output: u128,
}

/// Request carrying only the calling account.
#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    /// Calling account.
    pub caller: String,
}

/// Arbitration request for the local oracle.
#[derive(Debug, Deserialize)]
pub struct ArbitrateRequest {
    /// Must be the oracle address.
    pub caller: String,
    /// Whether the asserted claim is upheld.
    pub truthful: bool,
}

/// Created market.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    /// New market id.
    pub id: String,
}

/// Submitted assertion.
#[derive(Debug, Serialize)]
pub struct AssertionResponse {
    /// Oracle handle.
    pub assertion: String,
    /// Market asserted on.
    pub market: String,
}

/// Completed venue purchase.
#[derive(Debug, Serialize)]
pub struct TradeResponse {
    /// Outcome bought.
    pub side: Side,
    /// Collateral paid, fee included.
    pub amount_in: String,
    /// Fee retained.
    pub fee: String,
    /// Claims received.
    pub amount_out: String,
    /// First reserve after the trade.
    pub reserve1: String,
    /// Second reserve after the trade.
    pub reserve2: String,
}

impl From<Trade> for TradeResponse {
    fn from(t: Trade) -> Self {
        Self {
            side: t.side,
            amount_in: t.amount_in.to_string(),
            fee: t.fee.to_string(),
            amount_out: t.amount_out.to_string(),
            reserve1: t.reserve1.to_string(),
            reserve2: t.reserve2.to_string(),
        }
    }
}

/// Completed settlement.
#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    /// Outcome paid out.
    pub outcome: Outcome,
    /// First-outcome claims burned.
    pub burned1: String,
    /// Second-outcome claims burned.
    pub burned2: String,
    /// Collateral paid.
    pub payout: String,
}

impl From<Settlement> for SettlementResponse {
    fn from(s: Settlement) -> Self {
        Self {
            outcome: s.outcome,
            burned1: s.burned1.to_string(),
            burned2: s.burned2.to_string(),
            payout: s.payout.to_string(),
        }
    }
}

/// Oracle callback applied to the engine.
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// Assertion the callback refers to.
    pub assertion: String,
    /// Market state after delivery.
    pub state: MarketState,
}

/// Collateral balance of one account.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account.
    pub address: String,
    /// Balance.
    pub balance: String,
}

fn parse_id(raw: &str) -> Result<MarketId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid market id: {}", raw)))
}

fn parse_assertion(raw: &str) -> Result<AssertionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid assertion id: {}", raw)))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::from_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("invalid address: {}", raw)))
}

/// Health check handler - always returns 200.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let markets = state.engine.read().await.list_market_ids().len();
    Json(HealthResponse {
        status: "ok",
        markets,
    })
}

/// List markets in creation order.
pub async fn list_markets(State(state): State<AppState>) -> Result<Json<MarketListResponse>, ApiError> {
    let engine = state.engine.read().await;
    let markets = engine
        .list_market_ids()
        .iter()
        .map(|id| {
            engine.get_market(id).map(|snap| MarketSummary {
                id: id.to_string(),
                description: snap.market.description,
                state: snap.state,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(MarketListResponse { markets }))
}

/// Full market record.
pub async fn get_market(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MarketResponse>, ApiError> {
    let id = parse_id(&id)?;
    let snap = state.engine.read().await.get_market(&id)?;
    Ok(Json(snap.into()))
}

/// Implied probability of each outcome.
pub async fn get_probability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProbabilityResponse>, ApiError> {
    let id = parse_id(&id)?;
    let (p1_bps, p2_bps) = state.engine.read().await.get_probability(&id)?;
    Ok(Json(ProbabilityResponse {
        p1_bps,
        p2_bps,
        price1: bps_to_decimal(p1_bps).to_string(),
        price2: bps_to_decimal(p2_bps).to_string(),
    }))
}

/// Raw venue reserves.
pub async fn get_reserves(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReservesResponse>, ApiError> {
    let id = parse_id(&id)?;
    let (reserve1, reserve2) = state.engine.read().await.get_reserves(&id)?;
    Ok(Json(ReservesResponse {
        reserve1: reserve1.to_string(),
        reserve2: reserve2.to_string(),
    }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => ApiError::NotFound("metrics recorder not installed".to_string()).into_response(),
    }
}

/// Create a market.
pub async fn create_market(
    State(state): State<AppState>,
    Json(req): Json<CreateMarketRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let caller = parse_address(&req.caller)?;
    let id = state.engine.write().await.initialize(
        caller,
        &req.outcome1,
        &req.outcome2,
        &req.description,
        req.reward,
        req.required_bond,
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.to_string() })))
}

/// Lock collateral and mint both claims.
pub async fn mint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MintRequest>,
) -> Result<Json<MarketResponse>, ApiError> {
    let id = parse_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let mut engine = state.engine.write().await;
    engine.mint(caller, id, req.amount)?;
    Ok(Json(engine.get_market(&id)?.into()))
}

/// Submit an assertion to the oracle.
pub async fn assert_outcome(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssertRequest>,
) -> Result<Json<AssertionResponse>, ApiError> {
    let id = parse_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let assertion = state
        .engine
        .write()
        .await
        .assert_outcome(caller, id, &req.outcome)?;
    Ok(Json(AssertionResponse {
        assertion: assertion.to_string(),
        market: id.to_string(),
    }))
}

/// Buy claims from the venue.
pub async fn buy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BuyRequest>,
) -> Result<Json<TradeResponse>, ApiError> {
    let id = parse_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let trade = state
        .engine
        .write()
        .await
        .buy(caller, id, req.side, req.input, req.min_output)?;
    Ok(Json(trade.into()))
}

/// Redeem the caller's claims after resolution.
pub async fn settle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let id = parse_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let settlement = state.engine.write().await.settle(caller, id)?;
    Ok(Json(settlement.into()))
}

/// Dispute an assertion at the local oracle and notify the engine.
pub async fn dispute(
    State(state): State<AppState>,
    Path(assertion): Path<String>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let assertion = parse_assertion(&assertion)?;
    let disputer = parse_address(&req.caller)?;
    let oracle = state.local_oracle()?;
    let mut engine = state.engine.write().await;
    let callback = oracle.dispute(assertion, disputer)?;
    deliver(&mut engine, oracle, callback)
}

/// Decide a disputed assertion and deliver the verdict.
pub async fn arbitrate(
    State(state): State<AppState>,
    Path(assertion): Path<String>,
    Json(req): Json<ArbitrateRequest>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let assertion = parse_assertion(&assertion)?;
    let caller = parse_address(&req.caller)?;
    let oracle = state.local_oracle()?;
    if caller != oracle.address() {
        return Err(ApiError::Forbidden(format!("{} may not arbitrate", caller)));
    }
    let mut engine = state.engine.write().await;
    let callback = oracle.arbitrate(assertion, req.truthful)?;
    info!(%assertion, truthful = req.truthful, "arbitration submitted over http");
    deliver(&mut engine, oracle, callback)
}

/// Collateral balance of an account.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address = parse_address(&address)?;
    let treasury = state
        .treasury
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("no local treasury attached".to_string()))?;
    Ok(Json(BalanceResponse {
        address: address.to_string(),
        balance: treasury.balance_of(&address).to_string(),
    }))
}

fn deliver(
    engine: &mut MarketEngine,
    oracle: &LocalOracle,
    callback: OracleCallback,
) -> Result<Json<CallbackResponse>, ApiError> {
    let assertion = callback.assertion();
    let market = engine
        .assertion_market(&assertion)
        .ok_or_else(|| ApiError::Conflict(format!("assertion {} is not tracked by the engine", assertion)))?;
    if let Err(e) = engine.handle_callback(oracle.address(), callback) {
        warn!(error = %e, %assertion, "oracle callback rejected by engine");
        return Err(e.into());
    }
    Ok(Json(CallbackResponse {
        assertion: assertion.to_string(),
        state: engine.get_market(&market)?.state,
    }))
}
