//! Axum REST API handlers.
//!
//! Read endpoints serve cached hook reads and guard views; write endpoints
//! drive one controller action each and answer with its [`Outcome`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chain::{GrantReader, Wallet};
use crate::context::{menu, Locale, NavItem, Theme};
use crate::db;
use crate::errors::ClientError;
use crate::events::EventRecord;
use crate::flows::admin::{AdminFlow, Roles, VerifyForm};
use crate::flows::claim::ClaimFlow;
use crate::flows::create::{CreateDraft, CreateFlow};
use crate::flows::gift::GiftFlow;
use crate::flows::network::switch_network;
use crate::flows::provider::ProviderFlow;
use crate::flows::request::RequestFlow;
use crate::flows::{FlowEnv, Outcome};
use crate::guards::{self, Action, GuardError, ManageAction};
use crate::notify::Notification;
use crate::reads::ReadState;
use crate::routes::Route;
use crate::types::{Address, ClaimCheck, Program};
use crate::units::{format_rupiah, parse_amount};

const DEFAULT_EVENT_LIMIT: u32 = 50;
const MAX_EVENT_LIMIT: u32 = 500;

pub struct ApiState<C> {
    pub env: FlowEnv<C>,
    pub pool: SqlitePool,
}

pub fn router<C: GrantReader + Wallet>(state: Arc<ApiState<C>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/context", get(context::<C>))
        .route("/api/routes/resolve", get(resolve_route::<C>))
        .route("/api/programs", get(list_programs::<C>))
        .route("/api/programs/:id", get(get_program::<C>))
        .route("/api/programs/:id/claimable", get(claimable::<C>))
        .route("/api/programs/:id/guards", get(get_guards::<C>))
        .route("/api/programs/:id/events", get(get_program_events::<C>))
        .route("/api/events", get(get_recent_events::<C>))
        .route("/api/providers/:address/programs", get(get_provider_history::<C>))
        .route("/api/notifications", get(notifications::<C>))
        .route("/api/network/switch", post(post_switch_network::<C>))
        .route("/api/create/approve", post(post_create_approve::<C>))
        .route("/api/create", post(post_create::<C>))
        .route("/api/claim/:id", post(post_claim::<C>))
        .route("/api/gift/:id", post(post_gift::<C>))
        .route("/api/request/:id", post(post_request::<C>))
        .route("/api/admin/roles", get(admin_roles::<C>))
        .route("/api/admin/verify", post(post_verify::<C>))
        .route("/api/provider/programs", get(provider_programs::<C>))
        .route("/api/provider/:id/pause", post(post_pause::<C>))
        .route("/api/provider/:id/resume", post(post_resume::<C>))
        .route("/api/provider/:id/end", post(post_end::<C>))
        .route("/api/provider/:id/topup/approve", post(post_top_up_approve::<C>))
        .route("/api/provider/:id/topup", post(post_top_up::<C>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Client(ClientError),
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}

impl From<GuardError> for ApiError {
    fn from(e: GuardError) -> Self {
        Self::Client(e.into())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::NotFound(error) => {
                return (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
            }
            ApiError::BadRequest(error) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Client(e) => e,
        };
        let error = e.to_string();
        match e {
            ClientError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": error, "fields": fields })),
            )
                .into_response(),
            ClientError::Guard(guard) => {
                let status = match guard {
                    GuardError::WalletNotConnected => StatusCode::PRECONDITION_FAILED,
                    GuardError::NotAuthorized => StatusCode::FORBIDDEN,
                    _ => StatusCode::CONFLICT,
                };
                (status, Json(json!({ "error": error, "guard": guard }))).into_response()
            }
            other => {
                let status = match other {
                    ClientError::WalletUnavailable => StatusCode::PRECONDITION_FAILED,
                    ClientError::TxBusy | ClientError::InvalidTransition { .. } => {
                        StatusCode::CONFLICT
                    }
                    ClientError::Decode(_) => StatusCode::BAD_REQUEST,
                    ClientError::Rpc { .. } | ClientError::Http(_) => StatusCode::BAD_GATEWAY,
                    ClientError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(ErrorResponse { error })).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn loaded<T>(state: ReadState<T>, what: &str) -> Result<T, ApiError> {
    match state {
        ReadState::Loaded(v) => Ok(v),
        ReadState::Errored(message) => Err(ClientError::Rpc { code: 0, message }.into()),
        ReadState::Disabled | ReadState::Loading => {
            Err(ApiError::NotFound(format!("{what} unavailable")))
        }
    }
}

fn program_id(id: u64) -> Result<u64, ApiError> {
    if id == 0 {
        return Err(ApiError::NotFound("program ids start at 1".to_string()));
    }
    Ok(id)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub theme: Theme,
    pub locale: Locale,
    pub menu: Vec<NavItem>,
    pub chain_id: u64,
    pub grant_address: Address,
    pub token_address: Address,
    pub sponsored: bool,
}

#[derive(Debug, Serialize)]
pub struct ResolvedRoute {
    pub route: Route,
    pub path: String,
    pub redirect: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProgramView {
    #[serde(flatten)]
    pub program: Program,
    pub mode_label: &'static str,
    pub total_display: String,
    pub remaining_display: String,
    pub max_per_claim_display: String,
    pub estimated_recipients: u128,
    pub time_bounded: bool,
    /// Share link beneficiaries open to claim.
    pub claim_url: String,
    pub owner_url: String,
}

#[derive(Debug, Serialize)]
pub struct ProgramsResponse {
    pub count: u64,
    pub programs: Vec<ProgramView>,
}

#[derive(Debug, Serialize)]
pub struct GuardView {
    pub wallet: Option<Address>,
    pub wrong_network: bool,
    pub already_claimed: bool,
    pub verification_gate: bool,
    pub program_open: bool,
    pub sufficient_balance: Option<bool>,
    pub needs_approval: Option<bool>,
    pub can_claim_instant: bool,
    pub can_claim_gift: bool,
    pub can_submit_request: bool,
    pub can_verify: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_end: bool,
    pub can_top_up: bool,
    pub actions: Vec<Action>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub program_id: u64,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
pub struct AllEventsResponse {
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
pub struct ProviderHistoryResponse {
    pub provider: Address,
    pub count: usize,
    pub programs: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
pub struct NetworkResponse {
    pub chain_id: ReadState<u64>,
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct GuardQuery {
    /// Decimal IDRX amount the user is about to request or spend.
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GiftBody {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountBody {
    pub amount: String,
}

// ─────────────────────────────────────────────────────────
// Read handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /api/context`
pub async fn context<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
) -> Json<ContextResponse> {
    let ctx = &state.env.ctx;
    Json(ContextResponse {
        theme: ctx.theme,
        locale: ctx.locale,
        menu: menu(ctx.locale),
        chain_id: ctx.config.chain_id,
        grant_address: ctx.config.grant_address,
        token_address: ctx.config.token_address,
        sponsored: ctx.config.paymaster_url.is_some(),
    })
}

/// `GET /api/routes/resolve?path=/gift/3`
pub async fn resolve_route<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<ResolvedRoute> {
    let route = Route::parse(&query.path)
        .ok_or_else(|| ApiError::NotFound(format!("no page at {}", query.path)))?;
    let redirect = state.env.resolve_route(route).await?;
    Ok(Json(ResolvedRoute {
        route,
        path: route.path(),
        redirect: redirect.map(|r| r.path()),
    }))
}

fn program_view<C>(env: &FlowEnv<C>, program: Program) -> ProgramView {
    let config = &env.ctx.config;
    let decimals = config.token_decimals;
    ProgramView {
        mode_label: program.mode.label(),
        total_display: format_rupiah(program.total_fund, decimals),
        remaining_display: format_rupiah(program.remaining_fund, decimals),
        max_per_claim_display: format_rupiah(program.max_per_claim, decimals),
        estimated_recipients: guards::estimated_recipients(
            program.total_fund,
            program.max_per_claim,
        ),
        time_bounded: program.is_time_bounded(),
        claim_url: format!(
            "{}{}",
            config.app_url,
            Route::for_program(program.id, program.mode).path()
        ),
        owner_url: config.address_url(&program.owner),
        program,
    }
}

/// `GET /api/programs`
pub async fn list_programs<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
) -> ApiResult<ProgramsResponse> {
    let reads = &state.env.reads;
    let count = loaded(reads.program_count(false).await, "program count")?;
    let mut programs = Vec::new();
    for id in 1..=count {
        if let ReadState::Loaded(p) = reads.program(id, false).await {
            programs.push(program_view(&state.env, p));
        }
    }
    Ok(Json(ProgramsResponse { count, programs }))
}

async fn existing_program<C: GrantReader + Wallet>(
    env: &FlowEnv<C>,
    id: u64,
) -> Result<Program, ApiError> {
    let id = program_id(id)?;
    let count = loaded(env.reads.program_count(false).await, "program count")?;
    if id > count {
        return Err(ApiError::NotFound(format!("program {id} not found")));
    }
    loaded(env.reads.program(id, false).await, "program")
}

/// `GET /api/programs/:id`
pub async fn get_program<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<ProgramView> {
    let program = existing_program(&state.env, id).await?;
    Ok(Json(program_view(&state.env, program)))
}

/// `GET /api/programs/:id/claimable`
pub async fn claimable<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<ReadState<ClaimCheck>> {
    let flow = ClaimFlow::new(state.env.clone(), program_id(id)?);
    Ok(Json(flow.preview().await?))
}

/// `GET /api/programs/:id/guards?amount=…`
pub async fn get_guards<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
    Query(query): Query<GuardQuery>,
) -> ApiResult<GuardView> {
    let id = program_id(id)?;
    let env = &state.env;
    let requested = match query.amount.as_deref() {
        Some(a) => Some(
            parse_amount(a, env.ctx.config.token_decimals)
                .map_err(|_| ApiError::BadRequest(format!("invalid amount {a}")))?,
        ),
        None => None,
    };
    let wallet = env.wallet().await?;
    let s = env.snapshot(wallet, Some(id), requested, false).await;
    Ok(Json(GuardView {
        wallet,
        wrong_network: guards::wrong_network(&s),
        already_claimed: guards::already_claimed(&s),
        verification_gate: guards::verification_gate(&s),
        program_open: guards::program_open(&s),
        sufficient_balance: requested.map(|a| guards::sufficient_balance(&s, a)),
        needs_approval: requested.and_then(|a| guards::needs_approval(&s, a)),
        can_claim_instant: guards::can_claim_instant(&s),
        can_claim_gift: guards::can_claim_gift(&s),
        can_submit_request: guards::can_submit_request(&s),
        can_verify: guards::can_verify(&s),
        can_pause: guards::can_manage(&s, ManageAction::Pause),
        can_resume: guards::can_manage(&s, ManageAction::Resume),
        can_end: guards::can_manage(&s, ManageAction::End),
        can_top_up: guards::can_manage(&s, ManageAction::TopUp),
        actions: guards::available_actions(&s),
    }))
}

/// `GET /api/programs/:id/events`
///
/// Returns all indexed events for the given program.
pub async fn get_program_events<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<EventsResponse> {
    let events = db::get_events_for_program(&state.pool, program_id(id)?).await?;
    Ok(Json(EventsResponse {
        program_id: id,
        count: events.len(),
        events,
    }))
}

/// `GET /api/events?limit=…`
///
/// Most recent indexed events across all programs.
pub async fn get_recent_events<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<AllEventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT);
    let events = db::get_recent_events(&state.pool, limit).await?;
    Ok(Json(AllEventsResponse {
        count: events.len(),
        events,
    }))
}

/// `GET /api/providers/:address/programs`
pub async fn get_provider_history<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(address): Path<String>,
) -> ApiResult<ProviderHistoryResponse> {
    let provider: Address = address
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid address {address}")))?;
    let programs = db::get_programs_by_provider(&state.pool, &provider.to_string()).await?;
    Ok(Json(ProviderHistoryResponse {
        provider,
        count: programs.len(),
        programs,
    }))
}

/// `GET /api/notifications`
pub async fn notifications<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
) -> Json<Vec<Notification>> {
    Json(state.env.ctx.notifications.active())
}

/// `GET /api/admin/roles`
pub async fn admin_roles<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
) -> ApiResult<Roles> {
    Ok(Json(AdminFlow::new(state.env.clone()).roles().await?))
}

/// `GET /api/provider/programs`: live reads of the connected wallet's programs.
pub async fn provider_programs<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
) -> ApiResult<Vec<ProgramView>> {
    let wallet = state.env.wallet_required().await?;
    let owned = ProviderFlow::new(state.env.clone()).programs(wallet, false).await?;
    Ok(Json(owned.into_iter().map(|p| program_view(&state.env, p)).collect()))
}

// ─────────────────────────────────────────────────────────
// Write handlers
// ─────────────────────────────────────────────────────────

/// `POST /api/network/switch`
pub async fn post_switch_network<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
) -> ApiResult<NetworkResponse> {
    let chain_id = switch_network(&state.env).await?;
    Ok(Json(NetworkResponse { chain_id }))
}

/// `POST /api/create/approve`
pub async fn post_create_approve<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Json(draft): Json<CreateDraft>,
) -> ApiResult<Outcome> {
    Ok(Json(CreateFlow::new(state.env.clone()).approve(&draft).await?))
}

/// `POST /api/create`
pub async fn post_create<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Json(draft): Json<CreateDraft>,
) -> ApiResult<Outcome> {
    Ok(Json(CreateFlow::new(state.env.clone()).submit(&draft).await?))
}

/// `POST /api/claim/:id`
pub async fn post_claim<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<Outcome> {
    let mut flow = ClaimFlow::new(state.env.clone(), program_id(id)?);
    Ok(Json(flow.claim().await?))
}

/// `POST /api/gift/:id`
pub async fn post_gift<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
    Json(body): Json<GiftBody>,
) -> ApiResult<Outcome> {
    let mut flow = GiftFlow::new(state.env.clone(), program_id(id)?);
    Ok(Json(flow.redeem(&body.code).await?))
}

/// `POST /api/request/:id`
pub async fn post_request<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
    Json(body): Json<AmountBody>,
) -> ApiResult<Outcome> {
    let mut flow = RequestFlow::new(state.env.clone(), program_id(id)?);
    Ok(Json(flow.submit(&body.amount).await?))
}

/// `POST /api/admin/verify`
pub async fn post_verify<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Json(form): Json<VerifyForm>,
) -> ApiResult<Outcome> {
    Ok(Json(AdminFlow::new(state.env.clone()).verify(&form).await?))
}

/// `POST /api/provider/:id/pause`
pub async fn post_pause<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<Outcome> {
    let id = program_id(id)?;
    Ok(Json(ProviderFlow::new(state.env.clone()).pause(id).await?))
}

/// `POST /api/provider/:id/resume`
pub async fn post_resume<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<Outcome> {
    let id = program_id(id)?;
    Ok(Json(ProviderFlow::new(state.env.clone()).resume(id).await?))
}

/// `POST /api/provider/:id/end`
pub async fn post_end<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
) -> ApiResult<Outcome> {
    let id = program_id(id)?;
    Ok(Json(ProviderFlow::new(state.env.clone()).end(id).await?))
}

/// `POST /api/provider/:id/topup/approve`
pub async fn post_top_up_approve<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
    Json(body): Json<AmountBody>,
) -> ApiResult<Outcome> {
    let id = program_id(id)?;
    let mut flow = ProviderFlow::new(state.env.clone());
    Ok(Json(flow.top_up_approve(id, &body.amount).await?))
}

/// `POST /api/provider/:id/topup`
pub async fn post_top_up<C: GrantReader + Wallet>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<u64>,
    Json(body): Json<AmountBody>,
) -> ApiResult<Outcome> {
    let id = program_id(id)?;
    let mut flow = ProviderFlow::new(state.env.clone());
    Ok(Json(flow.top_up(id, &body.amount).await?))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, tests::created_log};
    use crate::flows::test_support::env;
    use crate::flows::Step;
    use crate::testutil::{wallet, MockChain};

    fn state_with(pool: SqlitePool) -> (Arc<MockChain>, Arc<ApiState<MockChain>>) {
        let (chain, env) = env();
        (chain, Arc::new(ApiState { env, pool }))
    }

    async fn state() -> (Arc<MockChain>, Arc<ApiState<MockChain>>) {
        state_with(db::init_pool("sqlite::memory:").await.unwrap())
    }

    /// For paused-clock tests that never touch the database.
    fn lazy_state() -> (Arc<MockChain>, Arc<ApiState<MockChain>>) {
        state_with(SqlitePool::connect_lazy("sqlite::memory:").unwrap())
    }

    async fn body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn router_builds() {
        let (_, state) = state().await;
        let _ = router(state);
    }

    #[tokio::test]
    async fn program_view_formats_amounts_and_links() {
        let (chain, state) = state().await;
        let id = chain.add_gift_program(wallet(9), 10_000_000, 2_500_000, "CODE");

        let Json(view) = get_program(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(view.total_display, "Rp 100.000");
        assert_eq!(view.max_per_claim_display, "Rp 25.000");
        assert_eq!(view.estimated_recipients, 4);
        assert_eq!(view.mode_label, "Gift Card");
        assert_eq!(view.claim_url, format!("http://localhost:3000/gift/{id}"));
        assert!(view.owner_url.ends_with(&wallet(9).to_string()));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mode"], "gift_code");
        assert_eq!(json["id"], id);
    }

    #[tokio::test]
    async fn unknown_programs_are_404() {
        let (_, state) = state().await;
        for id in [0, 3] {
            let err = get_program(State(state.clone()), Path(id)).await.unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn resolve_redirects_mismatched_pages() {
        let (chain, state) = state().await;
        let id = chain.add_instant_program(wallet(9), 10_000, 1_000);

        let query = ResolveQuery {
            path: format!("/gift/{id}"),
        };
        let Json(resolved) = resolve_route(State(state.clone()), Query(query)).await.unwrap();
        assert_eq!(resolved.redirect, Some(format!("/claim/{id}")));

        let missing = ResolveQuery {
            path: "/nowhere".to_string(),
        };
        let err = resolve_route(State(state), Query(missing)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn guard_view_for_claimable_program() {
        let (chain, state) = state().await;
        let id = chain.add_instant_program(wallet(9), 10_000, 1_000);

        let query = GuardQuery { amount: None };
        let Json(view) = get_guards(State(state), Path(id), Query(query)).await.unwrap();
        assert!(view.can_claim_instant);
        assert!(!view.can_claim_gift);
        assert!(!view.can_pause);
        assert_eq!(view.actions, vec![Action::ClaimInstant]);
    }

    #[tokio::test(start_paused = true)]
    async fn claim_endpoint_and_guard_rejection() {
        let (chain, state) = lazy_state();
        let id = chain.add_instant_program(wallet(9), 10_000, 1_000);

        let Json(outcome) = post_claim(State(state.clone()), Path(id)).await.unwrap();
        assert!(matches!(outcome.step, Step::Success { .. }));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["step"], "success");
        assert_eq!(json["program_id"], id);
        assert!(json["explorer_url"].as_str().unwrap().contains("/tx/0x"));

        let err = post_claim(State(state), Path(id)).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body(response).await["guard"]["reason"], "already_claimed");
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_are_422() {
        let (chain, state) = lazy_state();
        let id = chain.add_request_program(wallet(9), 10_000, 1_000, false);

        let body_in = AmountBody {
            amount: "abc".to_string(),
        };
        let err = post_request(State(state), Path(id), Json(body_in)).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body(response).await["fields"]["amount"].is_string());
    }

    #[tokio::test]
    async fn provider_history_from_index() {
        let (_, state) = state().await;
        let contract = events::tests::contract();
        let ev = events::decode(&created_log(1, wallet(9), 50_000, 3, 0), contract).unwrap();
        db::insert_events(&state.pool, &[ev]).await.unwrap();

        let upper = wallet(9).to_string().to_uppercase().replacen("0X", "0x", 1);
        let Json(history) = get_provider_history(State(state.clone()), Path(upper)).await.unwrap();
        assert_eq!(history.count, 1);
        assert_eq!(history.programs[0].program_id, 1);

        let err = get_provider_history(State(state), Path("0x12".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn switch_network_endpoint() {
        let (chain, state) = state().await;
        chain.set_wallet_chain(1);
        let Json(resp) = post_switch_network(State(state.clone())).await.unwrap();
        assert_eq!(resp.chain_id, ReadState::Loaded(crate::testutil::CHAIN_ID));

        let Json(notes) = notifications(State(state)).await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].key, "switch-network");
    }
}
