use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::equity::{build_equity_curve, pending_buy_notional, EquityPoint};
use crate::heat::{score_batch, HeatResult};
use crate::ledger::settle_by_symbol;
use crate::reconcile::{reconcile, PnlFigures, PnlSource};
use crate::store::SqliteStore;
use crate::utils::now_ts;

/// Latest ranked heat batch, swapped wholesale by the refresher so readers
/// never observe a half-updated ranking.
pub type HeatCache = Arc<RwLock<Arc<Vec<HeatResult>>>>;

pub struct ApiState {
    pub settings: Settings,
    pub store: SqliteStore,
    pub heat: HeatCache,
}

impl ApiState {
    pub fn new(settings: Settings, store: SqliteStore) -> Arc<Self> {
        Arc::new(Self {
            settings,
            store,
            heat: Arc::new(RwLock::new(Arc::new(vec![]))),
        })
    }
}

/// Re-score the latest candidate batch and publish it to the cache.
/// Returns how many candidates were scored.
pub fn refresh_heat(state: &ApiState) -> Result<usize> {
    let batch = state.store.fetch_latest_candidate_batch()?;
    let results = score_batch(&batch, &state.settings.gate_limits());
    let n = results.len();
    *state.heat.write() = Arc::new(results);
    state.store.upsert_runtime_status(
        "scorer",
        "info",
        "heat batch scored",
        Some(&format!("candidates={n}")),
        now_ts(),
    )?;
    Ok(n)
}

pub fn spawn_heat_refresher(state: Arc<ApiState>) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.settings.heat_refresh_secs.max(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            match refresh_heat(&state) {
                Ok(n) => log::debug!("heat refresh ok candidates={n}"),
                Err(e) => log::warn!("heat refresh failed: {e:#}"),
            }
        }
    })
}

fn internal(e: anyhow::Error) -> StatusCode {
    log::error!("api error: {e:#}");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Deserialize)]
struct LimitQ {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct AccountQ {
    account: Option<String>,
    symbol: Option<String>,
}

impl AccountQ {
    fn account<'a>(&'a self, settings: &'a Settings) -> &'a str {
        self.account.as_deref().unwrap_or(&settings.default_account)
    }
}

async fn api_health(State(state): State<Arc<ApiState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "ts": now_ts(),
        "sqlite_path": state.store.path(),
    }))
}

async fn api_heat(
    State(state): State<Arc<ApiState>>,
    Query(q): Query<LimitQ>,
) -> Json<Vec<HeatResult>> {
    let cached = state.heat.read().clone();
    let limit = q.limit.unwrap_or(cached.len());
    Json(cached.iter().take(limit).cloned().collect())
}

async fn api_equity(
    State(state): State<Arc<ApiState>>,
    Query(q): Query<AccountQ>,
) -> Result<Json<Vec<EquityPoint>>, StatusCode> {
    let account = q.account(&state.settings);
    Ok(Json(equity_points(state.as_ref(), account).map_err(internal)?))
}

fn equity_points(state: &ApiState, account: &str) -> Result<Vec<EquityPoint>> {
    let snapshots = state.store.fetch_cash_snapshots(account)?;
    let holdings = state.store.fetch_holdings(account)?;
    let marks = state.store.fetch_marks()?;
    let orders = state.store.fetch_open_orders(account)?;
    let fallback = state.store.fetch_daily_equity_series(account)?;
    Ok(build_equity_curve(
        &snapshots,
        &holdings,
        &marks,
        pending_buy_notional(&orders),
        &fallback,
        now_ts(),
        state.settings.equity_bucket_secs,
    ))
}

/// Fallback P&L from the raw fill log, plus mark-to-market unrealized.
/// Symbols with no live mark contribute realized and fees but no unrealized.
fn fallback_pnl(
    state: &ApiState,
    account: &str,
    symbol: Option<&str>,
) -> Result<(PnlFigures, JsonValue)> {
    let fills = state.store.fetch_fills(account, symbol)?;
    let marks = state.store.fetch_marks()?;
    let settled = settle_by_symbol(&fills);

    let mut totals = PnlFigures::default();
    let mut per_symbol = serde_json::Map::new();
    let mut symbols: Vec<&String> = settled.keys().collect();
    symbols.sort();
    for sym in symbols {
        let (summary, lot) = &settled[sym.as_str()];
        let unrealized = match marks.get(sym.as_str()) {
            Some(mark) if lot.total_qty > 0.0 => lot.total_qty * mark - lot.total_cost,
            _ => 0.0,
        };
        totals.realized += summary.realized_pnl;
        totals.fees += summary.fees_paid;
        totals.unrealized += unrealized;
        per_symbol.insert(
            sym.to_string(),
            json!({
                "realized": summary.realized_pnl,
                "unrealized": unrealized,
                "fees": summary.fees_paid,
                "qty": lot.total_qty,
                "avg_cost": lot.avg_cost(),
            }),
        );
    }
    Ok((totals, JsonValue::Object(per_symbol)))
}

async fn api_pnl(
    State(state): State<Arc<ApiState>>,
    Query(q): Query<AccountQ>,
) -> Result<Json<JsonValue>, StatusCode> {
    let account = q.account(&state.settings);
    let (fallback, per_symbol) =
        fallback_pnl(state.as_ref(), account, q.symbol.as_deref()).map_err(internal)?;

    // The authoritative daily record is account-wide; a per-symbol query
    // always reports the locally computed figures.
    let (figures, source) = if q.symbol.is_some() {
        (fallback, PnlSource::Fallback)
    } else {
        let daily = state
            .store
            .fetch_latest_daily_pnl(account)
            .map_err(internal)?;
        reconcile(fallback, daily.as_ref())
    };

    let diverged = source == PnlSource::Authoritative
        && ((figures.realized - fallback.realized).abs() > 1e-9
            || (figures.unrealized - fallback.unrealized).abs() > 1e-9);

    Ok(Json(json!({
        "account": account,
        "realized": figures.realized,
        "unrealized": figures.unrealized,
        "fees": figures.fees,
        "source": source,
        "diverged": diverged,
        "fallback": fallback,
        "per_symbol": per_symbol,
    })))
}

async fn api_summary(
    State(state): State<Arc<ApiState>>,
    Query(q): Query<AccountQ>,
) -> Result<Json<JsonValue>, StatusCode> {
    let account = q.account(&state.settings);
    let heat = state.heat.read().clone();
    let top: Vec<&HeatResult> = heat.iter().take(10).collect();
    let equity = equity_points(state.as_ref(), account).map_err(internal)?;
    let (pnl, _) = fallback_pnl(state.as_ref(), account, None).map_err(internal)?;
    let statuses = state.store.fetch_runtime_statuses().map_err(internal)?;

    Ok(Json(json!({
        "account": account,
        "ts": now_ts(),
        "heat_top": top,
        "equity_last": equity.last(),
        "pnl": pnl,
        "components": statuses,
    })))
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/heat", get(api_heat))
        .route("/api/equity", get(api_equity))
        .route("/api/pnl", get(api_pnl))
        .route("/api/summary", get(api_summary))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<ApiState>) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.settings.api_host, state.settings.api_port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("api listening addr={addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
