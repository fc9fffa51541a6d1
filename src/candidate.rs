use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Upstream consensus verdict attached to legacy-schema scans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Consensus {
    pub confidence: f64,
    pub gates_passed: u32,
    pub gates_total: u32,
    pub blocked: bool,
    pub block_reasons: Vec<String>,
    pub side: Option<String>,
}

impl Consensus {
    pub fn gate_pass_ratio(&self) -> f64 {
        if self.gates_total == 0 {
            0.0
        } else {
            self.gates_passed as f64 / self.gates_total as f64
        }
    }
}

/// Legacy structured regime verdict (bull/sideways/bear/high_vol + confidence).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeState {
    pub label: String,
    pub confidence: f64,
}

/// The `info` bag shipped alongside every scan, independent of breakdown
/// schema. Every field defaults so partial upstream payloads still score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateInfo {
    pub spread_pct: f64,
    pub volume_24h: f64,
    pub momentum_short: f64,
    pub momentum_medium: f64,
    pub rsi: f64,
    pub macd_hist: f64,
    pub atr_pct: f64,
    pub annualized_vol: f64,
    pub squeeze: bool,
    /// New-schema regime label (trending_up/trending_down/ranging/choppy/unknown).
    pub regime: Option<String>,
    /// Legacy-schema structured regime.
    pub regime_state: Option<RegimeState>,
    pub consensus: Option<Consensus>,
    pub ticks_seen: u32,
    /// New-schema indicator warmup flag. Absent means "not reported",
    /// which is different from Some(false).
    pub warmed_up: Option<bool>,
    pub recommended_side: Option<String>,
    /// Multi-timeframe alignment in [-1, 1] (legacy).
    pub mtf_alignment: f64,
    /// Signed EMA crossover strength (legacy).
    pub ema_cross: f64,
    pub bullish_patterns: u32,
}

/// New-schema pre-scored sub-components. Sub-scores are 0-100 upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewBreakdown {
    pub total_score: f64,
    /// Expected edge as a multiple of round-trip cost. Optional so the gate
    /// can tell "present but below 1.0x" apart from "not reported".
    pub edge_ratio: Option<f64>,
    pub trend: f64,
    pub momentum: f64,
    pub spread: f64,
    pub volume: f64,
    pub mover: f64,
    pub mean_revert: f64,
}

/// Legacy-schema pre-scored sub-components (0-100 each).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyBreakdown {
    pub trend: f64,
    pub momentum: f64,
    pub volatility: f64,
    pub liquidity: f64,
}

/// Closed tagged variant over the two live scanner formats. Detection runs
/// once per candidate; every extractor and the gate evaluator receive the
/// same verdict, so a record is never scored under mixed assumptions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum Breakdown {
    Legacy(LegacyBreakdown),
    New(NewBreakdown),
}

impl Breakdown {
    /// Schema detection: the new scanner always emits at least one of
    /// `edge_ratio`, `mean_revert`, `volume`. Unknown keys are ignored and
    /// missing sub-scores default to 0, so this never fails.
    pub fn from_value(v: &JsonValue) -> Breakdown {
        let is_new = v
            .as_object()
            .map(|o| {
                o.contains_key("edge_ratio")
                    || o.contains_key("mean_revert")
                    || o.contains_key("volume")
            })
            .unwrap_or(false);
        if is_new {
            Breakdown::New(serde_json::from_value(v.clone()).unwrap_or_default())
        } else {
            Breakdown::Legacy(serde_json::from_value(v.clone()).unwrap_or_default())
        }
    }

    pub fn schema_name(&self) -> &'static str {
        match self {
            Breakdown::Legacy(_) => "legacy",
            Breakdown::New(_) => "new",
        }
    }
}

/// One symbol's latest scan. Immutable per cycle; the whole batch shares one
/// batch_ts and is superseded wholesale by the next cycle.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub symbol: String,
    pub breakdown: Breakdown,
    pub info: CandidateInfo,
    pub batch_ts: f64,
}
