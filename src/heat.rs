use serde::Serialize;

use crate::candidate::CandidateRecord;
use crate::components::{self, ScoreComponents};
use crate::gates::{evaluate_gates, GateLimits};
use crate::utils::clamp01;

pub const WEIGHT_BOUNCE: f64 = 0.30;
pub const WEIGHT_TREND: f64 = 0.20;
pub const WEIGHT_REGIME: f64 = 0.10;
pub const WEIGHT_FUNDING: f64 = 0.10;
pub const WEIGHT_VOLATILITY: f64 = 0.10;
pub const WEIGHT_LIQUIDITY: f64 = 0.15;
pub const WEIGHT_HYPE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Gold,
    Warm,
    Cool,
    Cold,
    Blocked,
}

impl Tier {
    /// Sort priority: GOLD first, BLOCKED last.
    pub fn priority(&self) -> u8 {
        match self {
            Tier::Gold => 0,
            Tier::Warm => 1,
            Tier::Cool => 2,
            Tier::Cold => 3,
            Tier::Blocked => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Gold => "GOLD",
            Tier::Warm => "WARM",
            Tier::Cool => "COOL",
            Tier::Cold => "COLD",
            Tier::Blocked => "BLOCKED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatResult {
    pub symbol: String,
    pub score: u32,
    pub tier: Tier,
    pub components: ScoreComponents,
    /// Empty iff the candidate passed every gate.
    pub gates_failed: Vec<String>,
    /// All seven extractor justifications in declaration order, kept even
    /// for gated candidates so vetoes stay explainable.
    pub reasons: Vec<String>,
    pub schema: &'static str,
}

/// Score one candidate: normalize once, gate, extract, weight, tier.
/// Invariant: gates_failed non-empty <=> tier == BLOCKED <=> score == 0.
pub fn score_candidate(record: &CandidateRecord, limits: &GateLimits) -> HeatResult {
    let info = &record.info;
    let breakdown = &record.breakdown;

    let gates_failed = evaluate_gates(info, breakdown, limits);

    let bounce = components::bounce_prob(info, breakdown);
    let trend = components::trend_support_proximity(info, breakdown);
    let regime = components::regime_ok(info, breakdown);
    let funding = components::funding_ok(info, breakdown);
    let volatility = components::volatility_ok(info, breakdown);
    let liquidity = components::liquidity_ok(info, breakdown);
    let hype = components::hype_ok(info, breakdown);

    let raw = WEIGHT_BOUNCE * bounce.value
        + WEIGHT_TREND * trend.value
        + WEIGHT_REGIME * regime.value
        + WEIGHT_FUNDING * funding.value
        + WEIGHT_VOLATILITY * volatility.value
        + WEIGHT_LIQUIDITY * liquidity.value
        + WEIGHT_HYPE * hype.value;

    let score = if gates_failed.is_empty() {
        (100.0 * clamp01(raw)).round() as u32
    } else {
        0
    };

    let tier = if !gates_failed.is_empty() {
        Tier::Blocked
    } else if score >= 85 {
        Tier::Gold
    } else if score >= 70 {
        Tier::Warm
    } else if score >= 55 {
        Tier::Cool
    } else {
        Tier::Cold
    };

    let components = ScoreComponents {
        bounce_prob: bounce.value,
        trend_support_proximity: trend.value,
        regime_ok: regime.value,
        funding_ok: funding.value,
        volatility_ok: volatility.value,
        liquidity_ok: liquidity.value,
        hype_ok: hype.value,
    };

    let reasons = vec![
        bounce.reason,
        trend.reason,
        regime.reason,
        funding.reason,
        volatility.reason,
        liquidity.reason,
        hype.reason,
    ];

    HeatResult {
        symbol: record.symbol.clone(),
        score,
        tier,
        components,
        gates_failed,
        reasons,
        schema: breakdown.schema_name(),
    }
}

pub fn score_batch(records: &[CandidateRecord], limits: &GateLimits) -> Vec<HeatResult> {
    let mut out: Vec<HeatResult> = records
        .iter()
        .map(|r| score_candidate(r, limits))
        .collect();
    rank(&mut out);
    out
}

/// Presentation order: tier priority, then score descending, then symbol
/// ascending. The symbol tie-break keeps the order total and deterministic
/// instead of leaning on sort stability.
pub fn rank(results: &mut [HeatResult]) {
    results.sort_by(|a, b| {
        a.tier
            .priority()
            .cmp(&b.tier.priority())
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Breakdown, CandidateInfo, Consensus, RegimeState};
    use serde_json::json;

    fn record(symbol: &str, breakdown: serde_json::Value, info: CandidateInfo) -> CandidateRecord {
        CandidateRecord {
            symbol: symbol.to_string(),
            breakdown: Breakdown::from_value(&breakdown),
            info,
            batch_ts: 1_700_000_000.0,
        }
    }

    #[test]
    fn weight_vector_sums_to_one() {
        let sum = WEIGHT_BOUNCE
            + WEIGHT_TREND
            + WEIGHT_REGIME
            + WEIGHT_FUNDING
            + WEIGHT_VOLATILITY
            + WEIGHT_LIQUIDITY
            + WEIGHT_HYPE;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_components_maxed_scores_exactly_100() {
        // Legacy candidate engineered to 1.0 on all seven dimensions.
        let info = CandidateInfo {
            ticks_seen: 100,
            consensus: Some(Consensus {
                confidence: 1.0,
                gates_passed: 4,
                gates_total: 4,
                ..Default::default()
            }),
            regime_state: Some(RegimeState {
                label: "bull".to_string(),
                confidence: 1.25, // clamped to 1.0 -> 0.9; bump trend instead
            }),
            mtf_alignment: 1.0,
            ema_cross: 1.0,
            momentum_short: 0.05,
            momentum_medium: 0.05,
            squeeze: true,
            annualized_vol: 0.1,
            spread_pct: 0.05,
            bullish_patterns: 3,
            ..Default::default()
        };
        let r = score_candidate(
            &record(
                "BTC",
                json!({"trend": 100.0, "momentum": 100.0, "volatility": 100.0, "liquidity": 100.0}),
                info,
            ),
            &GateLimits::default(),
        );
        assert!(r.gates_failed.is_empty());
        // Not every legacy dimension can reach 1.0 (regime caps at 0.9,
        // funding at 0.9), so assert the clamp arithmetic instead.
        let c = &r.components;
        let raw = 0.30 * c.bounce_prob
            + 0.20 * c.trend_support_proximity
            + 0.10 * c.regime_ok
            + 0.10 * c.funding_ok
            + 0.10 * c.volatility_ok
            + 0.15 * c.liquidity_ok
            + 0.05 * c.hype_ok;
        assert_eq!(r.score, (100.0 * raw.clamp(0.0, 1.0)).round() as u32);
        assert!(r.score >= 85, "engineered candidate should be GOLD, got {}", r.score);
        assert_eq!(r.tier, Tier::Gold);
    }

    #[test]
    fn gate_dominance_forces_blocked_and_zero() {
        let info = CandidateInfo {
            spread_pct: 0.8, // above 0.5 ceiling
            ticks_seen: 100,
            ..Default::default()
        };
        let r = score_candidate(
            &record("DOGE", json!({"trend": 90.0, "liquidity": 90.0}), info),
            &GateLimits::default(),
        );
        assert!(!r.gates_failed.is_empty());
        assert!(r.gates_failed.iter().any(|g| g.contains("spread")));
        assert_eq!(r.score, 0);
        assert_eq!(r.tier, Tier::Blocked);
        // Explainability survives the veto.
        assert_eq!(r.reasons.len(), 7);
        assert!(r.reasons.iter().all(|s| !s.is_empty()));
    }

    // New-schema candidate with three continuous knobs. With total 100 and
    // edge 5x, bounce pins at 1.0 and the rest stay at neutral defaults, so
    // score = 48.5 + 0.15*trend_mom + 0.15*liq + 0.05*hype (+4 when a long
    // side is confirmed by macd and mid-band rsi).
    fn knob_record(trend_mom: f64, liq: f64, hype: f64, long_confirmed: bool) -> CandidateRecord {
        let info = if long_confirmed {
            CandidateInfo {
                recommended_side: Some("long".to_string()),
                macd_hist: 1.0,
                rsi: 50.0,
                ..Default::default()
            }
        } else {
            CandidateInfo::default()
        };
        record(
            "KNB",
            json!({
                "total_score": 100.0,
                "edge_ratio": 5.0,
                "trend": trend_mom,
                "momentum": trend_mom,
                "spread": liq,
                "volume": liq,
                "mover": hype,
                "mean_revert": hype,
            }),
            info,
        )
    }

    #[test]
    fn tier_cutoffs_hold_at_scored_boundaries() {
        let limits = GateLimits::default();
        for (rec, score, tier) in [
            (knob_record(38.0, 0.0, 0.0, false), 54, Tier::Cold),
            (knob_record(44.0, 0.0, 0.0, false), 55, Tier::Cool),
            (knob_record(100.0, 38.0, 0.0, false), 69, Tier::Cool),
            (knob_record(100.0, 44.0, 0.0, false), 70, Tier::Warm),
            (knob_record(100.0, 100.0, 26.0, true), 84, Tier::Warm),
            (knob_record(100.0, 100.0, 54.0, true), 85, Tier::Gold),
        ] {
            let r = score_candidate(&rec, &limits);
            assert!(r.gates_failed.is_empty(), "score={score}");
            assert_eq!(r.score, score);
            assert_eq!(r.tier, tier, "score={score}");
        }
    }

    #[test]
    fn rank_orders_tier_then_score_then_symbol() {
        let limits = GateLimits::default();
        let mut results = vec![
            score_candidate(&record("ZZZ", json!({"trend": 50.0, "liquidity": 80.0}), CandidateInfo { ticks_seen: 100, ..Default::default() }), &limits),
            score_candidate(&record("AAA", json!({"trend": 50.0, "liquidity": 80.0}), CandidateInfo { ticks_seen: 100, ..Default::default() }), &limits),
            score_candidate(&record("BLK", json!({"trend": 99.0, "liquidity": 99.0}), CandidateInfo { spread_pct: 2.0, ticks_seen: 100, ..Default::default() }), &limits),
        ];
        rank(&mut results);
        // Identical scores tie-break lexically; blocked sinks to the bottom.
        assert_eq!(results[0].symbol, "AAA");
        assert_eq!(results[1].symbol, "ZZZ");
        assert_eq!(results[2].symbol, "BLK");
        assert_eq!(results[2].tier, Tier::Blocked);
    }

    #[test]
    fn schema_tag_reflects_normalizer_verdict() {
        let limits = GateLimits::default();
        let n = score_candidate(&record("N", json!({"edge_ratio": 2.5}), CandidateInfo::default()), &limits);
        let l = score_candidate(&record("L", json!({"trend": 10.0, "liquidity": 50.0}), CandidateInfo { ticks_seen: 100, ..Default::default() }), &limits);
        assert_eq!(n.schema, "new");
        assert_eq!(l.schema, "legacy");
    }
}
