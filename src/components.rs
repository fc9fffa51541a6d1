use serde::Serialize;

use crate::candidate::{Breakdown, CandidateInfo, LegacyBreakdown, NewBreakdown};
use crate::utils::clamp01;

/// One scoring dimension: a bounded value plus the justification the
/// dashboard surfaces for audit. The reason is a hard contract: every
/// extractor returns a non-empty string explaining where the value landed.
#[derive(Debug, Clone, Serialize)]
pub struct Component {
    pub value: f64,
    pub reason: String,
}

impl Component {
    fn new(value: f64, reason: String) -> Self {
        Self {
            value: clamp01(value),
            reason,
        }
    }
}

/// The seven sub-scores, each in [0,1]. Derived per request, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponents {
    pub bounce_prob: f64,
    pub trend_support_proximity: f64,
    pub regime_ok: f64,
    pub funding_ok: f64,
    pub volatility_ok: f64,
    pub liquidity_ok: f64,
    pub hype_ok: f64,
}

/// Upstream sub-scores arrive 0-100; extractors work in [0,1].
fn norm(sub_score: f64) -> f64 {
    clamp01(sub_score / 100.0)
}

pub fn bounce_prob(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    match breakdown {
        Breakdown::New(b) => bounce_prob_new(b),
        Breakdown::Legacy(b) => bounce_prob_legacy(info, b),
    }
}

fn bounce_prob_new(b: &NewBreakdown) -> Component {
    let edge = b.edge_ratio.unwrap_or(0.0);
    // Cap the edge contribution at 5x cost; below 2x the setup is not
    // cost-positive and the whole blend is heavily discounted.
    let edge_n = clamp01(edge / 5.0);
    let blended = 0.5 * norm(b.total_score) + 0.5 * edge_n;
    if edge >= 2.0 {
        Component::new(
            blended,
            format!(
                "total {:.0}/100 blended 50/50 with edge {:.1}x (cost-positive)",
                b.total_score, edge
            ),
        )
    } else {
        Component::new(
            blended * 0.4,
            format!(
                "edge {:.1}x below 2.0x cost threshold, discounted to 40%",
                edge
            ),
        )
    }
}

fn bounce_prob_legacy(info: &CandidateInfo, b: &LegacyBreakdown) -> Component {
    match &info.consensus {
        Some(c) => {
            let ratio = c.gate_pass_ratio();
            Component::new(
                0.6 * clamp01(c.confidence) + 0.4 * ratio,
                format!(
                    "consensus confidence {:.2} (60%) + gate pass {}/{} (40%)",
                    c.confidence, c.gates_passed, c.gates_total
                ),
            )
        }
        None => {
            let composite = (b.liquidity + b.momentum + b.volatility + b.trend) / 400.0;
            Component::new(
                clamp01(composite),
                format!(
                    "no consensus, composite of liq/mom/vol/trend sub-scores = {:.2}",
                    composite
                ),
            )
        }
    }
}

pub fn trend_support_proximity(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    match breakdown {
        Breakdown::New(b) => {
            let trending = matches!(
                info.regime.as_deref(),
                Some("trending_up") | Some("trending_down")
            );
            let boost = if trending { 0.3 } else { 0.0 };
            let v = 0.45 * norm(b.trend) + 0.30 * norm(b.momentum) + boost;
            Component::new(
                v,
                format!(
                    "trend {:.0} (45%) + momentum {:.0} (30%){}",
                    b.trend,
                    b.momentum,
                    if trending { " + trending-regime boost 0.3" } else { "" }
                ),
            )
        }
        Breakdown::Legacy(b) => {
            // Alignment remaps [-1,1] -> [0,1]. Positive EMA crossovers are
            // rewarded super-linearly; negative ones only penalized mildly.
            let align = clamp01((info.mtf_alignment + 1.0) / 2.0);
            let e = info.ema_cross;
            let cross = if e > 0.0 {
                0.5 + 0.5 * e.min(1.0).sqrt()
            } else if e < 0.0 {
                0.5 - 0.25 * (-e).min(1.0)
            } else {
                0.5
            };
            let v = 0.45 * norm(b.trend) + 0.35 * align + 0.20 * cross;
            Component::new(
                v,
                format!(
                    "trend {:.0} (45%) + mtf align {:.2} (35%) + ema cross {:.2} (20%)",
                    b.trend, info.mtf_alignment, e
                ),
            )
        }
    }
}

pub fn regime_ok(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    match breakdown {
        Breakdown::New(_) => {
            let (v, label) = match info.regime.as_deref() {
                Some("trending_up") => (0.9, "trending_up"),
                Some("trending_down") => (0.85, "trending_down"),
                Some("ranging") => (0.5, "ranging"),
                Some("choppy") => (0.15, "choppy"),
                Some("unknown") => (0.3, "unknown"),
                Some(other) => return Component::new(0.5, format!("unrecognized regime '{other}', neutral 0.5")),
                None => (0.5, "unreported"),
            };
            Component::new(v, format!("regime {label} -> {v:.2}"))
        }
        Breakdown::Legacy(_) => match &info.regime_state {
            Some(rs) => {
                let base = match rs.label.as_str() {
                    "bull" => 0.9,
                    "sideways" => 0.5,
                    "bear" => 0.25,
                    "high_vol" => 0.2,
                    _ => 0.5,
                };
                // Low confidence pulls the verdict back toward neutral.
                let v = 0.5 + (base - 0.5) * clamp01(rs.confidence);
                Component::new(
                    v,
                    format!(
                        "regime {} at confidence {:.2} -> {:.2}",
                        rs.label, rs.confidence, v
                    ),
                )
            }
            None => Component::new(0.5, "no regime data, neutral 0.5".to_string()),
        },
    }
}

pub fn funding_ok(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    match breakdown {
        Breakdown::New(_) => {
            let side = info.recommended_side.as_deref();
            let Some(side) = side else {
                return Component::new(0.5, "no recommended side, neutral 0.5".to_string());
            };
            let long = side.eq_ignore_ascii_case("long") || side.eq_ignore_ascii_case("buy");
            let aligned = (long && info.macd_hist > 0.0) || (!long && info.macd_hist < 0.0);
            let mut v = if aligned { 0.75 } else { 0.35 };
            // RSI positioning: mid-range supports entry, extremes argue
            // the move is already spent.
            let rsi = info.rsi;
            if long {
                if (40.0..=65.0).contains(&rsi) {
                    v += 0.15;
                } else if rsi > 75.0 {
                    v -= 0.15;
                }
            } else if (35.0..=60.0).contains(&rsi) {
                v += 0.15;
            } else if rsi < 25.0 {
                v -= 0.15;
            }
            Component::new(
                v,
                format!(
                    "macd hist {:.3} {} {} side, rsi {:.0}",
                    info.macd_hist,
                    if aligned { "confirms" } else { "contradicts" },
                    side,
                    rsi
                ),
            )
        }
        Breakdown::Legacy(_) => {
            let s = info.momentum_short;
            let m = info.momentum_medium;
            if s == 0.0 && m == 0.0 {
                return Component::new(0.5, "momentum flat on both horizons, neutral 0.5".to_string());
            }
            if s.signum() == m.signum() {
                let magnitude = 0.5 * (s.abs() + m.abs());
                let v = 0.6 + (magnitude * 10.0).min(0.3);
                Component::new(
                    v,
                    format!(
                        "short/medium momentum agree ({:.3}/{:.3}), magnitude bonus",
                        s, m
                    ),
                )
            } else {
                Component::new(
                    0.35,
                    format!("short/medium momentum disagree ({:.3}/{:.3})", s, m),
                )
            }
        }
    }
}

pub fn volatility_ok(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    // Same design intent under both schemas: score falls as volatility rises,
    // in discrete bands, with a bonus for detected compression.
    let (vol, bands, proxy) = match breakdown {
        Breakdown::New(_) => (
            info.atr_pct,
            [(1.0, 0.85), (2.5, 0.7), (5.0, 0.5), (8.0, 0.3)],
            "atr",
        ),
        Breakdown::Legacy(_) => (
            info.annualized_vol,
            [(0.5, 0.85), (1.0, 0.7), (1.5, 0.5), (2.5, 0.3)],
            "ann_vol",
        ),
    };
    let mut v = 0.15;
    for (ceiling, score) in bands {
        if vol < ceiling {
            v = score;
            break;
        }
    }
    if info.squeeze {
        v += 0.15;
    }
    Component::new(
        v,
        format!(
            "{proxy} {:.2} -> band {:.2}{}",
            vol,
            v,
            if info.squeeze { " (squeeze bonus +0.15)" } else { "" }
        ),
    )
}

pub fn liquidity_ok(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    match breakdown {
        Breakdown::New(b) => Component::new(
            0.5 * norm(b.spread) + 0.5 * norm(b.volume),
            format!(
                "spread sub-score {:.0} and size/volume sub-score {:.0}, blended 50/50",
                b.spread, b.volume
            ),
        ),
        Breakdown::Legacy(b) => {
            let spread_band = if info.spread_pct <= 0.1 {
                1.0
            } else if info.spread_pct <= 0.25 {
                0.75
            } else if info.spread_pct <= 0.5 {
                0.5
            } else if info.spread_pct <= 1.0 {
                0.25
            } else {
                0.1
            };
            Component::new(
                0.6 * norm(b.liquidity) + 0.4 * spread_band,
                format!(
                    "liquidity sub-score {:.0} (60%) + spread {:.2}% band {:.2} (40%)",
                    b.liquidity, info.spread_pct, spread_band
                ),
            )
        }
    }
}

pub fn hype_ok(info: &CandidateInfo, breakdown: &Breakdown) -> Component {
    match breakdown {
        Breakdown::New(b) => Component::new(
            0.6 * norm(b.mover) + 0.4 * norm(b.mean_revert),
            format!(
                "mover {:.0} (60%) + mean-reversion {:.0} (40%)",
                b.mover, b.mean_revert
            ),
        ),
        Breakdown::Legacy(b) => {
            let patterns = clamp01(info.bullish_patterns as f64 / 3.0);
            Component::new(
                0.5 * patterns + 0.5 * norm(b.momentum),
                format!(
                    "{} bullish pattern(s) + momentum sub-score {:.0}",
                    info.bullish_patterns, b.momentum
                ),
            )
        }
    }
}
