use serde::{Deserialize, Serialize};

use crate::candidate::{Breakdown, CandidateInfo};

/// Hard-veto thresholds. The original baked these in; here they ride on
/// Settings so an operator can tune them without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateLimits {
    /// Absolute spread ceiling, percent of mid (both schemas).
    pub spread_ceiling_pct: f64,
    /// Annualized volatility ceiling (legacy schema only).
    pub vol_ceiling: f64,
    /// Liquidity sub-score floor in [0,1] (legacy schema only).
    pub liquidity_floor: f64,
    /// Minimum ticks seen before a candidate is considered fresh (legacy).
    pub tick_floor: u32,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            spread_ceiling_pct: 0.5,
            vol_ceiling: 1.5,
            liquidity_floor: 0.3,
            tick_floor: 20,
        }
    }
}

/// Hard veto checks, evaluated before and independently of weighting.
/// Returns one human-readable reason per failed check, in declaration order.
/// Any non-empty result forces the candidate to BLOCKED (see heat scorer).
pub fn evaluate_gates(
    info: &CandidateInfo,
    breakdown: &Breakdown,
    limits: &GateLimits,
) -> Vec<String> {
    let mut failed = Vec::new();

    if info.spread_pct > limits.spread_ceiling_pct {
        failed.push(format!(
            "spread {:.2}% above {:.2}% ceiling",
            info.spread_pct, limits.spread_ceiling_pct
        ));
    }

    match breakdown {
        Breakdown::Legacy(b) => {
            if info.annualized_vol > limits.vol_ceiling {
                failed.push(format!(
                    "annualized vol {:.2} above {:.2} ceiling",
                    info.annualized_vol, limits.vol_ceiling
                ));
            }
            if b.liquidity / 100.0 < limits.liquidity_floor {
                failed.push(format!(
                    "liquidity sub-score {:.2} below {:.2} floor",
                    b.liquidity / 100.0,
                    limits.liquidity_floor
                ));
            }
            if info.ticks_seen < limits.tick_floor {
                failed.push(format!(
                    "only {} ticks seen, need {}",
                    info.ticks_seen, limits.tick_floor
                ));
            }
            if let Some(c) = &info.consensus {
                if c.blocked {
                    if c.block_reasons.is_empty() {
                        failed.push("consensus blocked".to_string());
                    } else {
                        // Upstream block reasons pass through verbatim.
                        failed.extend(c.block_reasons.iter().cloned());
                    }
                }
            }
        }
        Breakdown::New(b) => {
            if info.regime.as_deref() == Some("choppy") {
                failed.push("regime choppy".to_string());
            }
            // Only an explicit false fails; an absent flag is not a veto.
            if info.warmed_up == Some(false) {
                failed.push("indicators not warmed up".to_string());
            }
            if let Some(edge) = b.edge_ratio {
                if edge < 1.0 {
                    failed.push(format!("edge {:.2}x below 1.0x cost", edge));
                }
            }
        }
    }

    failed
}
