use serde::{Deserialize, Serialize};

/// P&L triple as shown on the reconciliation surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlFigures {
    pub realized: f64,
    pub unrealized: f64,
    pub fees: f64,
}

/// Authoritative pre-aggregated daily record, persisted upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPnl {
    pub day: String,
    pub realized: f64,
    pub unrealized: f64,
    pub fees: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlSource {
    Authoritative,
    Fallback,
}

/// Pick between the authoritative daily record and the locally computed
/// fallback. The authoritative source wins whenever it has signal (non-zero
/// realized or unrealized), so two independently computed numbers never
/// silently disagree on the surface.
pub fn reconcile(
    fallback: PnlFigures,
    authoritative: Option<&DailyPnl>,
) -> (PnlFigures, PnlSource) {
    match authoritative {
        Some(d) if d.realized != 0.0 || d.unrealized != 0.0 => (
            PnlFigures {
                realized: d.realized,
                unrealized: d.unrealized,
                fees: d.fees,
            },
            PnlSource::Authoritative,
        ),
        _ => (fallback, PnlSource::Fallback),
    }
}
