use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::ledger::Side;

pub const DEFAULT_BUCKET_SECS: f64 = 300.0;

/// One cash-balance observation. Arrives at irregular intervals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CashSnapshot {
    pub taken_at: f64,
    pub buying_power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub asset: String,
    pub qty: f64,
}

/// Broker order still holding cash hostage. Only the status and notional
/// matter here; the rest is carried for the API payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub side: Side,
    pub status: String,
    pub notional: f64,
}

/// One chartable point: bucket-start timestamp + equity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub date: f64,
    pub equity: f64,
}

/// Statuses under which a broker still withholds the order's notional from
/// buying power.
fn is_unsettled(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "open" | "pending" | "submitted" | "partially_filled"
    )
}

/// Sum of buy-side notional across unsettled orders. Money the broker has
/// already deducted from buying_power but which is not yet a holding.
pub fn pending_buy_notional(orders: &[OpenOrder]) -> f64 {
    orders
        .iter()
        .filter(|o| o.side == Side::Buy && is_unsettled(&o.status))
        .map(|o| o.notional)
        .sum()
}

/// Mark-to-market value of current holdings plus in-flight buy notional.
/// Assets with no live mark contribute nothing rather than failing.
pub fn non_cash_value(
    holdings: &[Holding],
    marks: &HashMap<String, f64>,
    pending_buy: f64,
) -> f64 {
    let held: f64 = holdings
        .iter()
        .map(|h| h.qty * marks.get(&h.asset).copied().unwrap_or(0.0))
        .sum();
    held + pending_buy
}

/// Reconstruct the equity series from discrete cash snapshots.
///
/// Snapshots are deduplicated into `bucket_secs` windows (last writer per
/// bucket wins, by actual timestamp). The earliest bucket reports cash
/// alone: it is the pre-trading baseline and deliberately excludes
/// non-cash value so initial deposits are not double-counted as already
/// invested. Every later bucket adds one present-time non-cash figure.
///
/// Known simplification, preserved on purpose: the non-cash component uses
/// *current* marks for every historical point, so only the cash component
/// of earlier points is historically accurate. Downstream charts depend on
/// this shape; do not "correct" it silently.
///
/// With no snapshot history at all, the coarser pre-aggregated daily series
/// is returned verbatim.
pub fn build_equity_curve(
    snapshots: &[CashSnapshot],
    holdings: &[Holding],
    marks: &HashMap<String, f64>,
    pending_buy: f64,
    fallback_daily: &[EquityPoint],
    now: f64,
    bucket_secs: f64,
) -> Vec<EquityPoint> {
    if snapshots.is_empty() {
        return fallback_daily.to_vec();
    }
    let bucket_secs = if bucket_secs > 0.0 {
        bucket_secs
    } else {
        DEFAULT_BUCKET_SECS
    };

    // Last-writer-wins per bucket, keyed by bucket start.
    let mut buckets: BTreeMap<i64, CashSnapshot> = BTreeMap::new();
    for snap in snapshots {
        let key = (snap.taken_at / bucket_secs).floor() as i64;
        match buckets.get(&key) {
            Some(prev) if prev.taken_at >= snap.taken_at => {}
            _ => {
                buckets.insert(key, *snap);
            }
        }
    }

    let ncv = non_cash_value(holdings, marks, pending_buy);

    let mut points = Vec::with_capacity(buckets.len() + 1);
    for (i, (key, snap)) in buckets.iter().enumerate() {
        let date = *key as f64 * bucket_secs;
        let equity = if i == 0 {
            snap.buying_power
        } else {
            snap.buying_power + ncv
        };
        points.push(EquityPoint { date, equity });
    }

    // A single snapshot still renders a two-point line when there is
    // anything invested.
    if points.len() == 1 && ncv > 0.0 {
        let last_cash = buckets.values().next_back().map(|s| s.buying_power).unwrap_or(0.0);
        points.push(EquityPoint {
            date: now,
            equity: last_cash + ncv,
        });
    }

    points
}
