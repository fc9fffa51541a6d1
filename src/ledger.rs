use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }

    /// Settlement order at equal timestamps: buys apply first, so a
    /// same-instant sell realizes against the refreshed basis.
    fn settle_rank(&self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

/// Immutable execution record. Append-only upstream; never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub fee: f64,
    pub executed_at: f64,
}

/// Moving weighted-average cost lot for one symbol. total_qty never goes
/// negative: when a sell takes it to <= 0 both fields hard-reset to 0,
/// absorbing rounding drift instead of propagating negative inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostLot {
    pub total_cost: f64,
    pub total_qty: f64,
}

impl CostLot {
    pub fn avg_cost(&self) -> f64 {
        if self.total_qty > 0.0 {
            self.total_cost / self.total_qty
        } else {
            0.0
        }
    }

    /// Apply one fill and return the realized P&L delta.
    ///
    /// Buys capitalize the fee into the basis (they raise the effective
    /// average entry price). Sells realize against the live average cost.
    /// A sell with no tracked basis books the full proceeds minus fee as
    /// gain. That overstates P&L for positions whose acquisition fills
    /// predate the ledger; downstream totals rely on this shape.
    pub fn apply(&mut self, fill: &Fill) -> f64 {
        match fill.side {
            Side::Buy => {
                self.total_cost += fill.qty * fill.price + fill.fee;
                self.total_qty += fill.qty;
                0.0
            }
            Side::Sell => {
                if self.total_qty > 0.0 {
                    let avg = self.total_cost / self.total_qty;
                    let realized = fill.qty * fill.price - fill.fee - fill.qty * avg;
                    self.total_cost -= fill.qty * avg;
                    self.total_qty -= fill.qty;
                    if self.total_qty <= 0.0 {
                        self.total_cost = 0.0;
                        self.total_qty = 0.0;
                    }
                    realized
                } else {
                    fill.qty * fill.price - fill.fee
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LedgerSummary {
    pub realized_pnl: f64,
    pub fees_paid: f64,
}

/// Settle one symbol-scope's fills into realized P&L and total fees.
/// Pure function of the full fill set: fills are re-sorted by executed_at
/// (ties broken buys-first) internally, so caller order does not matter
/// and re-runs are idempotent even when timestamps collide.
pub fn settle_fills(fills: &[Fill]) -> (LedgerSummary, CostLot) {
    let mut ordered: Vec<&Fill> = fills.iter().collect();
    ordered.sort_by(|a, b| {
        a.executed_at
            .partial_cmp(&b.executed_at)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.side.settle_rank().cmp(&b.side.settle_rank()))
    });

    let mut lot = CostLot::default();
    let mut summary = LedgerSummary::default();
    for fill in ordered {
        summary.fees_paid += fill.fee;
        summary.realized_pnl += lot.apply(fill);
    }
    (summary, lot)
}

/// Settle a mixed-symbol fill set: each symbol gets its own independent lot.
pub fn settle_by_symbol(fills: &[Fill]) -> HashMap<String, (LedgerSummary, CostLot)> {
    let mut by_symbol: HashMap<&str, Vec<Fill>> = HashMap::new();
    for f in fills {
        by_symbol.entry(f.symbol.as_str()).or_default().push(f.clone());
    }
    by_symbol
        .into_iter()
        .map(|(sym, fs)| (sym.to_string(), settle_fills(&fs)))
        .collect()
}

/// Portfolio totals: symbols are independent lots, summed.
pub fn settle_portfolio(fills: &[Fill]) -> LedgerSummary {
    settle_by_symbol(fills)
        .values()
        .fold(LedgerSummary::default(), |mut acc, (s, _)| {
            acc.realized_pnl += s.realized_pnl;
            acc.fees_paid += s.fees_paid;
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(symbol: &str, side: Side, qty: f64, price: f64, fee: f64, at: f64) -> Fill {
        Fill {
            symbol: symbol.to_string(),
            side,
            qty,
            price,
            fee,
            executed_at: at,
        }
    }

    #[test]
    fn buy_then_partial_sell_scenario() {
        // buy 1.0 BTC @ 100 fee 1 -> avg 101; sell 0.5 @ 120 fee 0.5
        // realized = 60 - 0.5 - 50.5 = 9.0; fees = 1.5
        let fills = vec![
            fill("BTC", Side::Buy, 1.0, 100.0, 1.0, 10.0),
            fill("BTC", Side::Sell, 0.5, 120.0, 0.5, 20.0),
        ];
        let (s, lot) = settle_fills(&fills);
        assert!((s.realized_pnl - 9.0).abs() < 1e-9);
        assert!((s.fees_paid - 1.5).abs() < 1e-9);
        assert!((lot.avg_cost() - 101.0).abs() < 1e-9);
        assert!((lot.total_qty - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fee_is_capitalized_into_basis() {
        let mut lot = CostLot::default();
        lot.apply(&fill("BTC", Side::Buy, 1.0, 100.0, 1.0, 1.0));
        assert!((lot.avg_cost() - 101.0).abs() < 1e-9);
    }

    #[test]
    fn sell_without_basis_books_full_proceeds() {
        // sell 2 ETH @ 50 fee 1 -> realized 99, lot stays {0,0}
        let fills = vec![fill("ETH", Side::Sell, 2.0, 50.0, 1.0, 5.0)];
        let (s, lot) = settle_fills(&fills);
        assert!((s.realized_pnl - 99.0).abs() < 1e-9);
        assert_eq!(lot, CostLot::default());
    }

    #[test]
    fn equal_timestamp_fills_settle_deterministically() {
        // Sell and buy share executed_at; the buy must apply first under
        // either input order, so the sell realizes against its basis
        // instead of booking bare proceeds.
        let forward = vec![
            fill("BTC", Side::Sell, 1.0, 100.0, 0.0, 1.0),
            fill("BTC", Side::Buy, 1.0, 50.0, 0.0, 1.0),
        ];
        let reversed: Vec<Fill> = forward.iter().rev().cloned().collect();

        let (a, lot_a) = settle_fills(&forward);
        let (b, lot_b) = settle_fills(&reversed);
        assert_eq!(a.realized_pnl, b.realized_pnl);
        assert_eq!(lot_a, lot_b);
        // buy 1 @ 50, then sell 1 @ 100 -> realized 50, lot flat
        assert!((a.realized_pnl - 50.0).abs() < 1e-9);
        assert_eq!(lot_a, CostLot::default());
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = vec![
            fill("SOL", Side::Buy, 2.0, 10.0, 0.2, 1.0),
            fill("SOL", Side::Sell, 1.0, 14.0, 0.1, 2.0),
            fill("SOL", Side::Buy, 1.0, 20.0, 0.1, 3.0),
            fill("SOL", Side::Sell, 1.5, 18.0, 0.1, 4.0),
        ];
        let mut b = a.clone();
        b.reverse();
        b.swap(0, 2);
        let (sa, la) = settle_fills(&a);
        let (sb, lb) = settle_fills(&b);
        assert!((sa.realized_pnl - sb.realized_pnl).abs() < 1e-9);
        assert!((sa.fees_paid - sb.fees_paid).abs() < 1e-9);
        assert!((la.total_qty - lb.total_qty).abs() < 1e-9);
    }

    #[test]
    fn lot_quantity_never_goes_negative() {
        let fills = vec![
            fill("X", Side::Buy, 1.0, 100.0, 0.0, 1.0),
            fill("X", Side::Sell, 3.0, 110.0, 0.0, 2.0), // oversell
            fill("X", Side::Sell, 1.0, 120.0, 0.0, 3.0), // sell while flat
        ];
        let mut ordered = fills.clone();
        ordered.sort_by(|a, b| a.executed_at.partial_cmp(&b.executed_at).unwrap());
        let mut lot = CostLot::default();
        for f in &ordered {
            lot.apply(f);
            assert!(lot.total_qty >= 0.0, "after fill at {}", f.executed_at);
        }
        assert_eq!(lot, CostLot::default());
    }

    #[test]
    fn average_cost_moves_only_with_intervening_buys() {
        // Two sells at different times see different avg costs only because
        // a buy changed the blend in between, not because of lot ordering.
        let fills = vec![
            fill("ADA", Side::Buy, 10.0, 1.0, 0.0, 1.0),
            fill("ADA", Side::Sell, 5.0, 2.0, 0.0, 2.0), // avg 1.0
            fill("ADA", Side::Buy, 5.0, 3.0, 0.0, 3.0),  // blend -> (5+15)/10 = 2.0
            fill("ADA", Side::Sell, 5.0, 2.0, 0.0, 4.0), // avg 2.0, realized 0
        ];
        let (s, lot) = settle_fills(&fills);
        // first sell: 10 - 5 = 5; second sell: 10 - 10 = 0
        assert!((s.realized_pnl - 5.0).abs() < 1e-9);
        assert!((lot.avg_cost() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn symbols_settle_independently_and_sum() {
        let fills = vec![
            fill("BTC", Side::Buy, 1.0, 100.0, 1.0, 1.0),
            fill("BTC", Side::Sell, 0.5, 120.0, 0.5, 2.0),
            fill("ETH", Side::Sell, 2.0, 50.0, 1.0, 3.0),
        ];
        let per = settle_by_symbol(&fills);
        assert!((per["BTC"].0.realized_pnl - 9.0).abs() < 1e-9);
        assert!((per["ETH"].0.realized_pnl - 99.0).abs() < 1e-9);
        let total = settle_portfolio(&fills);
        assert!((total.realized_pnl - 108.0).abs() < 1e-9);
        assert!((total.fees_paid - 2.5).abs() < 1e-9);
    }
}
