use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::candidate::{Breakdown, CandidateInfo, CandidateRecord};
use crate::equity::{CashSnapshot, EquityPoint, Holding, OpenOrder};
use crate::ledger::{Fill, Side};
use crate::reconcile::DailyPnl;

#[derive(Clone)]
pub struct SqliteStore {
    path: String,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            anyhow::bail!("SQLITE_PATH is empty");
        }
        if path != ":memory:" && !path.starts_with("file:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create sqlite parent dir for {path}"))?;
            }
        }

        // rusqlite::Connection is not Send/Sync; we keep only a path and open
        // short-lived connections per operation. WAL keeps this fast enough
        // for the read-side API and the collaborators' ingest writes.
        Ok(Self {
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn =
            Connection::open(&self.path).with_context(|| format!("open sqlite {}", self.path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(conn)
    }

    pub fn init_db(&self) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS candidates (
  symbol TEXT,
  batch_ts REAL,
  breakdown_json TEXT,
  info_json TEXT,
  PRIMARY KEY (symbol, batch_ts)
);

CREATE INDEX IF NOT EXISTS idx_candidates_batch ON candidates(batch_ts);

CREATE TABLE IF NOT EXISTS fills (
  fill_id TEXT PRIMARY KEY,
  account TEXT,
  symbol TEXT,
  side TEXT,
  qty REAL,
  price REAL,
  fee REAL,
  executed_at REAL
);

CREATE INDEX IF NOT EXISTS idx_fills_account ON fills(account, symbol, executed_at);

CREATE TABLE IF NOT EXISTS cash_snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  account TEXT,
  taken_at REAL,
  buying_power REAL
);

CREATE INDEX IF NOT EXISTS idx_cash_account ON cash_snapshots(account, taken_at);

CREATE TABLE IF NOT EXISTS holdings (
  account TEXT,
  asset TEXT,
  qty REAL,
  updated_ts REAL,
  PRIMARY KEY (account, asset)
);

CREATE TABLE IF NOT EXISTS marks (
  symbol TEXT PRIMARY KEY,
  price REAL,
  ts REAL
);

CREATE TABLE IF NOT EXISTS open_orders (
  order_id TEXT PRIMARY KEY,
  account TEXT,
  symbol TEXT,
  side TEXT,
  status TEXT,
  notional REAL,
  created_ts REAL
);

CREATE INDEX IF NOT EXISTS idx_orders_account ON open_orders(account, status);

CREATE TABLE IF NOT EXISTS daily_pnl (
  account TEXT,
  day TEXT,
  realized REAL,
  unrealized REAL,
  fees REAL,
  equity REAL,
  PRIMARY KEY (account, day)
);

CREATE TABLE IF NOT EXISTS runtime_status (
  component TEXT PRIMARY KEY,
  ts REAL,
  level TEXT,
  message TEXT,
  detail TEXT
);
"#,
        )?;
        Ok(())
    }

    pub fn upsert_runtime_status(
        &self,
        component: &str,
        level: &str,
        message: &str,
        detail: Option<&str>,
        ts: f64,
    ) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO runtime_status(component, ts, level, message, detail)
VALUES(?,?,?,?,?)
ON CONFLICT(component) DO UPDATE SET
  ts=excluded.ts,
  level=excluded.level,
  message=excluded.message,
  detail=excluded.detail
"#,
            params![component, ts, level, message, detail],
        )?;
        Ok(())
    }

    pub fn fetch_runtime_statuses(&self) -> Result<JsonValue> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT component, ts, level, message, detail FROM runtime_status ORDER BY ts DESC")?;
        let mut rows = stmt.query([])?;
        let mut out = serde_json::Map::new();
        while let Some(r) = rows.next()? {
            let component: String = r.get(0)?;
            let ts: f64 = r.get(1)?;
            let level: String = r.get(2)?;
            let message: String = r.get(3)?;
            let detail: Option<String> = r.get(4)?;
            out.insert(
                component.clone(),
                serde_json::json!({
                    "component": component,
                    "ts": ts,
                    "level": level,
                    "message": message,
                    "detail": detail.unwrap_or_default(),
                }),
            );
        }
        Ok(JsonValue::Object(out))
    }

    // ---- Candidate scans (written by the scanner collaborator) ----

    pub fn upsert_candidate(
        &self,
        symbol: &str,
        batch_ts: f64,
        breakdown: &JsonValue,
        info: &JsonValue,
    ) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT OR REPLACE INTO candidates(symbol, batch_ts, breakdown_json, info_json)
VALUES(?,?,?,?)
"#,
            params![
                symbol,
                batch_ts,
                serde_json::to_string(breakdown)?,
                serde_json::to_string(info)?
            ],
        )?;
        Ok(())
    }

    /// The most recent scan cycle: all rows sharing the max batch_ts.
    /// Schema detection happens here, once per record.
    pub fn fetch_latest_candidate_batch(&self) -> Result<Vec<CandidateRecord>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT symbol, batch_ts, breakdown_json, info_json
FROM candidates
WHERE batch_ts = (SELECT MAX(batch_ts) FROM candidates)
ORDER BY symbol ASC
"#,
        )?;
        let mut rows = stmt.query([])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            let symbol: String = r.get(0)?;
            let batch_ts: f64 = r.get(1)?;
            let breakdown_json: String = r.get(2)?;
            let info_json: String = r.get(3)?;
            let raw: JsonValue =
                serde_json::from_str(&breakdown_json).unwrap_or(JsonValue::Null);
            let info: CandidateInfo = serde_json::from_str(&info_json).unwrap_or_default();
            out.push(CandidateRecord {
                symbol,
                breakdown: Breakdown::from_value(&raw),
                info,
                batch_ts,
            });
        }
        Ok(out)
    }

    // ---- Fills (written by the execution-report collaborator) ----

    pub fn insert_fill(&self, account: &str, fill: &Fill, fill_id: Option<&str>) -> Result<String> {
        let id = fill_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT OR REPLACE INTO fills(fill_id, account, symbol, side, qty, price, fee, executed_at)
VALUES(?,?,?,?,?,?,?,?)
"#,
            params![
                id,
                account,
                fill.symbol,
                fill.side.as_str(),
                fill.qty,
                fill.price,
                fill.fee,
                fill.executed_at
            ],
        )?;
        Ok(id)
    }

    pub fn fetch_fills(&self, account: &str, symbol: Option<&str>) -> Result<Vec<Fill>> {
        let conn = self.open_conn()?;
        let (sql, params_vec): (&str, Vec<rusqlite::types::Value>) = match symbol {
            None => (
                r#"
SELECT symbol, side, qty, price, fee, executed_at
FROM fills
WHERE account = ?
ORDER BY executed_at ASC
"#,
                vec![rusqlite::types::Value::Text(account.to_string())],
            ),
            Some(sym) => (
                r#"
SELECT symbol, side, qty, price, fee, executed_at
FROM fills
WHERE account = ? AND symbol = ?
ORDER BY executed_at ASC
"#,
                vec![
                    rusqlite::types::Value::Text(account.to_string()),
                    rusqlite::types::Value::Text(sym.to_string()),
                ],
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params_vec))?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            let side_str: String = r.get(1)?;
            // Rows with an unrecognized side are skipped, not fatal.
            let Some(side) = Side::parse(&side_str) else {
                continue;
            };
            out.push(Fill {
                symbol: r.get(0)?,
                side,
                qty: r.get(2)?,
                price: r.get(3)?,
                fee: r.get(4)?,
                executed_at: r.get(5)?,
            });
        }
        Ok(out)
    }

    // ---- Cash snapshots / holdings / marks / open orders ----

    pub fn insert_cash_snapshot(&self, account: &str, snap: &CashSnapshot) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO cash_snapshots(account, taken_at, buying_power) VALUES(?,?,?)",
            params![account, snap.taken_at, snap.buying_power],
        )?;
        Ok(())
    }

    pub fn fetch_cash_snapshots(&self, account: &str) -> Result<Vec<CashSnapshot>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            "SELECT taken_at, buying_power FROM cash_snapshots WHERE account = ? ORDER BY taken_at ASC",
        )?;
        let mut rows = stmt.query(params![account])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(CashSnapshot {
                taken_at: r.get(0)?,
                buying_power: r.get(1)?,
            });
        }
        Ok(out)
    }

    pub fn upsert_holding(&self, account: &str, asset: &str, qty: f64, ts: f64) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO holdings(account, asset, qty, updated_ts)
VALUES(?,?,?,?)
ON CONFLICT(account, asset) DO UPDATE SET
  qty=excluded.qty,
  updated_ts=excluded.updated_ts
"#,
            params![account, asset, qty, ts],
        )?;
        Ok(())
    }

    pub fn fetch_holdings(&self, account: &str) -> Result<Vec<Holding>> {
        let conn = self.open_conn()?;
        let mut stmt =
            conn.prepare("SELECT asset, qty FROM holdings WHERE account = ? AND qty != 0")?;
        let mut rows = stmt.query(params![account])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(Holding {
                asset: r.get(0)?,
                qty: r.get(1)?,
            });
        }
        Ok(out)
    }

    pub fn upsert_mark(&self, symbol: &str, price: f64, ts: f64) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO marks(symbol, price, ts)
VALUES(?,?,?)
ON CONFLICT(symbol) DO UPDATE SET price=excluded.price, ts=excluded.ts
"#,
            params![symbol, price, ts],
        )?;
        Ok(())
    }

    pub fn fetch_marks(&self) -> Result<HashMap<String, f64>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare("SELECT symbol, price FROM marks")?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(r) = rows.next()? {
            out.insert(r.get::<_, String>(0)?, r.get::<_, f64>(1)?);
        }
        Ok(out)
    }

    pub fn upsert_open_order(
        &self,
        account: &str,
        order: &OpenOrder,
        order_id: Option<&str>,
        created_ts: f64,
    ) -> Result<String> {
        let id = order_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO open_orders(order_id, account, symbol, side, status, notional, created_ts)
VALUES(?,?,?,?,?,?,?)
ON CONFLICT(order_id) DO UPDATE SET
  status=excluded.status,
  notional=excluded.notional
"#,
            params![
                id,
                account,
                order.symbol,
                order.side.as_str(),
                order.status,
                order.notional,
                created_ts
            ],
        )?;
        Ok(id)
    }

    pub fn fetch_open_orders(&self, account: &str) -> Result<Vec<OpenOrder>> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol, side, status, notional FROM open_orders WHERE account = ?")?;
        let mut rows = stmt.query(params![account])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            let side_str: String = r.get(1)?;
            let Some(side) = Side::parse(&side_str) else {
                continue;
            };
            out.push(OpenOrder {
                symbol: r.get(0)?,
                side,
                status: r.get(2)?,
                notional: r.get(3)?,
            });
        }
        Ok(out)
    }

    // ---- Authoritative daily P&L ----

    pub fn upsert_daily_pnl(&self, account: &str, daily: &DailyPnl) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO daily_pnl(account, day, realized, unrealized, fees, equity)
VALUES(?,?,?,?,?,?)
ON CONFLICT(account, day) DO UPDATE SET
  realized=excluded.realized,
  unrealized=excluded.unrealized,
  fees=excluded.fees,
  equity=excluded.equity
"#,
            params![
                account,
                daily.day,
                daily.realized,
                daily.unrealized,
                daily.fees,
                daily.equity
            ],
        )?;
        Ok(())
    }

    pub fn fetch_latest_daily_pnl(&self, account: &str) -> Result<Option<DailyPnl>> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row(
                r#"
SELECT day, realized, unrealized, fees, equity
FROM daily_pnl
WHERE account = ?
ORDER BY day DESC
LIMIT 1
"#,
                params![account],
                |r| {
                    Ok(DailyPnl {
                        day: r.get(0)?,
                        realized: r.get(1)?,
                        unrealized: r.get(2)?,
                        fees: r.get(3)?,
                        equity: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Daily equity series for the equity-curve fallback: one point per day,
    /// timestamped at midnight UTC. Unparseable day strings are skipped.
    pub fn fetch_daily_equity_series(&self, account: &str) -> Result<Vec<EquityPoint>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, equity FROM daily_pnl WHERE account = ? ORDER BY day ASC",
        )?;
        let mut rows = stmt.query(params![account])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            let day: String = r.get(0)?;
            let equity: f64 = r.get(1)?;
            let Ok(date) = NaiveDate::parse_from_str(&day, "%Y-%m-%d") else {
                continue;
            };
            let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
                continue;
            };
            out.push(EquityPoint {
                date: midnight.and_utc().timestamp() as f64,
                equity,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!("heatdesk-test-{}.sqlite", Uuid::new_v4()));
        let store = SqliteStore::new(path.to_str().unwrap()).unwrap();
        store.init_db().unwrap();
        store
    }

    #[test]
    fn candidate_batch_round_trip_keeps_latest_cycle_only() {
        let store = temp_store();
        store
            .upsert_candidate("BTC", 100.0, &json!({"trend": 80.0}), &json!({"rsi": 55.0}))
            .unwrap();
        store
            .upsert_candidate("BTC", 200.0, &json!({"edge_ratio": 2.5}), &json!({}))
            .unwrap();
        store
            .upsert_candidate("ETH", 200.0, &json!({"volume": 50.0}), &json!({}))
            .unwrap();

        let batch = store.fetch_latest_candidate_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|r| r.batch_ts == 200.0));
        assert!(batch.iter().all(|r| r.breakdown.schema_name() == "new"));
        // Ordered by symbol.
        assert_eq!(batch[0].symbol, "BTC");
        assert_eq!(batch[1].symbol, "ETH");
    }

    #[test]
    fn fills_round_trip_per_account_and_symbol() {
        let store = temp_store();
        let f = Fill {
            symbol: "BTC".to_string(),
            side: Side::Buy,
            qty: 1.0,
            price: 100.0,
            fee: 1.0,
            executed_at: 10.0,
        };
        store.insert_fill("alpha", &f, None).unwrap();
        store
            .insert_fill(
                "alpha",
                &Fill {
                    symbol: "ETH".to_string(),
                    side: Side::Sell,
                    qty: 2.0,
                    price: 50.0,
                    fee: 1.0,
                    executed_at: 20.0,
                },
                None,
            )
            .unwrap();
        store.insert_fill("beta", &f, None).unwrap();

        assert_eq!(store.fetch_fills("alpha", None).unwrap().len(), 2);
        let btc = store.fetch_fills("alpha", Some("BTC")).unwrap();
        assert_eq!(btc.len(), 1);
        assert_eq!(btc[0].side, Side::Buy);
        assert_eq!(store.fetch_fills("beta", None).unwrap().len(), 1);
        assert!(store.fetch_fills("gamma", None).unwrap().is_empty());
    }

    #[test]
    fn holdings_marks_and_orders_round_trip() {
        let store = temp_store();
        store.upsert_holding("alpha", "BTC", 0.5, 1.0).unwrap();
        store.upsert_holding("alpha", "ETH", 0.0, 1.0).unwrap(); // flat, filtered
        store.upsert_mark("BTC", 40_000.0, 1.0).unwrap();
        store.upsert_mark("BTC", 41_000.0, 2.0).unwrap(); // upsert wins

        let holdings = store.fetch_holdings("alpha").unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(store.fetch_marks().unwrap()["BTC"], 41_000.0);

        let oid = store
            .upsert_open_order(
                "alpha",
                &OpenOrder {
                    symbol: "BTC".to_string(),
                    side: Side::Buy,
                    status: "open".to_string(),
                    notional: 100.0,
                },
                None,
                1.0,
            )
            .unwrap();
        store
            .upsert_open_order(
                "alpha",
                &OpenOrder {
                    symbol: "BTC".to_string(),
                    side: Side::Buy,
                    status: "filled".to_string(),
                    notional: 100.0,
                },
                Some(&oid),
                1.0,
            )
            .unwrap();
        let orders = store.fetch_open_orders("alpha").unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, "filled");
    }

    #[test]
    fn daily_pnl_latest_and_series() {
        let store = temp_store();
        for (day, realized, equity) in [
            ("2026-08-27", 5.0, 1000.0),
            ("2026-08-28", -2.0, 998.0),
            ("2026-08-26", 1.0, 995.0),
        ] {
            store
                .upsert_daily_pnl(
                    "alpha",
                    &DailyPnl {
                        day: day.to_string(),
                        realized,
                        unrealized: 0.0,
                        fees: 0.1,
                        equity,
                    },
                )
                .unwrap();
        }
        let latest = store.fetch_latest_daily_pnl("alpha").unwrap().unwrap();
        assert_eq!(latest.day, "2026-08-28");

        let series = store.fetch_daily_equity_series("alpha").unwrap();
        assert_eq!(series.len(), 3);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(series[0].equity, 995.0);

        assert!(store.fetch_latest_daily_pnl("other").unwrap().is_none());
    }

    #[test]
    fn cash_snapshots_come_back_ascending() {
        let store = temp_store();
        for (at, bp) in [(300.0, 900.0), (100.0, 1000.0), (200.0, 950.0)] {
            store
                .insert_cash_snapshot(
                    "alpha",
                    &CashSnapshot {
                        taken_at: at,
                        buying_power: bp,
                    },
                )
                .unwrap();
        }
        let snaps = store.fetch_cash_snapshots("alpha").unwrap();
        assert_eq!(snaps.len(), 3);
        assert!(snaps.windows(2).all(|w| w[0].taken_at < w[1].taken_at));
    }
}
