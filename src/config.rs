use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::gates::GateLimits;

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<f64>()
            .map_err(|e| anyhow!("{key} invalid float: {e}"))?),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Storage
    pub sqlite_path: String,

    // Read-side API
    pub api_host: String,
    pub api_port: u16,

    // Scoring
    pub gate_spread_ceiling_pct: f64,
    pub gate_vol_ceiling: f64,
    pub gate_liquidity_floor: f64,
    pub gate_tick_floor: usize,
    pub heat_refresh_secs: u64,

    // Equity
    pub equity_bucket_secs: f64,

    // Accounts are threaded explicitly through the API; this is just the
    // default when a request/report does not name one.
    pub default_account: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sqlite_path: "./data/heatdesk.sqlite".to_string(),
            api_host: "127.0.0.1".to_string(),
            api_port: 8800,
            gate_spread_ceiling_pct: 0.5,
            gate_vol_ceiling: 1.5,
            gate_liquidity_floor: 0.3,
            gate_tick_floor: 20,
            heat_refresh_secs: 30,
            equity_bucket_secs: 300.0,
            default_account: "primary".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let s = Self {
            sqlite_path: get_env_string("SQLITE_PATH", "./data/heatdesk.sqlite"),
            api_host: get_env_string("API_HOST", "127.0.0.1"),
            api_port: get_env_usize("API_PORT", 8800)? as u16,
            gate_spread_ceiling_pct: get_env_f64("GATE_SPREAD_CEILING_PCT", 0.5)?,
            gate_vol_ceiling: get_env_f64("GATE_VOL_CEILING", 1.5)?,
            gate_liquidity_floor: get_env_f64("GATE_LIQUIDITY_FLOOR", 0.3)?,
            gate_tick_floor: get_env_usize("GATE_TICK_FLOOR", 20)?,
            heat_refresh_secs: get_env_usize("HEAT_REFRESH_SECS", 30)? as u64,
            equity_bucket_secs: get_env_f64("EQUITY_BUCKET_SECS", 300.0)?,
            default_account: get_env_string("DEFAULT_ACCOUNT", "primary"),
        };
        s.validate()?;
        Ok(s)
    }

    pub fn gate_limits(&self) -> GateLimits {
        GateLimits {
            spread_ceiling_pct: self.gate_spread_ceiling_pct,
            vol_ceiling: self.gate_vol_ceiling,
            liquidity_floor: self.gate_liquidity_floor,
            tick_floor: self.gate_tick_floor as u32,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sqlite_path.trim().is_empty() {
            return Err(anyhow!("SQLITE_PATH is empty"));
        }
        if !self.gate_spread_ceiling_pct.is_finite() || self.gate_spread_ceiling_pct <= 0.0 {
            return Err(anyhow!(
                "GATE_SPREAD_CEILING_PCT must be > 0 (got {})",
                self.gate_spread_ceiling_pct
            ));
        }
        if !self.gate_vol_ceiling.is_finite() || self.gate_vol_ceiling <= 0.0 {
            return Err(anyhow!(
                "GATE_VOL_CEILING must be > 0 (got {})",
                self.gate_vol_ceiling
            ));
        }
        if !(0.0..=1.0).contains(&self.gate_liquidity_floor) {
            return Err(anyhow!(
                "GATE_LIQUIDITY_FLOOR must be in [0,1] (got {})",
                self.gate_liquidity_floor
            ));
        }
        if !self.equity_bucket_secs.is_finite() || self.equity_bucket_secs <= 0.0 {
            return Err(anyhow!(
                "EQUITY_BUCKET_SECS must be > 0 (got {})",
                self.equity_bucket_secs
            ));
        }
        if self.heat_refresh_secs < 1 {
            return Err(anyhow!(
                "HEAT_REFRESH_SECS must be >= 1 (got {})",
                self.heat_refresh_secs
            ));
        }
        if self.default_account.trim().is_empty() {
            return Err(anyhow!("DEFAULT_ACCOUNT is empty"));
        }
        Ok(())
    }
}
