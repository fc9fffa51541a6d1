mod api;
mod candidate;
mod components;
mod config;
mod equity;
mod gates;
mod heat;
mod ledger;
mod reconcile;
mod store;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::api::{refresh_heat, spawn_heat_refresher, ApiState};
use crate::config::Settings;
use crate::ledger::settle_by_symbol;
use crate::reconcile::{reconcile, PnlFigures, PnlSource};
use crate::store::SqliteStore;

#[derive(Parser)]
#[command(name = "heatdesk", about = "Derived-metrics core for the trading dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the read-side HTTP API with the background heat refresher.
    Serve,
    /// Print a one-shot P&L report for an account and exit.
    Report {
        #[arg(long)]
        account: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings = Settings::load()?;
    let store = SqliteStore::new(&settings.sqlite_path)?;
    store.init_db()?;
    log::info!(
        "heatdesk starting sqlite={} api={}:{} refresh_secs={}",
        settings.sqlite_path,
        settings.api_host,
        settings.api_port,
        settings.heat_refresh_secs
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, store).await,
        Command::Report { account } => {
            let account = account.unwrap_or_else(|| settings.default_account.clone());
            report(&store, &account)
        }
    }
}

async fn serve(settings: Settings, store: SqliteStore) -> Result<()> {
    let state = ApiState::new(settings, store);

    // Score once up front so the first request never sees an empty cache.
    if let Err(e) = refresh_heat(&state) {
        log::warn!("initial heat refresh failed: {e:#}");
    }
    let refresher = spawn_heat_refresher(state.clone());

    tokio::select! {
        res = api::serve(state) => res?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown signal received");
        }
    }
    refresher.abort();
    Ok(())
}

fn report(store: &SqliteStore, account: &str) -> Result<()> {
    let fills = store.fetch_fills(account, None)?;
    let marks = store.fetch_marks()?;
    let settled = settle_by_symbol(&fills);

    let mut fallback = PnlFigures::default();
    let mut symbols: Vec<&String> = settled.keys().collect();
    symbols.sort();

    println!("account: {account}");
    println!("{:<12} {:>12} {:>12} {:>12} {:>12}", "symbol", "qty", "avg_cost", "realized", "fees");
    for sym in symbols {
        let (summary, lot) = &settled[sym.as_str()];
        fallback.realized += summary.realized_pnl;
        fallback.fees += summary.fees_paid;
        if lot.total_qty > 0.0 {
            if let Some(mark) = marks.get(sym.as_str()) {
                fallback.unrealized += lot.total_qty * mark - lot.total_cost;
            }
        }
        println!(
            "{:<12} {:>12.6} {:>12.4} {:>12.4} {:>12.4}",
            sym,
            lot.total_qty,
            lot.avg_cost(),
            summary.realized_pnl,
            summary.fees_paid
        );
    }

    let daily = store.fetch_latest_daily_pnl(account)?;
    let (figures, source) = reconcile(fallback, daily.as_ref());
    let source_label = match source {
        PnlSource::Authoritative => "authoritative",
        PnlSource::Fallback => "fallback",
    };
    println!();
    println!(
        "totals ({source_label}): realized={:.4} unrealized={:.4} fees={:.4}",
        figures.realized, figures.unrealized, figures.fees
    );
    Ok(())
}
