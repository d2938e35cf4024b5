//! Table and JSON rendering for `status`

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::strategy::StrategyStatusView;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct StatusRow {
    pub id: i64,
    pub name: String,
    #[tabled(rename = "type")]
    pub strategy_type: String,
    pub symbol: String,
    pub timeframe: String,
    pub status: String,
    pub balance: String,
    pub trades: i64,
    pub last_run: String,
    pub uptime: String,
}

impl From<&StrategyStatusView> for StatusRow {
    fn from(view: &StrategyStatusView) -> Self {
        Self {
            id: view.id.0,
            name: view.name.clone(),
            strategy_type: view.strategy_type.to_string(),
            symbol: view.symbol.clone(),
            timeframe: view.timeframe.clone(),
            status: view.status.to_string(),
            balance: format!(
                "{} / {}",
                view.current_balance.round_dp(2),
                view.initial_balance.round_dp(2)
            ),
            trades: view.total_trades,
            last_run: view
                .last_run_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            uptime: view.uptime().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Print status views in the chosen mode.
pub fn print_statuses(views: &[StrategyStatusView], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if views.is_empty() {
                println!("(no strategies)");
            } else {
                let rows: Vec<StatusRow> = views.iter().map(StatusRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(views)?);
        }
    }
    Ok(())
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}
