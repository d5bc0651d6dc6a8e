//! Backtest output: per-step snapshots, trades, anomalies and metrics.

use chrono::NaiveDate;
use serde::Serialize;

use crate::portfolio::{
    PortfolioGreeks, PositionId, PositionSize, RiskExposure, StraddlePosition, Trade,
};
use crate::volatility::SignalState;

use super::config::BacktestConfig;

/// Summary of the open straddle at a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpenPositionSummary {
    pub id: PositionId,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub entry_date: NaiveDate,
    pub size: PositionSize,
    pub entry_cost: f64,
    pub current_value: f64,
    pub unrealized_pnl: f64,
}

impl From<&StraddlePosition> for OpenPositionSummary {
    fn from(position: &StraddlePosition) -> Self {
        Self {
            id: position.id,
            strike: position.strike(),
            expiration: position.expiration(),
            entry_date: position.entry_date,
            size: position.size,
            entry_cost: position.entry_cost,
            current_value: position.current_value,
            unrealized_pnl: position.unrealized_pnl(),
        }
    }
}

/// State of the run at the end of one step.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub spot: f64,
    pub portfolio_value: f64,
    pub cash: f64,
    pub mark_to_market: f64,
    pub realized_pnl: f64,
    pub open_position: Option<OpenPositionSummary>,
    pub signal: Option<SignalState>,
    pub greeks: PortfolioGreeks,
    pub exposure: RiskExposure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Entry signal fired but the straddle could not be priced.
    EntrySkipped,
    /// Open straddle closed after a pricing failure.
    ForcedClose,
}

/// A recovered error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub kind: AnomalyKind,
    pub position: Option<PositionId>,
    pub message: String,
}

/// Why a run stopped before its configured end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarlyTermination {
    pub date: NaiveDate,
    pub reason: String,
}

/// Result of a completed (or partial) backtest.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    /// Configuration used.
    pub config: BacktestConfig,

    /// First simulated day.
    pub start_date: NaiveDate,

    /// Configured last day. Partial runs stop earlier.
    pub end_date: NaiveDate,

    pub snapshots: Vec<Snapshot>,

    /// Closed straddles in entry order.
    pub trades: Vec<Trade>,

    pub anomalies: Vec<Anomaly>,

    pub termination: Option<EarlyTermination>,

    pub initial_capital: f64,

    /// Portfolio value after any end-of-period close.
    pub final_value: f64,

    pub total_return_pct: f64,

    pub max_drawdown_pct: f64,

    pub total_trades: usize,

    pub winning_trades: usize,

    pub losing_trades: usize,

    pub total_pnl: f64,

    pub gross_profit: f64,

    pub gross_loss: f64,
}

impl BacktestResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: BacktestConfig,
        start_date: NaiveDate,
        end_date: NaiveDate,
        snapshots: Vec<Snapshot>,
        trades: Vec<Trade>,
        anomalies: Vec<Anomaly>,
        termination: Option<EarlyTermination>,
        final_value: f64,
    ) -> Self {
        let initial_capital = config.initial_capital;
        let total_return_pct = (final_value - initial_capital) / initial_capital * 100.0;

        let mut peak = initial_capital;
        let mut max_drawdown_pct: f64 = 0.0;
        for value in snapshots
            .iter()
            .map(|s| s.portfolio_value)
            .chain(std::iter::once(final_value))
        {
            peak = peak.max(value);
            if peak > 0.0 {
                max_drawdown_pct = max_drawdown_pct.max((peak - value) / peak * 100.0);
            }
        }

        let winning_trades = trades.iter().filter(|t| t.is_winner()).count();
        let losing_trades = trades.len() - winning_trades;
        let total_pnl: f64 = trades.iter().map(|t| t.pnl()).sum();
        let gross_profit: f64 = trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.pnl())
            .sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| !t.is_winner())
            .map(|t| t.pnl())
            .sum();

        Self {
            config,
            start_date,
            end_date,
            total_trades: trades.len(),
            snapshots,
            trades,
            anomalies,
            termination,
            initial_capital,
            final_value,
            total_return_pct,
            max_drawdown_pct,
            winning_trades,
            losing_trades,
            total_pnl,
            gross_profit,
            gross_loss,
        }
    }

    /// The run stopped before its configured end.
    pub fn is_partial(&self) -> bool {
        self.termination.is_some()
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    pub fn profit_factor(&self) -> f64 {
        if self.gross_loss == 0.0 {
            return f64::INFINITY;
        }
        self.gross_profit / self.gross_loss.abs()
    }

    pub fn avg_trade_pnl(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.total_pnl / self.total_trades as f64
    }

    /// Sharpe ratio of step returns, annualized with the configured
    /// observations per year (risk-free rate = 0).
    pub fn sharpe_ratio(&self) -> f64 {
        let returns: Vec<f64> = self
            .snapshots
            .windows(2)
            .filter(|w| w[0].portfolio_value != 0.0)
            .map(|w| (w[1].portfolio_value - w[0].portfolio_value) / w[0].portfolio_value)
            .collect();

        if returns.len() < 2 {
            return 0.0;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return 0.0;
        }

        mean * self.config.annualization_factor.sqrt() / std_dev
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Backtest Results ({} to {})\n\
             ----------------------------------------\n\
             Steps: {}\n\
             Total Return: {:.2}%\n\
             Final Value: ${:.2}\n\
             Max Drawdown: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             \n\
             Straddles: {} (W: {}, L: {})\n\
             Win Rate: {:.1}%\n\
             Profit Factor: {:.2}\n\
             Avg Trade: ${:.2}\n\
             Anomalies: {}",
            self.start_date,
            self.end_date,
            self.snapshots.len(),
            self.total_return_pct,
            self.final_value,
            self.max_drawdown_pct,
            self.sharpe_ratio(),
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate() * 100.0,
            self.profit_factor(),
            self.avg_trade_pnl(),
            self.anomalies.len(),
        );

        if let Some(termination) = &self.termination {
            summary.push_str(&format!(
                "\n\nStopped early on {}: {}",
                termination.date, termination.reason
            ));
        }

        summary
    }
}
