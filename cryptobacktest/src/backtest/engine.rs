//! Core backtesting engine.
//!
//! Walks calendar days from start to end. Each step:
//! 1. Read the latest price at or before the day
//! 2. Look up the volatility signal, on days with their own bar only
//! 3. Enter a straddle if flat and the signal fires
//! 4. Revalue the open straddle
//! 5. Apply the exit rule
//! 6. Record a snapshot

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::broker::{OrderExecutor, SimulatedExecutor};
use crate::data::{PricePoint, PriceSource};
use crate::error::{BacktestError, DataError, ModelError, StateError};
use crate::portfolio::{ExitReason, PositionId, Trade};
use crate::volatility::SignalState;

use super::config::BacktestConfig;
use super::exit_rule::ExitContext;
use super::result::{
    Anomaly, AnomalyKind, BacktestResult, EarlyTermination, OpenPositionSummary, Snapshot,
};
use super::run::BacktestRun;

/// Volatility inputs precomputed from the full history.
struct Inputs {
    signals: BTreeMap<NaiveDate, SignalState>,
    short_vols: BTreeMap<NaiveDate, f64>,
}

/// The time-stepped simulation over a [`BacktestRun`].
pub struct BacktestController<'a, E: OrderExecutor = SimulatedExecutor> {
    run: BacktestRun<'a, E>,
    snapshots: Vec<Snapshot>,
    anomalies: Vec<Anomaly>,
}

impl<'a, E: OrderExecutor> BacktestController<'a, E> {
    pub fn new(run: BacktestRun<'a, E>) -> Self {
        Self {
            run,
            snapshots: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    /// Run to completion.
    ///
    /// Data errors before the first step (too little history, a start date
    /// outside it) are returned. Running out of data mid-run yields a partial
    /// result. State errors are always returned.
    pub fn run(mut self) -> Result<BacktestResult, BacktestError> {
        let source = self.run.source;
        let prices = source.prices();
        let (first, last) = match (prices.first(), prices.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => return Err(DataError::EmptyHistory.into()),
        };

        let start = self.run.config.start.unwrap_or(first);
        let end = self.run.config.end.unwrap_or(last);
        source.as_of(start)?;

        let inputs = self.prepare_inputs()?;

        info!(
            "Running backtest {} to {} ({} prices, {} signal days, exit rule {})",
            start,
            end,
            prices.len(),
            inputs.signals.len(),
            self.run.exit_rule.name()
        );

        let mut termination = None;
        let mut last_step: Option<(NaiveDate, PricePoint)> = None;
        let mut date = start;

        while date <= end {
            let point = match source.as_of(date) {
                Ok(point) => point,
                Err(err @ DataError::OutOfRange { .. }) => {
                    warn!("{}: stopping early: {}", date, err);
                    termination = Some(EarlyTermination {
                        date,
                        reason: err.to_string(),
                    });
                    break;
                }
                Err(err) => return Err(err.into()),
            };

            self.step(date, point, &inputs)?;
            last_step = Some((date, point));

            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        if self.run.config.close_at_end {
            if let Some((date, point)) = last_step {
                self.close_at_end(date, point, &inputs)?;
            }
        }

        Ok(self.into_result(start, end, termination))
    }

    fn prepare_inputs(&self) -> Result<Inputs, BacktestError> {
        let short = self.run.source.volatility(&*self.run.short)?;
        let long = self.run.source.volatility(&*self.run.long)?;

        let short_vols = short.iter().map(|e| (e.date, e.value)).collect();
        let signals = self
            .run
            .signal
            .evaluate(short, long)
            .into_iter()
            .map(|s| (s.date, s))
            .collect();

        Ok(Inputs {
            signals,
            short_vols,
        })
    }

    fn step(
        &mut self,
        date: NaiveDate,
        point: PricePoint,
        inputs: &Inputs,
    ) -> Result<(), BacktestError> {
        let spot = point.price;
        // A carried bar has no fresh signal
        let signal = if point.date == date {
            inputs.signals.get(&date).copied()
        } else {
            None
        };

        if self.run.broker.open_position_id().is_none() {
            if let Some(signal) = signal.filter(|s| s.enter) {
                self.try_enter(date, spot, &signal)?;
            }
        }

        if let Some(id) = self.run.broker.open_position_id() {
            let vol = self.pricing_vol(id, point.date, inputs)?;
            self.revalue_and_check_exit(id, date, spot, vol, signal.as_ref())?;
        }

        self.check_greeks_limits(date);
        self.record_snapshot(date, spot, signal);
        Ok(())
    }

    fn try_enter(
        &mut self,
        date: NaiveDate,
        spot: f64,
        signal: &SignalState,
    ) -> Result<(), BacktestError> {
        let config = &self.run.config;
        let strike = spot * (1.0 + config.strike_offset);
        let expiry = date + Duration::days(i64::from(config.expiry_days));
        let rate = config.risk_free_rate;

        debug!(
            "{}: entry signal short {:.4} long {:.4}",
            date, signal.short_vol, signal.long_vol
        );

        match self
            .run
            .broker
            .enter_straddle(strike, expiry, spot, signal.short_vol, rate, date)
        {
            Ok(_) => Ok(()),
            Err(BacktestError::Model(err)) => {
                warn!("{}: skipped entry: {}", date, err);
                self.anomalies.push(Anomaly {
                    date,
                    kind: AnomalyKind::EntrySkipped,
                    position: None,
                    message: err.to_string(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn revalue_and_check_exit(
        &mut self,
        id: PositionId,
        date: NaiveDate,
        spot: f64,
        vol: f64,
        signal: Option<&SignalState>,
    ) -> Result<(), BacktestError> {
        let tte = match self.run.broker.portfolio().position(id) {
            Some(position) => position.call.contract.time_to_expiry(date),
            None => return Err(StateError::UnknownPosition(id).into()),
        };

        match self.run.broker.portfolio_mut().revalue(id, spot, tte, vol) {
            Ok(mark) => debug!("{}: straddle {} marked at {:.4}", date, id, mark),
            Err(BacktestError::Model(err)) => return self.force_close(id, date, spot, err),
            Err(err) => return Err(err),
        }

        let reason = match self.run.broker.portfolio().position(id) {
            Some(position) => self.run.exit_rule.should_exit(&ExitContext {
                date,
                spot,
                position,
                signal,
            }),
            None => None,
        };

        if let Some(reason) = reason {
            self.exit(id, date, spot, vol, reason)?;
        }
        Ok(())
    }

    fn exit(
        &mut self,
        id: PositionId,
        date: NaiveDate,
        spot: f64,
        vol: f64,
        reason: ExitReason,
    ) -> Result<(), BacktestError> {
        let rate = self.run.config.risk_free_rate;
        match self
            .run
            .broker
            .exit_straddle(id, spot, vol, rate, date, reason)
        {
            Ok(_) => Ok(()),
            Err(BacktestError::Model(err)) => self.force_close(id, date, spot, err),
            Err(err) => Err(err),
        }
    }

    /// Close after a pricing failure: at intrinsic value once expired,
    /// otherwise at the last mark.
    fn force_close(
        &mut self,
        id: PositionId,
        date: NaiveDate,
        spot: f64,
        err: ModelError,
    ) -> Result<(), BacktestError> {
        let proceeds = match self.run.broker.portfolio().position(id) {
            Some(position) if position.days_to_expiry(date) <= 0 => position.intrinsic_value(spot),
            Some(position) => position.current_value,
            None => return Err(StateError::UnknownPosition(id).into()),
        };

        warn!(
            "{}: force-closing straddle {} at {:.4}: {}",
            date, id, proceeds, err
        );
        self.run
            .broker
            .force_exit(id, proceeds, date, ExitReason::ForcedClose)?;

        self.anomalies.push(Anomaly {
            date,
            kind: AnomalyKind::ForcedClose,
            position: Some(id),
            message: err.to_string(),
        });
        Ok(())
    }

    fn close_at_end(
        &mut self,
        date: NaiveDate,
        point: PricePoint,
        inputs: &Inputs,
    ) -> Result<(), BacktestError> {
        if let Some(id) = self.run.broker.open_position_id() {
            let vol = self.pricing_vol(id, point.date, inputs)?;
            self.exit(id, date, point.price, vol, ExitReason::EndOfPeriod)?;
        }
        Ok(())
    }

    /// Short-window volatility for the price date, else the vol the position
    /// was last priced at.
    fn pricing_vol(
        &self,
        id: PositionId,
        price_date: NaiveDate,
        inputs: &Inputs,
    ) -> Result<f64, StateError> {
        if let Some(&vol) = inputs.short_vols.get(&price_date) {
            return Ok(vol);
        }

        let position = self
            .run
            .broker
            .portfolio()
            .position(id)
            .ok_or(StateError::UnknownPosition(id))?;
        debug!(
            "{}: no short-window estimate, keeping straddle {} at {:.4}",
            price_date, id, position.call.volatility
        );
        Ok(position.call.volatility)
    }

    fn check_greeks_limits(&self, date: NaiveDate) {
        let check = self
            .run
            .broker
            .portfolio()
            .aggregate_greeks()
            .check_limits(&self.run.config.greeks_limits);

        for violation in &check.violations {
            warn!("{}: {}", date, violation);
        }
    }

    fn record_snapshot(&mut self, date: NaiveDate, spot: f64, signal: Option<SignalState>) {
        let portfolio = self.run.broker.portfolio();
        let portfolio_value = portfolio.total_value();
        let greeks = portfolio.aggregate_greeks();

        self.snapshots.push(Snapshot {
            date,
            spot,
            portfolio_value,
            cash: portfolio.cash(),
            mark_to_market: portfolio.mark_to_market(),
            realized_pnl: portfolio.realized_pnl(),
            open_position: portfolio.open_positions().next().map(OpenPositionSummary::from),
            signal,
            greeks,
            exposure: greeks.exposure(spot, portfolio_value),
        });
    }

    fn into_result(
        self,
        start: NaiveDate,
        end: NaiveDate,
        termination: Option<EarlyTermination>,
    ) -> BacktestResult {
        let portfolio = self.run.broker.portfolio();
        let trades: Vec<Trade> = portfolio
            .closed_positions()
            .cloned()
            .filter_map(Trade::from_position)
            .collect();
        let final_value = portfolio.total_value();

        let result = BacktestResult::new(
            self.run.config,
            start,
            end,
            self.snapshots,
            trades,
            self.anomalies,
            termination,
            final_value,
        );

        info!(
            "Backtest finished: {} steps, {} straddles, {} anomalies, return {:.2}%",
            result.snapshots.len(),
            result.total_trades,
            result.anomalies.len(),
            result.total_return_pct
        );

        result
    }
}

/// Run a backtest with the default components.
pub fn run_backtest(
    config: BacktestConfig,
    source: &dyn PriceSource,
) -> Result<BacktestResult, BacktestError> {
    BacktestController::new(BacktestRun::new(config, source)?).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PriceHistory, VolatilityEstimate};
    use crate::backtest::ExitRuleKind;
    use crate::error::ConfigError;
    use crate::pricing::{BlackScholes, OptionContract};
    use crate::volatility::VolatilityEstimator;
    use approx::assert_relative_eq;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    /// 36 daily closes from 2024-01-01: 30 log returns alternating at 10%
    /// annualized volatility, then 5 at 4%.
    fn quieting_closes() -> Vec<f64> {
        let hi = 0.10 / 365.0_f64.sqrt();
        let lo = 0.04 / 365.0_f64.sqrt();

        let mut closes = vec![100.0];
        for i in 0..35 {
            let step = if i < 30 { hi } else { lo };
            let r = if i % 2 == 0 { step } else { -step };
            let prev = closes[closes.len() - 1];
            closes.push(prev * f64::exp(r));
        }
        closes
    }

    fn quieting_history() -> PriceHistory {
        PriceHistory::from_daily_closes(date(1, 1), &quieting_closes()).unwrap()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            short_window: 5,
            long_window: 30,
            vol_threshold: 0.3,
            annualization_factor: 365.0,
            risk_free_rate: 0.05,
            ..Default::default()
        }
    }

    fn assert_value_invariant(result: &BacktestResult) {
        for s in &result.snapshots {
            assert_relative_eq!(
                s.portfolio_value,
                s.cash + s.mark_to_market + s.realized_pnl,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_enters_once_on_day_35() {
        let history = quieting_history();
        let result = run_backtest(config(), &history).unwrap();

        let entry = date(2, 4);
        assert_eq!(result.snapshots.len(), 36);
        assert!(!result.is_partial());

        // No signal until the long window has warmed up
        assert!(result.snapshots[..30].iter().all(|s| s.signal.is_none()));
        assert!(result
            .snapshots
            .iter()
            .filter(|s| s.date < entry)
            .all(|s| s.open_position.is_none() && !s.signal.is_some_and(|sig| sig.enter)));

        let day_35 = &result.snapshots[34];
        assert_eq!(day_35.date, entry);
        assert!(day_35.signal.unwrap().enter);
        let open = day_35.open_position.unwrap();
        assert_eq!(open.id, PositionId(1));
        assert_eq!(open.entry_date, entry);
        assert_relative_eq!(open.strike, 100.0, epsilon = 1e-9);
        assert_eq!(open.expiration, date(3, 5));

        // Closed at the end of the data; no second straddle
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].position.entry_date, entry);
        assert_eq!(result.trades[0].exit_reason(), Some(ExitReason::EndOfPeriod));
        assert!(result.anomalies.is_empty());
        assert_value_invariant(&result);
    }

    #[test]
    fn test_entry_priced_at_short_window_vol() {
        let history = quieting_history();
        let result = run_backtest(config(), &history).unwrap();

        let signal = result.snapshots[34].signal.unwrap();
        let spot = quieting_closes()[34];
        let model = BlackScholes::with_rate(0.05);
        let tte = 30.0 / 365.0;
        let call = OptionContract::call(spot, date(3, 5))
            .price(&model, spot, tte, signal.short_vol)
            .unwrap();
        let put = OptionContract::put(spot, date(3, 5))
            .price(&model, spot, tte, signal.short_vol)
            .unwrap();

        let trade = &result.trades[0];
        assert_relative_eq!(trade.position.entry_cost, call.price + put.price, epsilon = 1e-12);

        // Revalued the next day at that day's short-window vol
        let next = result.snapshots[35].signal.unwrap();
        assert_relative_eq!(trade.position.call.volatility, next.short_vol);
    }

    #[test]
    fn test_expired_leg_force_closes() {
        let history = quieting_history();
        let config = BacktestConfig {
            expiry_days: 1,
            ..config()
        };

        let result = run_backtest(config, &history).unwrap();

        assert_eq!(result.anomalies.len(), 1);
        let anomaly = &result.anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::ForcedClose);
        assert_eq!(anomaly.date, date(2, 5));
        assert_eq!(anomaly.position, Some(PositionId(1)));

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason(), Some(ExitReason::ForcedClose));

        let closes = quieting_closes();
        let intrinsic = (closes[35] - closes[34]).abs();
        let exit = trade.position.exit.unwrap();
        assert_relative_eq!(exit.proceeds, intrinsic, epsilon = 1e-9);
        assert!(!result.is_partial());
        assert_value_invariant(&result);
    }

    #[test]
    fn test_end_past_history_is_partial() {
        let history = quieting_history();
        let config = BacktestConfig {
            end: Some(date(2, 10)),
            ..config()
        };

        let result = run_backtest(config, &history).unwrap();

        assert!(result.is_partial());
        let termination = result.termination.as_ref().unwrap();
        assert_eq!(termination.date, date(2, 6));
        assert_eq!(result.snapshots.len(), 36);
        assert_eq!(result.snapshots.last().unwrap().date, date(2, 5));
        // Open straddle still closed on the last step taken
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].position.exit.unwrap().date, date(2, 5));
    }

    #[test]
    fn test_start_before_history_fails() {
        let history = quieting_history();
        let config = BacktestConfig {
            start: Some(date(1, 1) - Duration::days(1)),
            ..config()
        };

        assert!(matches!(
            run_backtest(config, &history),
            Err(BacktestError::Data(DataError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_insufficient_history_fails() {
        let history =
            PriceHistory::from_daily_closes(date(1, 1), &quieting_closes()[..20]).unwrap();

        assert!(matches!(
            run_backtest(config(), &history),
            Err(BacktestError::Data(DataError::InsufficientData {
                required: 31,
                available: 20
            }))
        ));
    }

    #[test]
    fn test_invalid_config_fails() {
        let history = quieting_history();
        let config = BacktestConfig {
            long_window: 5,
            ..config()
        };

        assert!(matches!(
            run_backtest(config, &history),
            Err(BacktestError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_keep_open_at_end() {
        let history = quieting_history();
        let config = BacktestConfig {
            close_at_end: false,
            ..config()
        };

        let result = run_backtest(config, &history).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.snapshots.last().unwrap().open_position.is_some());
    }

    /// Estimator returning a fixed value once `window` prices have passed.
    struct FixedVolatility {
        window: usize,
        value: f64,
    }

    impl VolatilityEstimator for FixedVolatility {
        fn window(&self) -> usize {
            self.window
        }

        fn estimate<'a>(
            &'a self,
            prices: &'a [PricePoint],
        ) -> Result<Box<dyn Iterator<Item = VolatilityEstimate> + 'a>, DataError> {
            let (window, value) = (self.window, self.value);
            Ok(Box::new(prices.iter().skip(window).map(move |p| {
                VolatilityEstimate {
                    date: p.date,
                    window,
                    value,
                }
            })))
        }
    }

    /// Fixed value until index `from`, zero afterwards.
    struct CollapsingVolatility {
        window: usize,
        value: f64,
        from: usize,
    }

    impl VolatilityEstimator for CollapsingVolatility {
        fn window(&self) -> usize {
            self.window
        }

        fn estimate<'a>(
            &'a self,
            prices: &'a [PricePoint],
        ) -> Result<Box<dyn Iterator<Item = VolatilityEstimate> + 'a>, DataError> {
            let (window, value, from) = (self.window, self.value, self.from);
            Ok(Box::new(prices.iter().enumerate().skip(window).map(
                move |(i, p)| VolatilityEstimate {
                    date: p.date,
                    window,
                    value: if i < from { value } else { 0.0 },
                },
            )))
        }
    }

    fn flat_history(days: usize) -> PriceHistory {
        PriceHistory::from_daily_closes(date(6, 1), &vec![100.0; days]).unwrap()
    }

    #[test]
    fn test_unpriceable_entry_is_skipped() {
        // Flat closes: both windows read zero volatility and the signal fires
        // on every day it exists, but a zero-vol straddle cannot be priced
        let history = flat_history(40);
        let result = run_backtest(config(), &history).unwrap();

        let signal_days: Vec<NaiveDate> = result
            .snapshots
            .iter()
            .filter(|s| s.signal.is_some_and(|sig| sig.enter))
            .map(|s| s.date)
            .collect();
        assert_eq!(signal_days.len(), 10);
        assert_eq!(signal_days[0], date(7, 1));

        assert_eq!(result.anomalies.len(), 10);
        for (anomaly, day) in result.anomalies.iter().zip(&signal_days) {
            assert_eq!(anomaly.kind, AnomalyKind::EntrySkipped);
            assert_eq!(anomaly.date, *day);
            assert_eq!(anomaly.position, None);
            assert_eq!(anomaly.message, ModelError::InvalidVolatility(0.0).to_string());
        }

        assert!(result.trades.is_empty());
        assert!(result.snapshots.iter().all(|s| s.open_position.is_none()));
        assert_eq!(result.final_value, 100_000.0);
        assert!(!result.is_partial());
        assert_value_invariant(&result);
    }

    #[test]
    fn test_revaluation_failure_closes_at_last_mark() {
        let history = flat_history(10);
        let config = BacktestConfig {
            exit_holding_days: 30,
            ..config()
        };
        let run = BacktestRun::new(config, &history).unwrap().with_estimators(
            Box::new(CollapsingVolatility {
                window: 2,
                value: 0.2,
                from: 6,
            }),
            Box::new(FixedVolatility {
                window: 2,
                value: 0.5,
            }),
        );

        let result = BacktestController::new(run).run().unwrap();

        // Entered 6/3, priced at 0.2 through 6/6, unpriceable from 6/7
        let kinds: Vec<(NaiveDate, AnomalyKind)> =
            result.anomalies.iter().map(|a| (a.date, a.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (date(6, 7), AnomalyKind::ForcedClose),
                (date(6, 8), AnomalyKind::EntrySkipped),
                (date(6, 9), AnomalyKind::EntrySkipped),
                (date(6, 10), AnomalyKind::EntrySkipped),
            ]
        );
        assert_eq!(result.anomalies[0].position, Some(PositionId(1)));

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.position.entry_date, date(6, 3));
        assert_eq!(trade.exit_reason(), Some(ExitReason::ForcedClose));
        assert!(trade.position.days_to_expiry(date(6, 7)) > 0);

        let exit = trade.position.exit.unwrap();
        let last_mark = &result.snapshots[5];
        assert_eq!(last_mark.date, date(6, 6));
        assert_eq!(exit.date, date(6, 7));
        assert_relative_eq!(exit.proceeds, last_mark.mark_to_market, epsilon = 1e-12);
        assert!(exit.proceeds > trade.position.intrinsic_value(100.0));
        assert!(result.snapshots[6..].iter().all(|s| s.open_position.is_none()));
        assert_value_invariant(&result);
    }

    #[test]
    fn test_missing_short_vol_keeps_last_pricing_vol() {
        // Short-window estimates stop after 6/4
        struct ShortLived;

        impl VolatilityEstimator for ShortLived {
            fn window(&self) -> usize {
                2
            }

            fn estimate<'a>(
                &'a self,
                prices: &'a [PricePoint],
            ) -> Result<Box<dyn Iterator<Item = VolatilityEstimate> + 'a>, DataError> {
                Ok(Box::new(prices[2..4].iter().map(|p| VolatilityEstimate {
                    date: p.date,
                    window: 2,
                    value: 0.2,
                })))
            }
        }

        let history = flat_history(10);
        let config = BacktestConfig {
            exit_holding_days: 5,
            ..config()
        };
        let run = BacktestRun::new(config, &history).unwrap().with_estimators(
            Box::new(ShortLived),
            Box::new(FixedVolatility {
                window: 2,
                value: 0.5,
            }),
        );

        let result = BacktestController::new(run).run().unwrap();

        assert!(result.anomalies.is_empty());
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.position.entry_date, date(6, 3));
        assert_eq!(trade.exit_reason(), Some(ExitReason::HoldingPeriod));
        assert_eq!(trade.position.exit.unwrap().date, date(6, 8));
        assert_eq!(trade.position.call.volatility, 0.2);
        assert_value_invariant(&result);
    }

    #[test]
    fn test_carried_bars_do_not_replay_signal() {
        // One entry signal on 6/4, a gap to 6/10
        let points = [1, 2, 3, 4, 10]
            .iter()
            .map(|&d| PricePoint::new(date(6, d), 100.0))
            .collect();
        let history = PriceHistory::new(points).unwrap();
        let config = BacktestConfig {
            exit_holding_days: 1,
            ..config()
        };
        let run = BacktestRun::new(config, &history).unwrap().with_estimators(
            Box::new(FixedVolatility {
                window: 2,
                value: 0.2,
            }),
            Box::new(FixedVolatility {
                window: 3,
                value: 0.5,
            }),
        );

        let result = BacktestController::new(run).run().unwrap();

        let signal_dates: Vec<(NaiveDate, Option<NaiveDate>)> = result
            .snapshots
            .iter()
            .map(|s| (s.date, s.signal.map(|sig| sig.date)))
            .filter(|(_, signal)| signal.is_some())
            .collect();
        assert_eq!(
            signal_dates,
            vec![(date(6, 4), Some(date(6, 4))), (date(6, 10), Some(date(6, 10)))]
        );

        let entries: Vec<NaiveDate> = result
            .trades
            .iter()
            .map(|t| t.position.entry_date)
            .collect();
        assert_eq!(entries, vec![date(6, 4), date(6, 10)]);
        assert_eq!(result.trades[0].exit_reason(), Some(ExitReason::HoldingPeriod));
        assert_eq!(result.trades[0].position.exit.unwrap().date, date(6, 5));
        assert!(result.snapshots[5..9]
            .iter()
            .all(|s| s.signal.is_none() && s.open_position.is_none()));
        assert_value_invariant(&result);
    }

    #[test]
    fn test_sized_run_scales_premium() {
        let history = quieting_history();
        let base = run_backtest(config(), &history).unwrap();
        let sized = run_backtest(
            BacktestConfig {
                quantity: 4,
                contract_size: 0.5,
                ..config()
            },
            &history,
        )
        .unwrap();

        assert_eq!(sized.trades.len(), 1);
        let (base, sized_trade) = (&base.trades[0], &sized.trades[0]);
        assert_eq!(sized_trade.position.size.quantity, 4);
        assert_relative_eq!(
            sized_trade.position.entry_cost,
            2.0 * base.position.entry_cost,
            epsilon = 1e-9
        );
        assert_relative_eq!(sized_trade.pnl(), 2.0 * base.pnl(), epsilon = 1e-9);
        assert_relative_eq!(sized_trade.return_on_premium, base.return_on_premium, epsilon = 1e-9);
        assert_value_invariant(&sized);
    }

    #[test]
    fn test_holding_period_cycles_with_custom_estimators() {
        let history = flat_history(20);
        let config = BacktestConfig {
            exit_holding_days: 5,
            ..config()
        };
        let run = BacktestRun::new(config, &history).unwrap().with_estimators(
            Box::new(FixedVolatility {
                window: 2,
                value: 0.2,
            }),
            Box::new(FixedVolatility {
                window: 3,
                value: 0.5,
            }),
        );

        let result = BacktestController::new(run).run().unwrap();

        // Enter once both windows exist, exit after 5 days, re-enter the
        // following day
        let entries: Vec<NaiveDate> = result
            .trades
            .iter()
            .map(|t| t.position.entry_date)
            .collect();
        assert_eq!(entries, vec![date(6, 4), date(6, 10), date(6, 16)]);
        assert!(result.trades[..2]
            .iter()
            .all(|t| t.exit_reason() == Some(ExitReason::HoldingPeriod) && t.days_held == 5));
        assert_eq!(result.trades[2].exit_reason(), Some(ExitReason::EndOfPeriod));
        assert!(result
            .trades
            .iter()
            .all(|t| t.position.call.volatility == 0.2));
        assert_value_invariant(&result);
    }

    #[test]
    fn test_volatility_reversal_exit() {
        // Short vol sits below the baseline, then jumps above it
        struct Stepped;

        impl VolatilityEstimator for Stepped {
            fn window(&self) -> usize {
                2
            }

            fn estimate<'a>(
                &'a self,
                prices: &'a [PricePoint],
            ) -> Result<Box<dyn Iterator<Item = VolatilityEstimate> + 'a>, DataError> {
                Ok(Box::new(prices.iter().enumerate().skip(2).map(|(i, p)| {
                    VolatilityEstimate {
                        date: p.date,
                        window: 2,
                        value: if i < 6 { 0.2 } else { 0.6 },
                    }
                })))
            }
        }

        let history = flat_history(10);
        let config = BacktestConfig {
            exit_rule: ExitRuleKind::VolatilityReversal,
            exit_holding_days: 30,
            ..config()
        };
        let run = BacktestRun::new(config, &history).unwrap().with_estimators(
            Box::new(Stepped),
            Box::new(FixedVolatility {
                window: 2,
                value: 0.5,
            }),
        );

        let result = BacktestController::new(run).run().unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.position.entry_date, date(6, 3));
        assert_eq!(trade.exit_reason(), Some(ExitReason::VolatilityReversal));
        assert_eq!(trade.position.exit.unwrap().date, date(6, 7));
    }

    #[test]
    fn test_weekend_gaps_carry_last_price() {
        let points = [(1, 100.0), (2, 101.0), (5, 103.0), (6, 102.0)]
            .iter()
            .map(|&(d, p)| PricePoint::new(date(7, d), p))
            .collect();
        let history = PriceHistory::new(points).unwrap();
        let config = BacktestConfig {
            short_window: 2,
            long_window: 3,
            ..config()
        };

        let result = run_backtest(config, &history).unwrap();

        let spots: Vec<f64> = result.snapshots.iter().map(|s| s.spot).collect();
        assert_eq!(spots, vec![100.0, 101.0, 101.0, 101.0, 103.0, 102.0]);
    }

    #[test]
    fn test_state_errors_are_not_recoverable() {
        let err: BacktestError = StateError::StraddleAlreadyOpen(PositionId(1)).into();
        assert!(!err.is_recoverable());
    }
}
