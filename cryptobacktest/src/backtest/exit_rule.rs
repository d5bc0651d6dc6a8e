//! Exit rules for open straddles.

use chrono::NaiveDate;

use crate::portfolio::{ExitReason, StraddlePosition};
use crate::volatility::SignalState;

use super::config::{BacktestConfig, ExitRuleKind};

/// What an exit rule sees on each step.
#[derive(Debug, Clone, Copy)]
pub struct ExitContext<'a> {
    pub date: NaiveDate,
    pub spot: f64,
    pub position: &'a StraddlePosition,
    /// Signal for the date, if both windows had an estimate.
    pub signal: Option<&'a SignalState>,
}

impl ExitContext<'_> {
    pub fn days_held(&self) -> i64 {
        self.position.days_held(self.date)
    }
}

pub trait ExitRule {
    fn name(&self) -> &'static str;

    /// `Some(reason)` when the position should be closed on this step.
    fn should_exit(&self, ctx: &ExitContext<'_>) -> Option<ExitReason>;
}

/// Exit once the position has been held for a fixed number of days.
#[derive(Debug, Clone, Copy)]
pub struct FixedHoldingPeriod {
    days: i64,
}

impl FixedHoldingPeriod {
    pub fn new(days: u32) -> Self {
        Self {
            days: i64::from(days),
        }
    }
}

impl ExitRule for FixedHoldingPeriod {
    fn name(&self) -> &'static str {
        "holding_period"
    }

    fn should_exit(&self, ctx: &ExitContext<'_>) -> Option<ExitReason> {
        (ctx.days_held() >= self.days).then_some(ExitReason::HoldingPeriod)
    }
}

/// Exit when short-window volatility has mean-reverted to the baseline,
/// with a cap on holding time.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityReversal {
    max_holding_days: i64,
}

impl VolatilityReversal {
    pub fn new(max_holding_days: u32) -> Self {
        Self {
            max_holding_days: i64::from(max_holding_days),
        }
    }
}

impl ExitRule for VolatilityReversal {
    fn name(&self) -> &'static str {
        "volatility_reversal"
    }

    fn should_exit(&self, ctx: &ExitContext<'_>) -> Option<ExitReason> {
        if ctx.signal.is_some_and(|s| s.reverted()) {
            Some(ExitReason::VolatilityReversal)
        } else if ctx.days_held() >= self.max_holding_days {
            Some(ExitReason::HoldingPeriod)
        } else {
            None
        }
    }
}

/// Build the exit rule selected in the configuration.
pub fn from_config(config: &BacktestConfig) -> Box<dyn ExitRule> {
    match config.exit_rule {
        ExitRuleKind::HoldingPeriod => Box::new(FixedHoldingPeriod::new(config.exit_holding_days)),
        ExitRuleKind::VolatilityReversal => {
            Box::new(VolatilityReversal::new(config.exit_holding_days))
        }
    }
}
