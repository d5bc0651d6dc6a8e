//! Portfolio Greeks aggregation.
//!
//! Net Greeks are the plain sum over open straddles; positions are
//! independent and never offset against each other beyond addition.
//! Forwards add their delta and nothing else.

use serde::{Deserialize, Serialize};

use crate::pricing::Greeks;

use super::forward::ForwardPosition;
use super::position::StraddlePosition;

/// Optional limits on net exposure. Unset limits are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioGreeksConfig {
    /// Maximum absolute net delta.
    pub max_delta: Option<f64>,
    /// Maximum net gamma.
    pub max_gamma: Option<f64>,
    /// Maximum net vega (per unit of volatility).
    pub max_vega: Option<f64>,
    /// Minimum net theta (per year). Long straddles bleed theta, so this is
    /// a floor on decay, typically negative.
    pub min_theta: Option<f64>,
}

/// Aggregated portfolio Greeks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    /// Number of straddles included.
    pub position_count: usize,
    /// Number of forwards included.
    pub forward_count: usize,
}

impl PortfolioGreeks {
    /// Sum Greeks over the open positions in `positions`.
    pub fn from_positions<'a, I>(positions: I) -> Self
    where
        I: IntoIterator<Item = &'a StraddlePosition>,
    {
        let mut greeks = Self::default();

        for position in positions {
            if !position.is_open() {
                continue;
            }
            greeks.add(position.greeks());
        }

        greeks
    }

    /// Add the delta of `forwards`.
    pub fn with_forwards<'a, I>(mut self, forwards: I) -> Self
    where
        I: IntoIterator<Item = &'a ForwardPosition>,
    {
        for forward in forwards {
            self.delta += forward.delta();
            self.forward_count += 1;
        }
        self
    }

    fn add(&mut self, g: Greeks) {
        self.delta += g.delta;
        self.gamma += g.gamma;
        self.vega += g.vega;
        self.theta += g.theta;
        self.position_count += 1;
    }

    pub fn as_greeks(&self) -> Greeks {
        Greeks {
            delta: self.delta,
            gamma: self.gamma,
            vega: self.vega,
            theta: self.theta,
        }
    }

    /// Exposures normalized by portfolio value at the given spot.
    pub fn exposure(&self, spot: f64, portfolio_value: f64) -> RiskExposure {
        if portfolio_value == 0.0 {
            return RiskExposure::default();
        }

        RiskExposure {
            delta_pct: self.delta * spot / portfolio_value,
            gamma_pct: self.gamma * spot * spot / 100.0 / portfolio_value,
            vega_bps: self.as_greeks().vega_per_point() * 10_000.0 / portfolio_value,
            theta_bps: self.as_greeks().theta_per_day() * 10_000.0 / portfolio_value,
        }
    }

    /// Check if portfolio is within configured limits.
    pub fn check_limits(&self, config: &PortfolioGreeksConfig) -> GreeksLimitCheck {
        let mut violations = Vec::new();

        if let Some(max) = config.max_delta {
            if self.delta.abs() > max {
                violations.push(format!("Delta {:.4} exceeds limit {:.4}", self.delta, max));
            }
        }

        if let Some(max) = config.max_gamma {
            if self.gamma > max {
                violations.push(format!("Gamma {:.6} exceeds limit {:.6}", self.gamma, max));
            }
        }

        if let Some(max) = config.max_vega {
            if self.vega > max {
                violations.push(format!("Vega {:.2} exceeds limit {:.2}", self.vega, max));
            }
        }

        if let Some(min) = config.min_theta {
            if self.theta < min {
                violations.push(format!("Theta {:.2} below minimum {:.2}", self.theta, min));
            }
        }

        GreeksLimitCheck {
            is_within_limits: violations.is_empty(),
            violations,
        }
    }
}

/// Net Greeks scaled to the portfolio:
/// - `delta_pct`: P&L as a fraction of portfolio value per 100% spot move
/// - `gamma_pct`: change in `delta_pct` per 1% spot move
/// - `vega_bps`: basis points of portfolio value per vol point
/// - `theta_bps`: basis points of portfolio value per calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskExposure {
    pub delta_pct: f64,
    pub gamma_pct: f64,
    pub vega_bps: f64,
    pub theta_bps: f64,
}

/// Result of checking Greeks limits.
#[derive(Debug, Clone)]
pub struct GreeksLimitCheck {
    pub is_within_limits: bool,
    pub violations: Vec<String>,
}
