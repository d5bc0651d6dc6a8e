//! # Run a backtest over a CSV of daily closes
//! cryptobacktest run --config config/default.toml --data data/btc_daily.csv
//!
//! # Write the full result (snapshots, trades, anomalies) as JSON
//! cryptobacktest run --data data/btc_daily.csv --output results/btc.json
//!
//! # Month-end 30-day realized volatility
//! cryptobacktest vol --data data/btc_daily.csv --window 30
//!
//! # Price a straddle
//! cryptobacktest price --kind straddle --spot 60000 --strike 60000 --days 30 --vol 0.55

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use cryptobacktest::backtest::{run_backtest, BacktestConfig};
use cryptobacktest::data::{PriceLoader, PriceSource};
use cryptobacktest::pricing::{BlackScholes, Valuation, DAYS_IN_YEAR};
use cryptobacktest::OptionType;

#[derive(Parser)]
#[command(name = "cryptobacktest")]
#[command(about = "Volatility-driven straddle backtester for crypto price series")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest with given configuration
    Run {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Path to price CSV (date,price)
        #[arg(short, long)]
        data: String,

        /// Write the full result as JSON to this path
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Month-end realized volatility of a price CSV
    Vol {
        /// Path to price CSV (date,price)
        #[arg(short, long)]
        data: String,

        /// Log returns per estimate
        #[arg(short, long, default_value_t = 30)]
        window: usize,

        /// Observations per year
        #[arg(long, default_value_t = 365.0)]
        annualization_factor: f64,
    },

    /// Price an option or straddle with Black-Scholes
    Price {
        /// call, put or straddle
        #[arg(short, long, default_value = "straddle")]
        kind: String,

        #[arg(long)]
        spot: f64,

        #[arg(long)]
        strike: f64,

        /// Calendar days to expiry
        #[arg(long)]
        days: f64,

        /// Annualized volatility (0.55 = 55%)
        #[arg(long)]
        vol: f64,

        #[arg(long, default_value_t = 0.0)]
        rate: f64,

        #[arg(long, default_value_t = 0.0)]
        dividend: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cryptobacktest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output,
        } => cmd_run(config, &data, output)?,
        Commands::Vol {
            data,
            window,
            annualization_factor,
        } => cmd_vol(&data, window, annualization_factor)?,
        Commands::Price {
            kind,
            spot,
            strike,
            days,
            vol,
            rate,
            dividend,
        } => cmd_price(&kind, spot, strike, days, vol, rate, dividend)?,
    }

    Ok(())
}

fn cmd_run(config: Option<String>, data: &str, output: Option<String>) -> Result<()> {
    let config = match config {
        Some(path) => BacktestConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => BacktestConfig::default(),
    };

    let history =
        PriceLoader::from_path(data).with_context(|| format!("Failed to load prices {}", data))?;
    info!(
        "Loaded {} prices from {} ({} to {})",
        history.prices().len(),
        data,
        history.first_date(),
        history.last_date()
    );

    let result = run_backtest(config, &history).context("Backtest failed")?;

    println!("{}", result.summary());

    if let Some(path) = output {
        if let Some(parent) = Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path))?;
        println!("\nResult written to {}", path);
    }

    Ok(())
}

fn cmd_vol(data: &str, window: usize, annualization_factor: f64) -> Result<()> {
    let history =
        PriceLoader::from_path(data).with_context(|| format!("Failed to load prices {}", data))?;
    let monthly = history
        .monthly_volatility(window, annualization_factor)
        .with_context(|| format!("Failed to estimate {}-day volatility", window))?;

    println!("{:<8} {:>10}", "month", "vol");
    for estimate in &monthly {
        println!(
            "{:<8} {:>9.2}%",
            estimate.date.format("%Y-%m"),
            estimate.value * 100.0
        );
    }

    Ok(())
}

fn cmd_price(
    kind: &str,
    spot: f64,
    strike: f64,
    days: f64,
    vol: f64,
    rate: f64,
    dividend: f64,
) -> Result<()> {
    let model = BlackScholes::new(rate, dividend);
    let tte = days / DAYS_IN_YEAR;

    let legs: Vec<OptionType> = match kind {
        "straddle" => vec![OptionType::Call, OptionType::Put],
        other => match OptionType::parse(other) {
            Some(option_type) => vec![option_type],
            None => bail!("Unknown kind '{}': expected call, put or straddle", other),
        },
    };

    let mut total: Option<Valuation> = None;
    for option_type in legs {
        let valuation = model
            .value(option_type, spot, strike, tte, vol)
            .with_context(|| format!("Failed to price {}", leg_name(option_type)))?;
        print_valuation(leg_name(option_type), &valuation);

        total = Some(match total {
            Some(t) => Valuation {
                price: t.price + valuation.price,
                greeks: t.greeks + valuation.greeks,
            },
            None => valuation,
        });
    }

    if kind == "straddle" {
        if let Some(total) = total {
            print_valuation("straddle", &total);
        }
    }

    Ok(())
}

fn leg_name(option_type: OptionType) -> &'static str {
    match option_type {
        OptionType::Call => "call",
        OptionType::Put => "put",
    }
}

fn print_valuation(label: &str, valuation: &Valuation) {
    let g = valuation.greeks;
    println!(
        "{:<9} price {:>12.4}  delta {:>8.4}  gamma {:>10.6}  vega/pt {:>10.4}  theta/day {:>10.4}",
        label,
        valuation.price,
        g.delta,
        g.gamma,
        g.vega_per_point(),
        g.theta_per_day()
    );
}
