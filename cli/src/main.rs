//! CurRate CLI
//!
//! Converts USD and EUR amounts into roubles at the official Central Bank
//! of Russia rate for a given date.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use currate_common::{format_display_date, parse_display_date, Clock, Currency, RateData, SystemClock};
use currate_fx::{CbrRateProvider, Converter, FxConfig, FxError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod amount;
mod app;

use app::{translate_error, App, ConvertRequest};

/// CurRate CLI
#[derive(Parser, Debug)]
#[command(name = "currate")]
#[command(about = "Convert USD and EUR to RUB at the Central Bank of Russia rate")]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an amount into roubles
    Convert {
        /// Amount, e.g. 1000, "1 000" or 1000,50
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// USD, EUR or RUB
        currency: String,

        /// Rate date as DD.MM.YYYY (default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the rate for one currency
    Rate {
        /// USD, EUR or RUB
        currency: String,

        /// Rate date as DD.MM.YYYY (default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the full published snapshot
    Rates {
        /// Rate date as DD.MM.YYYY (default: latest published)
        #[arg(short, long)]
        date: Option<String>,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = FxConfig::from_env();
    init_tracing(&config.log_level, args.log_json);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    info!(endpoint = %config.endpoint, "Starting CurRate");

    match args.command {
        Command::Convert {
            amount,
            currency,
            date,
            json,
        } => {
            let amount = match amount::parse_amount(&amount) {
                Ok(amount) => amount,
                Err(e) => {
                    eprintln!("Неверная сумма: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            };

            let app = App::new(Arc::new(Converter::from_config(&config)?));
            let request = ConvertRequest {
                amount,
                currency,
                date: date.unwrap_or_else(today),
            };
            let response = app.convert(&request).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if response.success {
                println!("{}", response.result);
                if response.actual_date != response.requested_date {
                    println!("Курс ЦБ РФ на {}", response.actual_date);
                }
            } else {
                eprintln!("{}", response.error);
            }

            Ok(exit_code(response.success))
        }

        Command::Rate {
            currency,
            date,
            json,
        } => {
            let app = App::new(Arc::new(Converter::from_config(&config)?));
            let date = date.unwrap_or_else(today);
            let response = app.get_rate(&currency, &date).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if response.success {
                println!("{}", format!("{:.4}", response.rate).replace('.', ","));
            } else {
                eprintln!("{}", response.error);
            }

            Ok(exit_code(response.success))
        }

        Command::Rates { date, json } => {
            let provider = CbrRateProvider::from_config(&config)
                .context("failed to build HTTP client")?;

            let date = match date.as_deref().map(parse_display_date).transpose() {
                Ok(date) => date,
                Err(_) => {
                    eprintln!(
                        "Неверный формат даты: {}. Используйте формат ДД.ММ.ГГГГ",
                        date.unwrap_or_default()
                    );
                    return Ok(ExitCode::FAILURE);
                }
            };

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling fetch");
                    on_interrupt.cancel();
                }
            });

            let fetched = match date {
                Some(date) => provider.fetch_rates_with_cancel(date, &cancel).await,
                None => provider.latest_rates_with_cancel(&cancel).await,
            };

            let data = match fetched {
                Ok(data) => data,
                Err(e) => {
                    eprintln!("{}", translate_error(&FxError::Provider(e)));
                    return Ok(ExitCode::FAILURE);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_snapshot(&data, date);
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn today() -> String {
    format_display_date(SystemClock.today())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_snapshot(data: &RateData, requested: Option<NaiveDate>) {
    println!("Курсы ЦБ РФ на {}", format_display_date(data.date));
    if let Some(requested) = requested.filter(|d| *d != data.date) {
        println!("(запрошено на {})", format_display_date(requested));
    }

    for currency in Currency::ALL.into_iter().filter(|c| !c.is_domestic()) {
        if let Some(rate) = data.rate(currency) {
            println!(
                "{} {:<12} {:>6} {:>12} руб.",
                currency.code(),
                currency.name(),
                rate.nominal,
                format!("{:.4}", rate.rate).replace('.', ",")
            );
        }
    }
}
