//! NakaPay Watch
//!
//! Tracks a payment from the command line until it completes, fails or
//! expires.
//!
//! ## Usage
//!
//! ```bash
//! # Follow an existing payment
//! nakapay-watch --config nakapay.toml watch p_123
//!
//! # Create a payment, print its invoice, then follow it
//! nakapay-watch --config nakapay.toml create --amount 1000 --description "Coffee"
//! ```
//!
//! Status lines go to stdout, logs to stderr. The exit code is `0` for a
//! completed payment, `1` for failed or expired, `2` for setup errors and
//! `130` when interrupted.

mod observability;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use nakapay_sync::{
    Checkout, PaymentError, PaymentObserver, SyncConfig, SyncEngine, SyncError,
    countdown::format_remaining,
    payment::{CreatePaymentRequest, Metadata, Payment, PaymentStatus},
    transport::{ConnectionState, TransportKind},
};
use observability::{LogFormat, init_observability};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "nakapay-watch")]
#[command(about = "Track a payment until it completes, fails or expires", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(short, long, value_name = "PATH", default_value = "nakapay.toml")]
    config: PathBuf,

    /// Log format (overrides LOG_FORMAT)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow an existing payment
    Watch {
        /// Payment identifier
        #[arg(value_name = "PAYMENT_ID")]
        payment_id: String,
    },

    /// Create a payment, then follow it
    Create {
        /// Amount in the smallest currency unit
        #[arg(short, long)]
        amount: u64,

        /// Description shown to the payer
        #[arg(short, long, default_value = "")]
        description: String,

        /// Metadata as a JSON object
        #[arg(long, value_name = "JSON")]
        metadata: Option<String>,
    },
}

/// Prints one line per notable change.
#[derive(Debug)]
struct ConsoleObserver;

impl ConsoleObserver {
    fn should_print_countdown(remaining: u64) -> bool {
        remaining % 60 == 0 || remaining <= 10
    }
}

impl PaymentObserver for ConsoleObserver {
    fn on_payment_created(&self, payment: &Payment) {
        println!("created  {} ({} sats)", payment.id, payment.amount);
        println!("invoice  {}", payment.invoice);
    }

    fn on_payment_success(&self, payment: &Payment) {
        println!("paid     {}", payment.id);
    }

    fn on_payment_error(&self, error: &PaymentError) {
        println!("error    {error}");
    }

    fn on_connection_change(&self, transport: TransportKind, state: ConnectionState) {
        let state = match state {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        println!("{transport:<8} {state}");
    }

    fn on_countdown(&self, remaining: u64) {
        if Self::should_print_countdown(remaining) {
            println!("expires  {}", format_remaining(remaining));
        }
    }
}

fn parse_metadata(raw: Option<&str>) -> Result<Option<Metadata>, String> {
    raw.map(|raw| {
        serde_json::from_str::<Metadata>(raw).map_err(|e| format!("--metadata must be a JSON object: {e}"))
    })
    .transpose()
}

async fn start(cli: &Cli, config: &SyncConfig, observer: Arc<dyn PaymentObserver>) -> Result<SyncEngine, String> {
    match &cli.command {
        Command::Watch { payment_id } => {
            let payment = Payment {
                id: payment_id.clone(),
                amount: 0,
                description: String::new(),
                invoice: String::new(),
                status: PaymentStatus::Pending,
                metadata: None,
            };
            SyncEngine::start(payment, config, observer).map_err(|e| e.to_string())
        }
        Command::Create { amount, description, metadata } => {
            let mut request = CreatePaymentRequest::new(*amount, description.clone());
            if let Some(metadata) = parse_metadata(metadata.as_deref())? {
                request = request.with_metadata(metadata);
            }
            Checkout::begin(&request, config, observer).await.map_err(|e| e.to_string())
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; only a terminal status ends the run.
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_observability(cli.log_format.unwrap_or_else(LogFormat::from_env), cli.verbose);

    let config = match SyncConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Cannot load configuration");
            return ExitCode::from(2);
        }
    };

    let mut engine = match start(&cli, &config, Arc::new(ConsoleObserver)).await {
        Ok(engine) => engine,
        Err(message) => {
            error!(%message, "Cannot start tracking");
            return ExitCode::from(2);
        }
    };

    match engine.run_until(shutdown_signal()).await {
        Ok(PaymentStatus::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(SyncError::EngineStopped) => {
            println!("stopped  {}", engine.payment().id);
            ExitCode::from(130)
        }
        Err(e) => {
            error!(error = %e, "Tracking failed");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_watch() {
        let cli = Cli::try_parse_from(["nakapay-watch", "-c", "shop.toml", "-vv", "watch", "p1"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("shop.toml"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Watch { ref payment_id } if payment_id == "p1"));
    }

    #[test]
    fn test_cli_parses_create() {
        let cli = Cli::try_parse_from([
            "nakapay-watch",
            "--log-format",
            "json",
            "create",
            "--amount",
            "1000",
            "--description",
            "Coffee",
        ])
        .unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Command::Create { amount: 1000, .. }));
    }

    #[test]
    fn test_parse_metadata() {
        assert_eq!(parse_metadata(None), Ok(None));
        let metadata = parse_metadata(Some(r#"{"order":"42"}"#)).unwrap().unwrap();
        assert_eq!(metadata["order"], "42");
        assert!(parse_metadata(Some("[1,2]")).is_err());
    }

    #[test]
    fn test_countdown_lines_are_throttled() {
        assert!(ConsoleObserver::should_print_countdown(3600));
        assert!(ConsoleObserver::should_print_countdown(120));
        assert!(ConsoleObserver::should_print_countdown(10));
        assert!(ConsoleObserver::should_print_countdown(0));
        assert!(!ConsoleObserver::should_print_countdown(61));
    }
}
