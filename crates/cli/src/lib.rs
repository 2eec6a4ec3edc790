pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use configurator_core::config::{AppConfig, LoadOptions, LogFormat};
use rust_decimal::Decimal;

use crate::commands::open::OpenArgs;

#[derive(Debug, Parser)]
#[command(
    name = "configurator",
    about = "CRM product configurator CLI",
    long_about = "Inspect configurator snapshots, open live configuration sessions, and review effective config.",
    after_help = "Examples:\n  configurator config\n  configurator inspect values.json\n  configurator open --template 10 --quantity 4"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Build a session from a recorded get_values response and report its state")]
    Inspect {
        #[arg(help = "Path to a JSON file holding a get_values result")]
        snapshot: PathBuf,
    },
    #[command(about = "Open a configuration session against the backend and report its state")]
    Open {
        #[arg(long, help = "Product template to configure")]
        template: i64,
        #[arg(long, default_value = "1", help = "Quantity of the main product")]
        quantity: Decimal,
        #[arg(long = "ptav", help = "Attribute value of the line being edited (repeatable)")]
        prior_combination: Vec<i64>,
        #[arg(long, help = "Load the main product only")]
        edit: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Inspect { snapshot } => commands::inspect::run(&snapshot),
        Command::Open { template, quantity, prior_combination, edit } => {
            commands::open::run(OpenArgs { template_id: template, quantity, prior_combination, edit })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command payloads on stdout stay parseable.
fn init_logging() {
    use tracing::Level;
    use LogFormat::*;

    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_writer(std::io::stderr).with_target(false).with_max_level(log_level);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}
