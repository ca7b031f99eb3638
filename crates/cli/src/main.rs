mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::process;

use cartilla_core::{LeakFlow, PressureTable};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::prelude::ToPrimitive;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Leak-flow thresholds for station line-tightness inspections.
#[derive(Parser)]
#[command(
    name = "cartilla",
    version,
    about = "Leak-flow thresholds for line-tightness inspections"
)]
struct Cli {
    /// Configuration file (defaults to ./cartilla.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up the leak-flow threshold (GPH) for an operating pressure (PSI)
    LeakFlow {
        /// Operating pressure in PSI
        #[arg(allow_negative_numbers = true)]
        psi: String,
        /// Pressure table file (JSON or TOML) instead of the configured one
        #[arg(long)]
        table: Option<PathBuf>,
    },

    /// Inspect pressure table files
    Table {
        #[command(subcommand)]
        command: TableCommands,
    },
}

#[derive(Subcommand)]
enum TableCommands {
    /// Validate a pressure table file
    Check {
        /// Path to the table file
        file: PathBuf,
    },
    /// Print the effective pressure table
    Show {
        /// Pressure table file (JSON or TOML) instead of the configured one
        #[arg(long)]
        table: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if let Err(e) = logging::init(&config.logging) {
        report_error(&e, cli.output, cli.quiet);
        process::exit(1);
    }

    match cli.command {
        Commands::LeakFlow { psi, table } => {
            cmd_leak_flow(&psi, table.as_deref(), &config, cli.output, cli.quiet)
        }
        Commands::Table { command } => match command {
            TableCommands::Check { file } => cmd_table_check(&file, cli.output, cli.quiet),
            TableCommands::Show { table } => {
                cmd_table_show(table.as_deref(), &config, cli.output, cli.quiet)
            }
        },
    }
}

fn cmd_leak_flow(
    psi: &str,
    table: Option<&Path>,
    config: &config::Config,
    output: OutputFormat,
    quiet: bool,
) {
    let table = load_table_or_exit(table, config, output, quiet);

    let flow = match psi
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid pressure input: '{}' is not a number", psi))
        .and_then(|v| table.leak_flow(v).map_err(|e| e.to_string()))
    {
        Ok(f) => f,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    tracing::debug!(psi = %flow.psi, gph = %flow.gph, method = %flow.method, "computed leak flow");

    match output {
        OutputFormat::Json => print_json(&flow, output, quiet),
        OutputFormat::Text => print_flow(&flow, quiet),
    }
}

fn print_flow(flow: &LeakFlow, quiet: bool) {
    println!("{} GPH", flow.gph);
    if !quiet {
        println!("method: {}", flow.method);
        println!("{}", flow.explanation);
    }
}

fn cmd_table_check(file: &Path, output: OutputFormat, quiet: bool) {
    let table = match config::read_table(file) {
        Ok(t) => t,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "valid": true,
                "entries": table.len(),
                "minPsi": table.min().psi.to_f64(),
                "maxPsi": table.max().psi.to_f64(),
            });
            print_json(&summary, output, quiet);
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "valid ({} entries, {}-{} PSI)",
                    table.len(),
                    table.min().psi,
                    table.max().psi
                );
            }
        }
    }
}

fn cmd_table_show(
    table: Option<&Path>,
    config: &config::Config,
    output: OutputFormat,
    quiet: bool,
) {
    let table = load_table_or_exit(table, config, output, quiet);
    match output {
        OutputFormat::Json => print_json(&table, output, quiet),
        OutputFormat::Text => {
            for entry in table.entries() {
                println!("{entry}");
            }
        }
    }
}

fn load_table_or_exit(
    explicit: Option<&Path>,
    config: &config::Config,
    output: OutputFormat,
    quiet: bool,
) -> PressureTable {
    match config::resolve_table(explicit, config) {
        Ok(t) => t,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T, output: OutputFormat, quiet: bool) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            report_error(&format!("could not serialize output: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

/// Report an error to stderr in the requested format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
