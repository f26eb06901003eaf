use std::io;

use clap::{Parser, ValueEnum};
use pgframes::commands::Commands;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogFormat {
    #[default]
    Human,
    Json,
}

impl From<LogFormat> for logutil::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Human => logutil::LogFormat::HumanReadable,
            LogFormat::Json => logutil::LogFormat::Json,
        }
    }
}

#[derive(Parser)]
#[clap(name = "pgframes")]
#[clap(version)]
#[clap(about = "Move tables between CSV, Postgres, and in-memory queries", long_about = None)]
#[clap(arg_required_else_help = true)]
struct Cli {
    /// Format of the logs written to stderr.
    #[clap(long, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    #[clap(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();
    logutil::configure_global_logger(tracing::Level::INFO, cli.log_format.into(), io::stderr);

    if let Err(err) = cli.command.run() {
        println!("ERROR: {err:#}");
        std::process::exit(1);
    }
}
