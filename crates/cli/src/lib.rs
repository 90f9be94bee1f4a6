pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    about = "Stratus weather gateway operator CLI",
    long_about = "Inspect configuration, check provider readiness, and run one chat turn locally.",
    after_help = "Examples:\n  stratus doctor --json\n  stratus config\n  stratus ask \"weather in Oslo\" --unit fahrenheit"
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
    #[command(about = "Validate config and check weather provider reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one chat turn through the full gateway in-process")]
    Ask {
        #[arg(help = "Message to send to the assistant")]
        message: String,
        #[arg(long, help = "Temperature unit: celsius, fahrenheit or kelvin")]
        unit: Option<String>,
        #[arg(long, help = "Continue an existing session")]
        session: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { message, unit, session } => {
            commands::ask::run(&message, unit.as_deref(), session.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
