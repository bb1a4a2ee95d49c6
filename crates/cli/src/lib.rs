pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "catalogbot",
    about = "Catalogbot operator CLI",
    long_about = "Apply migrations, check readiness, inspect configuration and talk to the catalog assistant locally.",
    after_help = "Examples:\n  catalogbot doctor --json\n  catalogbot config\n  catalogbot chat --seller 2348012345678"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, WhatsApp and model credentials, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Chat with the catalog assistant as a seller, without WhatsApp")]
    Chat {
        #[arg(long, help = "Seller contact the session acts as, e.g. a phone number")]
        seller: String,
        #[arg(long, help = "Keep the catalog and conversation in memory instead of the database")]
        ephemeral: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Chat { seller, ephemeral } => commands::chat::run(&seller, ephemeral),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
