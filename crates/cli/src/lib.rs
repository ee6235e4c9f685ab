pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "entops",
    about = "Entops operator CLI",
    long_about = "Check runtime readiness, apply migrations, and scan migration files for destructive statements.",
    after_help = "Examples:\n  entops doctor --json\n  entops migrate\n  entops check-migration migrations/0002_add_index.sql"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an entops.toml configuration file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, critical settings, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate {
        #[arg(long, help = "Apply pending migrations even when they drop or truncate data")]
        allow_destructive: bool,
    },
    #[command(about = "Scan a SQL migration file for destructive operations")]
    CheckMigration {
        #[arg(help = "Path to the SQL file to scan")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(cli.config, json),
        Command::Migrate { allow_destructive } => {
            commands::migrate::run(cli.config, allow_destructive)
        }
        Command::CheckMigration { file } => commands::check_migration::run(&file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
