pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rxroute",
    about = "rxroute operator CLI",
    long_about = "Apply migrations, load the demo catalog, check readiness, and inspect routing decisions.",
    after_help = "Examples:\n  rxroute doctor --json\n  rxroute seed\n  rxroute route --product prod-tirzepatide-5mg --state FL"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo pharmacy catalog and verify that it routes as expected")]
    Seed,
    #[command(about = "Validate config, routing mode readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute the routing decision for one product and destination state")]
    Route {
        #[arg(long, help = "Product id to route")]
        product: String,
        #[arg(long, help = "Two-letter destination state code")]
        state: String,
        #[arg(long, help = "Topline rep whose scoping applies to the order")]
        rep: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Route { product, state, rep } => {
            commands::route::run(&product, &state, rep.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
