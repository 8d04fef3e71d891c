pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "vitalis",
    about = "Vitalis health data analysis CLI",
    long_about = "Ask analysis questions, run analysis scripts directly, and check runtime readiness.",
    after_help = "Examples:\n  vitalis ask \"How many smokers have chronic kidney disease?\"\n  vitalis script \"health | where Smoking == 1 | count\"\n  vitalis doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a natural-language question and print the response with its trace")]
    Ask {
        query: String,
        #[arg(long, help = "Override agent.max_steps for this question")]
        max_steps: Option<u32>,
    },
    #[command(about = "Run an analysis script over the datasets without a language model")]
    Script { code: String },
    #[command(about = "Print the schema description given to the model")]
    Schema,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model credentials, and dataset readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query, max_steps } => commands::ask::run(&query, max_steps),
        Command::Script { code } => commands::script::run(&code),
        Command::Schema => commands::schema::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
