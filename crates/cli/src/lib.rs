pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tendero_agent::runtime::ChatRequest;

#[derive(Debug, Parser)]
#[command(
    name = "tendero",
    about = "Tendero operator CLI",
    long_about = "Operate the Tendero order assistant: migrations, demo catalog, config inspection and one-off chat turns.",
    after_help = "Examples:\n  tendero migrate\n  tendero seed\n  tendero chat --chat-id demo \"I want 3 extinguishers\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo safety-store catalog (skipped when already present)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Send one customer message through the runtime and print the reply")]
    Chat {
        #[arg(long, help = "Conversation id; reuse it to continue the same order")]
        chat_id: String,
        #[arg(long, help = "Tone for generated replies")]
        tone: Option<String>,
        #[arg(long, help = "Extra instructions for generated replies")]
        instructions: Option<String>,
        #[arg(long, help = "LLM provider to use for this turn")]
        llm: Option<String>,
        #[arg(help = "Customer message")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Chat { chat_id, tone, instructions, llm, message } => {
            commands::chat::run(ChatRequest { message, chat_id, tone, instructions, llm })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
