// main.rs
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arcana::cli::{self, Cli, Commands};
use arcana::shell;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Shell {
            user_id,
            data_dir,
            provider,
            model,
            referrer,
        } => shell::handle_shell(user_id, data_dir, provider, model, referrer).await,
        Commands::Card {
            user_id,
            data_dir,
            provider,
            model,
        } => cli::handle_card(user_id, data_dir, provider, model).await,
        Commands::Spread {
            question,
            user_id,
            data_dir,
            provider,
            model,
        } => cli::handle_spread(question, user_id, data_dir, provider, model).await,
        Commands::Clarify {
            question,
            user_id,
            data_dir,
            provider,
            model,
        } => cli::handle_clarify(question, user_id, data_dir, provider, model).await,
        Commands::Gift { user_id, data_dir } => cli::handle_gift(user_id, data_dir).await,
        Commands::Status { user_id, data_dir } => cli::handle_status(user_id, data_dir).await,
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}
