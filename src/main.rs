//! kolosal-credit - command-line entry point

use clap::Parser;
use kolosal_credit::cli::{cmd_info, cmd_predict, cmd_serve, cmd_train, Cli, Commands, TrainArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_credit=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, output, config, transform, trials, folds, seed, study_dir } => {
            let args = TrainArgs { data, output, config, transform, trials, folds, seed, study_dir };
            tokio::task::spawn_blocking(move || cmd_train(args)).await??;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Serve { host, port, model } => {
            cmd_serve(host, port, model).await?;
        }
        Commands::Info { model } => {
            cmd_info(&model)?;
        }
    }

    Ok(())
}
