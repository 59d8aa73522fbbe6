use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipscribe::cli::{Cli, Commands};
use clipscribe::output;
use clipscribe::pipeline::{PipelineController, ProgressCallback, TranscriptMode};
use clipscribe::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "clipscribe=debug"
    } else {
        "clipscribe=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().await?;

    match cli.command {
        Commands::Transcribe {
            url,
            api_key,
            mode,
            output,
            format,
        } => {
            let mode: TranscriptMode = mode.into();
            let api_key = match (mode, api_key) {
                (TranscriptMode::Speech, None) => {
                    anyhow::bail!(
                        "speech mode needs an API key; pass --api-key or set CLIPSCRIBE_API_KEY"
                    )
                }
                (_, key) => key.unwrap_or_default(),
            };

            let controller = PipelineController::from_config(&config)?;

            let bar = if cli.quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new(100)
            };
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                    .unwrap(),
            );

            let progress_bar = bar.clone();
            let on_progress: ProgressCallback = Arc::new(move |event| {
                progress_bar.set_position(event.percent as u64);
                progress_bar.set_message(event.phase.label());
            });

            tracing::info!("Starting transcript extraction for {}", url);
            let result = controller.run(&url, &api_key, mode, on_progress).await?;
            bar.finish_and_clear();

            match output {
                Some(path) => {
                    output::save_to_file(&result, &path, &format).await?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&result, &format)?;
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                config.save().await?;
                println!("Configuration written to the default location");
            }
        }
    }

    Ok(())
}
