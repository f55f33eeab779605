use anyhow::Result;
use clap::Parser;
use console::style;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polydub::cli::{Cli, Commands};
use polydub::config::Config;
use polydub::media::FfmpegProcessor;
use polydub::pipeline::DubbingPipeline;
use polydub::provider::{DubParams, ElevenLabsClient};
use polydub::transcript::TranscriptFetcher;
use polydub::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG overrides the flag-derived default
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Check for required external dependencies (non-fatal in Docker)
    let missing_deps = utils::check_dependencies().await;
    if !cli.quiet && !missing_deps.is_empty() {
        eprintln!("{} dependency check warnings:", style("⚠").yellow().bold());
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    let config = Config::load().await?;

    match cli.command {
        Commands::Dub {
            input,
            language,
            output_dir,
            api_key,
            no_watermark,
            max_concurrent,
        } => {
            let api_key = api_key
                .or_else(|| {
                    if config.provider.api_key.is_empty() {
                        None
                    } else {
                        Some(config.provider.api_key.clone())
                    }
                })
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "No API key configured. Pass --api-key, set ELEVENLABS_API_KEY, or edit the config file."
                    )
                })?;

            let language = language
                .or_else(|| config.provider.default_language.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "No target language given. Pass --language or set a default in the config file."
                    )
                })?;

            let mut params = DubParams::new(language);
            params.watermark = config.provider.watermark && !no_watermark;

            let provider = ElevenLabsClient::with_base_url(api_key, &config.provider.base_url);
            let output_dir = output_dir.unwrap_or_else(|| config.app.output_dir.clone());

            let pipeline = DubbingPipeline::new(
                Arc::new(provider),
                Arc::new(FfmpegProcessor::new()),
                config.waiter(),
                output_dir,
            )?;

            if input.is_dir() {
                let max_concurrent = max_concurrent.unwrap_or(config.app.max_concurrent_jobs);
                let start = std::time::Instant::now();

                let summary = pipeline.run_batch(&input, &params, max_concurrent).await?;

                println!(
                    "Processing complete in {}. Successfully dubbed: {}, Failed: {}",
                    utils::format_duration(start.elapsed().as_secs_f64()),
                    summary.success_count(),
                    summary.failure_count()
                );

                for (clip, error) in &summary.failed {
                    eprintln!("  {} {}: {}", style("failed").red(), clip.display(), error);
                }

                if summary.success_count() == 0 {
                    anyhow::bail!("No clips were dubbed successfully");
                }
            } else {
                let output = pipeline.run(&input, &params).await?;
                println!("Dubbed video written to: {}", output.display());
            }
        }
        Commands::Transcript { url, output } => {
            let fetcher = TranscriptFetcher::new();
            let transcript = fetcher.fetch(&url).await?;

            match output {
                Some(path) => {
                    fs_err::write(&path, transcript)?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => {
                    println!("{}", transcript);
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                config.interactive_setup().await?;
            }
        }
        Commands::Languages => {
            println!("Common dubbing language codes:");
            println!("  • hi  - Hindi");
            println!("  • ta  - Tamil");
            println!("  • en  - English");
            println!("  • es  - Spanish");
            println!("  • fr  - French");
            println!("  • de  - German");
            println!("  • pt  - Portuguese");
            println!("  • ja  - Japanese");
            println!("  (See the ElevenLabs dubbing docs for the full list)");
        }
    }

    Ok(())
}
