use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipscribe::transcribe::EngineStatus;
use clipscribe::{output, Cli, Commands, Config, TranscriptionEngine, TranscriptionRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "clipscribe=debug" } else { "clipscribe=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(cli.config.as_deref()).await?;

    // Ctrl-C stops new work and kills running tools; work dirs are still removed
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling remaining work");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Transcribe {
            videos,
            topic_a,
            topic_b,
            no_whisper,
            no_deepgram,
            max_videos,
            concurrency,
            output,
            format,
        } => {
            let engine = TranscriptionEngine::new(config)?;

            let request = TranscriptionRequest {
                video_ids: videos,
                topics: topic_a.zip(topic_b),
                use_whisper: !no_whisper,
                use_deepgram: !no_deepgram,
                max_videos,
                concurrency: concurrency.map(usize::from),
            };

            let progress = if cli.quiet { None } else { Some(batch_progress()?) };
            let report = engine.run_with_progress(request, &cancel, progress).await?;

            match output {
                Some(path) => {
                    output::save_to_file(&report, &path, &format).await?;
                    println!("Report saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&report, &format)?;
                }
            }
        }
        Commands::Search { query, max_results } => {
            let engine = TranscriptionEngine::new(config)?;
            let videos = engine.search(&query, max_results, &cancel).await?;

            if videos.is_empty() {
                println!("No videos found for: {}", query);
            }
            for video in videos {
                let duration = video
                    .duration_secs
                    .map(|d| clipscribe::utils::format_duration(d as f64))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{}  {}  [{}]  {}",
                    style(&video.id).cyan(),
                    video.title,
                    duration,
                    style(&video.channel).dim()
                );
            }
        }
        Commands::Status => {
            let engine = TranscriptionEngine::new(config)?;
            print_status(&engine.status().await);
        }
        Commands::Config { show } => {
            let path = match cli.config {
                Some(path) => path,
                None => Config::config_path()?,
            };
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", path.display());
                println!(
                    "Edit it, or set {} / {}, to enable the paid layers.",
                    clipscribe::config::WHISPER_KEY_ENV,
                    clipscribe::config::DEEPGRAM_KEY_ENV
                );
            }
        }
    }

    Ok(())
}

fn batch_progress() -> Result<ProgressBar> {
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );
    Ok(progress)
}

fn print_status(status: &EngineStatus) {
    let mark = |ok: bool| if ok { style("✓").green() } else { style("✗").red() };

    println!("{}", style("Paid services").bold());
    for service in &status.services {
        println!(
            "  {} {} ({})",
            mark(service.configured),
            service.name,
            if service.configured { "configured" } else { "no credentials" }
        );
    }

    println!("{}", style("External tools").bold());
    for tool in &status.tools {
        println!(
            "  {} {} {}",
            mark(tool.installed),
            tool.name,
            tool.version.as_deref().unwrap_or("not found")
        );
    }

    println!("{}", style("Fallback chain").bold());
    println!("  {}", status.fallback_chain.join(" -> "));
}
