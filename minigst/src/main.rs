// main.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use minigst::gst::{EventReceiver, Pipeline, PipelineEvent, State, StateChangeReturn};
use minigst::{parse_launch, MinigstError};

const DEFAULT_PIPELINE: &str = "livesrc rate=30 ! videoenc gop-size=30 ! queue max-size=10 leaky=upstream ! hlssegmenter target-duration=6 ! uploadsink bucket=live-streams sync=true";

// Exit codes matching gst-launch
const EXIT_CODE_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "minigst-launch")]
#[command(author = "Stéphane Cerveau")]
#[command(version)]
#[command(about = "MiniGst launcher - build and run a pipeline from a text description")]
struct Args {
    /// Pipeline description, e.g. "livesrc ! queue ! fakesink"
    #[arg(short = 'p', long, env = "MINIGST_PIPELINE", default_value = DEFAULT_PIPELINE)]
    pipeline: String,

    /// Request end of stream after this many seconds
    #[arg(short = 'd', long, env = "MINIGST_DURATION")]
    duration: Option<f64>,

    /// Seconds to wait for the pipeline to drain after an EOS request
    #[arg(long, default_value_t = 5.0)]
    eos_timeout: f64,

    /// Print the final element statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug)]
enum RunOutcome {
    Eos,
    Error(String),
    Interrupted,
}

async fn wait_for_end(events: &mut EventReceiver) -> RunOutcome {
    loop {
        match events.recv().await {
            Ok(PipelineEvent::Eos { pipeline }) => {
                info!("Pipeline '{}' reached EOS", pipeline);
                return RunOutcome::Eos;
            }
            Ok(PipelineEvent::Error { source, message }) => {
                return RunOutcome::Error(format!("{}: {}", source, message));
            }
            Ok(event) => debug!("Event: {:?}", event),
            Err(RecvError::Lagged(n)) => warn!("Event receiver lagged by {} messages", n),
            Err(RecvError::Closed) => {
                return RunOutcome::Error("event channel closed".to_string());
            }
        }
    }
}

/// Run a blocking state change off the async runtime threads.
async fn set_state(pipeline: &Arc<Pipeline>, state: State) -> minigst::Result<StateChangeReturn> {
    let pipeline = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || pipeline.set_state(state))
        .await
        .map_err(|e| MinigstError::StateChangeFailed(format!("state change task failed: {}", e)))?
}

fn print_stats(pipeline: &Pipeline, json: bool) -> minigst::Result<()> {
    let stats = pipeline.stats();
    if json {
        let map: serde_json::Map<String, serde_json::Value> = stats.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        println!("Statistics:");
        for (name, value) in stats {
            println!("  {}: {}", name, value);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("minigst=info".parse()?)
                .add_directive("minigst_launch=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if let Some(duration) = args.duration {
        if !(duration.is_finite() && duration > 0.0) {
            error!("--duration must be a positive number of seconds");
            std::process::exit(EXIT_CODE_ERROR);
        }
    }
    if !(args.eos_timeout.is_finite() && args.eos_timeout >= 0.0) {
        error!("--eos-timeout must be a non-negative number of seconds");
        std::process::exit(EXIT_CODE_ERROR);
    }

    let pipeline = match parse_launch(&args.pipeline) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Failed to create pipeline: {}", e);
            std::process::exit(EXIT_CODE_ERROR);
        }
    };
    info!("Created pipeline '{}': {}", pipeline.name(), args.pipeline);

    // Subscribe before playing so no event is missed
    let mut events = pipeline.subscribe();

    if let Err(e) = set_state(&pipeline, State::Playing).await {
        error!("Failed to start pipeline: {}", e);
        let _ = set_state(&pipeline, State::Null).await;
        std::process::exit(EXIT_CODE_ERROR);
    }
    info!("Pipeline '{}' playing. Press Ctrl+C to stop.", pipeline.name());

    // Register signal handlers before entering select! (registration is synchronous and fallible)
    #[cfg(unix)]
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C");
        }
    };

    let duration_elapsed = async {
        match args.duration {
            Some(seconds) => {
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                info!("Requested duration of {}s elapsed", seconds);
            }
            None => std::future::pending().await,
        }
    };

    let mut outcome = tokio::select! {
        outcome = wait_for_end(&mut events) => outcome,
        _ = duration_elapsed => RunOutcome::Interrupted,
        _ = shutdown_signal => RunOutcome::Interrupted,
    };

    if matches!(outcome, RunOutcome::Interrupted) {
        // Let the sources finish their stream so pending data is flushed
        if pipeline.send_eos() {
            let timeout = Duration::from_secs_f64(args.eos_timeout);
            match tokio::time::timeout(timeout, wait_for_end(&mut events)).await {
                Ok(end) => outcome = end,
                Err(_) => warn!("Pipeline did not reach EOS within {:?}", timeout),
            }
        }
    }

    let mut exit_code = 0;
    if let RunOutcome::Error(message) = &outcome {
        error!("Pipeline error: {}", message);
        exit_code = EXIT_CODE_ERROR;
    }

    // Graceful shutdown
    info!("Shutting down...");
    if let Err(e) = set_state(&pipeline, State::Ready).await {
        error!("Failed to stop pipeline: {}", e);
        exit_code = EXIT_CODE_ERROR;
    }
    print_stats(&pipeline, args.json)?;
    if let Err(e) = set_state(&pipeline, State::Null).await {
        error!("Failed to reset pipeline: {}", e);
        exit_code = EXIT_CODE_ERROR;
    }

    info!("minigst-launch stopped ({:?})", outcome);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
