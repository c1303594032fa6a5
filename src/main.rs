use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod ai;
mod app;
mod clock;
mod config;
mod db;
mod error;
#[cfg(test)]
mod log_capture;
mod models;
mod queue;
mod rate_limit;
mod reports;
mod server;
mod services;
mod worker;

use app::App;
use config::Config;
use error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Info and above unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let check_ai = args.len() >= 2 && args[1] == "--check-ai";
    let print_queue_depth = args.len() >= 2 && args[1] == "--queue-depth";

    let config = Config::load()?;
    let app = Arc::new(App::new(&config).await?);

    if check_ai {
        match app.check_ai().await {
            Ok(reply) => println!("AI service OK ({}): {}", config.generation.summary_model, reply.trim()),
            Err(e) => {
                eprintln!("AI service check failed: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if print_queue_depth {
        println!("{}: {}", app.queue.name(), app.queue_depth().await);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let background = app.spawn_background(&shutdown);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
            shutdown.cancel();
        });
    }

    let result = server::serve(Arc::clone(&app), shutdown.clone()).await;
    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            error!(error = %e, "background task panicked");
        }
    }

    result
}
