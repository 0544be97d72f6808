//! ts3query - command line client for TeamSpeak 3 ServerQuery
//!
//! Connects using `TS3_*` environment variables, optionally logs in and
//! selects a virtual server, runs every command given on the command line
//! and prints each result as JSON. With `TS3_EVENTS` set on a selected
//! server, notifications are streamed as JSON until interrupted.

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ts3query::error::Result;
use ts3query::{Config, QueryClient, Session};

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if std::env::var("TS3_DEBUG")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
        {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let commands: Vec<String> = std::env::args().skip(1).collect();

    if config.debug {
        info!("Debug mode enabled");
    }

    let client = QueryClient::connect(&config.host, config.port, config.client_options()).await?;
    let session = Session::open(&client, &config.target()).await?;

    for command in &commands {
        let result = client.execute(command).await?;
        if !result.success {
            warn!("{} failed: {}", command, result.message);
        }
        println!("{}", serde_json::to_string(&result)?);
    }

    match &session {
        Session::Server(server) if !config.events.is_empty() => {
            for event in &config.events {
                server.notify_register(*event).await?;
            }
            info!("Listening for notifications on {}", client.peer());

            loop {
                tokio::select! {
                    events = server.events(true) => {
                        for event in events? {
                            println!("{}", serde_json::to_string(&event)?);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }
        }
        Session::Admin(_) if !config.events.is_empty() => {
            warn!("TS3_EVENTS ignored: notifications need TS3_SERVER_PORT or TS3_SERVER_ID");
        }
        Session::Admin(_) | Session::Server(_) | Session::Transfer(_) => {}
    }

    for event in client.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }

    // Cleanup
    client.disconnect().await;

    Ok(())
}
