//! Kinship chat terminal client entry point.

mod commands;
mod config;
mod render;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use kinship_hub_connection::ConnectionManager;
use kinship_protocol::EventKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Kinship chat");

    let path = config::config_path(
        std::env::args().nth(1),
        std::env::var(config::CONFIG_ENV).ok(),
    );
    let hub_config = config::load(path.as_deref())?;
    tracing::info!(api = %hub_config.api_base_url, "configuration loaded");

    let manager = ConnectionManager::new(hub_config);
    for kind in EventKind::ALL {
        manager.on(kind, |event| println!("{}", render::inbound(&event)));
    }

    let mut events = manager
        .take_events()
        .await
        .context("session events already taken")?;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", render::session(&event));
        }
    });

    manager
        .connect_with(&config::token_from_env)
        .await
        .with_context(|| format!("connecting to hub (token from {})", config::TOKEN_ENV))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };

        match commands::parse(&line) {
            Ok(None) => {}
            Ok(Some(commands::Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = commands::execute(&manager, command).await {
                    eprintln!("error: {e}");
                }
            }
            Err(message) => eprintln!("{message}"),
        }
    }

    manager.disconnect().await;
    tracing::info!("session closed");
    Ok(())
}
