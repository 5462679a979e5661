mod commands;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watch_core::{HttpRetriever, Monitor, OwnerId, ProjectStore, RetrievalChain, WatchConfig};

use crate::commands::{render_event, Command, Reply};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = WatchConfig::load();
    let http = HttpRetriever::new(config.retrieval.clone())?;
    let retriever = RetrievalChain::new().with_strategy(Arc::new(http));
    let (event_tx, mut event_rx) = mpsc::channel(config.scheduler.event_buffer.max(1));
    let monitor = Monitor::new(
        ProjectStore::new(),
        Arc::new(retriever),
        config.scheduler.clone(),
        event_tx,
    );
    let owner = local_owner();
    info!(owner = %owner, "pagewatch ready");
    println!("{}", commands::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => match command.run(&monitor, &owner).await {
                        Reply::Text(text) => println!("{text}"),
                        Reply::Silent => {}
                    },
                    Err(usage) => println!("{usage}"),
                }
            }
            Some(event) = event_rx.recv() => {
                println!("{}", render_event(&event));
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Projects belong to the local user; every terminal session shares them.
fn local_owner() -> OwnerId {
    let name = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_owned());
    OwnerId::new(name)
}
