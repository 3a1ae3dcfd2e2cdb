mod console;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use console::Command;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};
use yate_client::{Callbacks, ClientConfig, QueryOptions, YateClient};

const CONFIG_PATH: &str = "yate.toml";
const CONSOLE_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.into());
    let config = if Path::new(&path).exists() {
        match ClientConfig::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                std::process::exit(1);
            }
        }
    } else {
        ClientConfig::default()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("YATE agent v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Workers: {}, keepalive interval: {} ms",
        config.client.workers, config.client.keepalive_interval_ms
    );

    let server_addr = match config.client.server_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid server_address: {e}");
            std::process::exit(1);
        }
    };

    let callbacks = Callbacks::new()
        .on_connect(|| info!("Proxy acknowledged the connection"))
        .on_disconnect(|| warn!("Lost connection to proxy"))
        .on_voxel_update(|record| info!("Voxel update: {record}"))
        .on_avatar_pos(|pos| info!("Avatar moved to {pos}"));

    let client = YateClient::bind_with_callbacks(config.client.clone(), callbacks)
        .await
        .expect("failed to bind agent socket");

    match server_addr {
        Some(addr) => connect(&client, addr).await,
        None => info!("No server_address configured; use 'connect' once one is set"),
    }

    // Console REPL: read lines from stdin
    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            Some(line) = console_rx.recv() => {
                match console::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(cmd) => handle_command(&client, server_addr, cmd).await,
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }

    client.stop().await;
    info!("Agent shut down.");
}

async fn connect(client: &YateClient, addr: SocketAddr) {
    if let Err(e) = client.connect(addr).await {
        error!("Failed to connect to {addr}: {e}");
    }
}

async fn handle_command(client: &YateClient, server_addr: Option<SocketAddr>, cmd: Command) {
    match cmd {
        Command::Status => {
            let window = client.visual_window();
            info!(
                "State: {}, avatar: {}, window: {} to {}, known voxels: {}",
                client.state(),
                client.avatar_pos(),
                window.start,
                window.end,
                client.known_voxel_count()
            );
        }
        Command::Voxel(pos) => {
            // Answered in the background so the console stays responsive.
            let client = client.clone();
            tokio::spawn(async move {
                let options = QueryOptions::new().with_timeout(CONSOLE_QUERY_TIMEOUT);
                match client.get_voxel(pos, options).await {
                    Ok(record) => info!("{record}"),
                    Err(e) => warn!("{e}"),
                }
            });
        }
        Command::Refresh(pos) => {
            if let Err(e) = client.refresh_voxel(pos).await {
                warn!("{e}");
            }
        }
        Command::Visual => {
            if let Err(e) = client.refresh_visual().await {
                warn!("{e}");
            }
        }
        Command::Connect => match server_addr.or_else(|| client.peer()) {
            Some(addr) => connect(client, addr).await,
            None => warn!("No server_address configured"),
        },
        Command::Disconnect => client.stop().await,
        Command::Help => info!("{}", console::HELP),
        Command::Quit => {}
    }
}
