mod console;

use std::io::BufRead;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::signal;
use tokio::sync::mpsc;

use p2p_chat_node::common::ConsoleCommand;
use p2p_chat_node::config;
use p2p_chat_node::network::ChatNode;
use p2p_chat_node::storage::MessageStore;

#[derive(Parser)]
#[command(name = "p2p_chat_node", version, about = "Peer-to-peer chat node")]
struct Cli {
    /// Name attached to messages written on this node
    username: String,
    /// Address to accept peers on
    listen_ip: String,
    listen_port: u16,
    /// Bootstrap peer to dial on startup
    #[arg(requires = "peer_port")]
    peer_ip: Option<String>,
    #[arg(requires = "peer_ip")]
    peer_port: Option<u16>,
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Message log location (overrides the config file)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if let Some(db) = cli.db.clone() {
        app_config.db_path = db;
    }

    let store = Arc::new(MessageStore::open(&app_config.db_path)?);
    log::info!(
        "Opened message log {} ({} messages)",
        app_config.db_path,
        store.message_count()?
    );
    if app_config.show_history {
        console::print_history(&store.query_all()?);
    }

    let (event_tx, event_rx) = mpsc::channel(100);
    let node = ChatNode::new(
        cli.username.clone(),
        Arc::clone(&store),
        app_config.node_settings(),
        event_tx,
    );

    let local_addr = node
        .listen((cli.listen_ip.as_str(), cli.listen_port))
        .await?;
    println!("[Listening on {local_addr}]");

    if let (Some(ip), Some(port)) = (&cli.peer_ip, cli.peer_port) {
        connect_and_report(&node, &format!("{ip}:{port}")).await;
    }

    let printer = tokio::spawn(console::print_events(event_rx));

    tokio::select! {
        _ = run_console(&node) => {
            log::info!("Console closed, shutting down");
        }
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                log::error!("Failed to listen for shutdown signal: {err}");
            }
            log::info!("Received shutdown signal, stopping node...");
        }
    }

    node.shutdown().await;
    printer.abort();
    Ok(())
}

async fn connect_and_report(node: &ChatNode, address: &str) {
    match node.connect(address).await {
        Ok(peer) => println!("[Connected to peer at {}]", peer.remote_addr()),
        Err(err) => println!("Error connecting to peer {address}: {err}"),
    }
}

/// Handle operator input until `/quit`. On end of input the node keeps
/// serving peers until interrupted.
async fn run_console(node: &ChatNode) {
    let mut lines = spawn_stdin_reader();

    while let Some(line) = lines.recv().await {
        let Some(command) = ConsoleCommand::parse(&line) else {
            continue;
        };
        match command {
            ConsoleCommand::SendMessage(text) => match node.send_chat(&text) {
                Ok(message) => println!("{}", console::sent_line(&message)),
                Err(err) => println!("Message not sent: {err}"),
            },
            ConsoleCommand::ConnectToPeer { address } => {
                connect_and_report(node, &address).await;
            }
            ConsoleCommand::ListPeers => {
                let peers = node.peers();
                if peers.is_empty() {
                    println!("[No peers connected]");
                }
                for peer in peers {
                    println!("[Peer {peer}]");
                }
            }
            ConsoleCommand::ShowHistory => match node.store().query_all() {
                Ok(messages) => console::print_history(&messages),
                Err(err) => println!("Failed to read history: {err}"),
            },
            ConsoleCommand::Quit => return,
        }
    }

    log::info!("Standard input closed; press Ctrl-C to stop");
    std::future::pending::<()>().await;
}

/// Stdin is read on a plain thread so a pending read never holds up runtime
/// shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
