//! CLI for PullSub
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `client`: run a short publish/pull/ack round against a server (useful
//!   for smoke tests)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pullsub::broker::{Broker, HttpPusher};
use pullsub::config::{Settings, load_config, load_config_from};
use pullsub::persistence;
use pullsub::transport::message::{ClientMessage, OutgoingMessage, ServerMessage};
use pullsub::transport::start_websocket_server;
use pullsub::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pullsub")]
enum Command {
    /// Start the WebSocket server
    Server {
        /// Configuration file layered over `config/default` and under the
        /// environment
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the smoke-test client (create topic and subscription, publish, pull, ack)
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8085")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match Command::parse() {
        Command::Server { config } => {
            let settings = match config {
                Some(path) => load_config_from(path),
                None => load_config(),
            };
            let settings = match settings {
                Ok(settings) => settings,
                Err(e) => {
                    logging::init("info");
                    error!("Failed to load configuration: {e}");
                    return ExitCode::FAILURE;
                }
            };
            logging::init(&settings.log.level);
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {e}");
                return ExitCode::FAILURE;
            }
        }
        Command::Client { url } => {
            logging::init("info");
            if let Err(e) = run_client(&url).await {
                error!("Client failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

async fn run_server(settings: Settings) -> pullsub::utils::Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let storage = persistence::open(&settings.storage)?;

    let mut broker = Broker::new(storage);
    if settings.push.enabled {
        broker = broker.with_pusher(Arc::new(HttpPusher::new(&settings.push)?));
    }
    let broker = Arc::new(broker);

    tokio::select! {
        result = start_websocket_server(&addr, broker, settings.broker.clone()) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    let requests = [
        ClientMessage::CreateTopic {
            topic: "smoke".to_string(),
        },
        ClientMessage::CreateSubscription {
            subscription: "smoke-sub".to_string(),
            topic: "smoke".to_string(),
            ack_deadline_seconds: None,
            push_endpoint: String::new(),
            push_attributes: Default::default(),
        },
        ClientMessage::Publish {
            topic: "smoke".to_string(),
            messages: vec![OutgoingMessage::new(b"Hello from pullsub")],
        },
        ClientMessage::Pull {
            subscription: "smoke-sub".to_string(),
            max_messages: 10,
        },
    ];

    let mut ack_ids = Vec::new();
    for request in requests {
        ws_stream
            .send(WsMessage::Text(serde_json::to_string(&request)?.into()))
            .await?;
        let Some(frame) = ws_stream.next().await else {
            return Err("server closed the connection".into());
        };
        let reply: ServerMessage = serde_json::from_slice(&frame?.into_data())?;
        match &reply {
            ServerMessage::Pulled { received_messages } => {
                for received in received_messages {
                    println!("Pulled {}", received.message);
                    ack_ids.push(received.ack_id.clone());
                }
            }
            // the smoke topic survives earlier runs
            ServerMessage::Error { code: 409, .. } => println!("Already exists, continuing"),
            ServerMessage::Error { code, message } => {
                return Err(format!("request failed ({code}): {message}").into());
            }
            other => println!("Reply: {other:?}"),
        }
    }

    let ack = ClientMessage::Ack {
        subscription: "smoke-sub".to_string(),
        ack_ids,
    };
    ws_stream
        .send(WsMessage::Text(serde_json::to_string(&ack)?.into()))
        .await?;
    if let Some(frame) = ws_stream.next().await {
        let reply: ServerMessage = serde_json::from_slice(&frame?.into_data())?;
        println!("Ack reply: {reply:?}");
    }

    Ok(())
}
