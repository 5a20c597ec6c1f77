//! WebSocket transport
//!
//! A minimal WebSocket server that translates protocol JSON messages into
//! broker operations. Responsibilities:
//! - Accept TCP/WebSocket connections, one task per connection
//! - Deserialize each text frame into a [`ClientMessage`] and run it against
//!   the shared [`Broker`]
//! - Answer every request with exactly one [`ServerMessage`], mapping broker
//!   errors onto status codes
//!
//! Connections carry no session state: a client may pull on one connection
//! and ack on another.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Attributes, Broker};
use crate::config::BrokerSettings;
use crate::transport::message::{
    ClientMessage, ReceivedInfo, ServerMessage, SubscriptionInfo, TopicInfo,
};
use crate::utils::{Error, ErrorKind, Result};

/// Binds `addr` and serves WebSocket clients until the task is dropped.
pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<Broker>,
    settings: BrokerSettings,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, broker, settings).await;
    Ok(())
}

/// Serves WebSocket clients on an already bound listener.
pub async fn serve(listener: TcpListener, broker: Arc<Broker>, settings: BrokerSettings) {
    let settings = Arc::new(settings);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };
        let broker = broker.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, broker, settings).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broker: Arc<Broker>,
    settings: Arc<BrokerSettings>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error from {peer}: {e}");
            return;
        }
    };
    debug!("{peer} connected");
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(frame) = ws_receiver.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Read error from {peer}: {e}");
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(request) => run_blocking(&broker, &settings, request).await,
            Err(err) => {
                warn!(
                    "Invalid client message from {peer}: {err} | {}",
                    text.as_str().chars().take(100).collect::<String>()
                );
                ServerMessage::Error {
                    code: 400,
                    message: format!("invalid request: {err}"),
                }
            }
        };

        let encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode reply for {peer}: {e}");
                break;
            }
        };
        if let Err(e) = ws_sender.send(WsMessage::Text(encoded.into())).await {
            warn!("Failed to send reply to {peer}: {e}");
            break;
        }
    }

    debug!("{peer} disconnected");
}

/// Runs [`handle_request`] on the blocking pool; broker calls take locks and
/// may hit disk.
async fn run_blocking(
    broker: &Arc<Broker>,
    settings: &Arc<BrokerSettings>,
    request: ClientMessage,
) -> ServerMessage {
    let broker = broker.clone();
    let settings = settings.clone();
    match tokio::task::spawn_blocking(move || handle_request(&broker, &settings, request)).await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!("Request handler failed: {e}");
            ServerMessage::Error {
                code: ErrorKind::Internal.status_code(),
                message: "internal error".to_string(),
            }
        }
    }
}

/// Runs one request against the broker and builds its reply.
pub fn handle_request(
    broker: &Broker,
    settings: &BrokerSettings,
    request: ClientMessage,
) -> ServerMessage {
    match dispatch(broker, settings, request) {
        Ok(reply) => reply,
        Err(err) => {
            debug!("Request failed: {err}");
            ServerMessage::error(&err)
        }
    }
}

fn dispatch(
    broker: &Broker,
    settings: &BrokerSettings,
    request: ClientMessage,
) -> Result<ServerMessage> {
    let reply = match request {
        ClientMessage::CreateTopic { topic } => ServerMessage::Topic {
            topic: TopicInfo::from(&broker.create_topic(&topic)?),
        },
        ClientMessage::GetTopic { topic } => ServerMessage::Topic {
            topic: TopicInfo::from(&broker.get_topic(&topic)?),
        },
        ClientMessage::ListTopics => ServerMessage::Topics {
            topics: broker.list_topics()?.iter().map(TopicInfo::from).collect(),
        },
        ClientMessage::DeleteTopic { topic } => {
            broker.delete_topic(&topic)?;
            ServerMessage::Ok
        }
        ClientMessage::Publish { topic, messages } => {
            if messages.is_empty() {
                return Err(Error::InvalidArgument(
                    "publish needs at least one message".to_string(),
                ));
            }
            let batch = messages
                .into_iter()
                .map(|m| Ok((m.decode_data()?, Attributes::from(m.attributes))))
                .collect::<Result<Vec<_>>>()?;
            ServerMessage::Published {
                message_ids: broker.publish_batch(&topic, batch)?,
            }
        }
        ClientMessage::CreateSubscription {
            subscription,
            topic,
            ack_deadline_seconds,
            push_endpoint,
            push_attributes,
        } => {
            let created = broker.create_subscription(
                &subscription,
                &topic,
                ack_deadline_seconds.unwrap_or(settings.default_ack_deadline_secs),
                &push_endpoint,
                Attributes::from(push_attributes),
            )?;
            ServerMessage::Subscription {
                subscription: SubscriptionInfo::from(&created),
            }
        }
        ClientMessage::GetSubscription { subscription } => ServerMessage::Subscription {
            subscription: SubscriptionInfo::from(&broker.get_subscription(&subscription)?),
        },
        ClientMessage::ListSubscriptions => ServerMessage::Subscriptions {
            subscriptions: broker
                .list_subscriptions()?
                .iter()
                .map(SubscriptionInfo::from)
                .collect(),
        },
        ClientMessage::DeleteSubscription { subscription } => {
            broker.delete_subscription(&subscription)?;
            ServerMessage::Ok
        }
        ClientMessage::ModifyPushConfig {
            subscription,
            push_endpoint,
            push_attributes,
        } => {
            let updated = broker.set_push_config(
                &subscription,
                &push_endpoint,
                Attributes::from(push_attributes),
            )?;
            ServerMessage::Subscription {
                subscription: SubscriptionInfo::from(&updated),
            }
        }
        ClientMessage::ModifyAckDeadline {
            subscription,
            ack_id,
            ack_deadline_seconds,
        } => {
            broker.modify_ack_deadline(&subscription, &ack_id, ack_deadline_seconds)?;
            ServerMessage::Ok
        }
        ClientMessage::Pull {
            subscription,
            max_messages,
        } => {
            if max_messages > settings.max_messages_per_pull {
                return Err(Error::InvalidArgument(format!(
                    "max_messages must not exceed {}",
                    settings.max_messages_per_pull
                )));
            }
            let received = match broker.pull(&subscription, max_messages) {
                Ok(received) => received,
                Err(Error::EmptyMessage) => Vec::new(),
                Err(e) => return Err(e),
            };
            ServerMessage::Pulled {
                received_messages: received.iter().map(ReceivedInfo::from).collect(),
            }
        }
        ClientMessage::Ack {
            subscription,
            ack_ids,
        } => {
            let results = broker.acknowledge(&subscription, &ack_ids)?;
            let failed_ack_ids = ack_ids
                .into_iter()
                .zip(results)
                .filter_map(|(ack_id, result)| match result {
                    Ok(()) => None,
                    Err(e) => {
                        debug!("Ack {ack_id} on {subscription} failed: {e}");
                        Some(ack_id)
                    }
                })
                .collect();
            ServerMessage::Acked { failed_ack_ids }
        }
    };
    Ok(reply)
}
