use crate::hub::{ConnectionId, HubCommand, HubHandle};
use crate::subscription::protocol::{ClientFrame, ServerMessage};
use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Pumps one WebSocket: inbound frames go to the hub, the hub's outbound
/// messages for this connection go to the socket
pub struct ConnectionManager {
    connection: ConnectionId,
    hub: HubHandle,
}

impl ConnectionManager {
    pub fn new(connection: ConnectionId, hub: HubHandle) -> Self {
        Self { connection, hub }
    }

    /// Handle WebSocket connection lifecycle
    pub async fn handle(
        self,
        mut socket: WebSocket,
        mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        loop {
            tokio::select! {
                // Handle incoming client messages
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.forward_frame(&text) {
                                error!(connection = %self.connection, "Hub stopped, closing connection");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(connection = %self.connection, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(connection = %self.connection, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Handle messages routed to this connection by the hub
                outbound = outbox.recv() => {
                    match outbound {
                        Some(message) => {
                            if let Err(e) = send_message(&mut socket, &message).await {
                                error!(connection = %self.connection, error = %e, "Failed to send message");
                                break;
                            }
                        }
                        None => {
                            error!(connection = %self.connection, "Hub dropped connection outbox");
                            break;
                        }
                    }
                }
            }
        }

        self.hub.send(HubCommand::Disconnect {
            connection: self.connection,
        });
    }

    /// Returns false if the hub is gone. Undecodable frames are dropped.
    fn forward_frame(&self, text: &str) -> bool {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection = %self.connection, error = %e, "Dropping invalid frame");
                return true;
            }
        };
        debug!(connection = %self.connection, event = %frame.event, "Frame received");
        self.hub.send(HubCommand::Message {
            connection: self.connection,
            frame,
        })
    }
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(message)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
