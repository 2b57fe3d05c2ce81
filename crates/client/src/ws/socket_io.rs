//! Socket.IO over websocket, using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rentline_shared::{EventFrame, Packet};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::transport::{Connector, TransportLink};
use crate::config::RealtimeConfig;
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Connects to a Socket.IO v4 server using the websocket transport only.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    endpoint: Url,
    namespace: String,
}

impl SocketIoConnector {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            namespace: config.namespace.clone(),
        }
    }

    /// `http(s)://host/base` becomes `ws(s)://host/base/socket.io/?EIO=4&transport=websocket`.
    pub fn socket_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // Switching between special schemes cannot fail.
        let _ = url.set_scheme(scheme);
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/socket.io/"));
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        url
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn open(&self, token: &str) -> Result<TransportLink, TransportError> {
        let url = self.socket_url();
        crate::log_debug!("opening websocket to {}", url);

        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        match next_packet(&mut read).await? {
            Packet::Open(info) => {
                crate::log_debug!(
                    "engine session {} (ping interval {}ms)",
                    info.sid,
                    info.ping_interval
                );
            }
            other => {
                return Err(TransportError::Protocol(format!(
                    "expected engine open packet, got {other:?}"
                )))
            }
        }

        send_packet(
            &mut write,
            &Packet::Connect {
                namespace: self.namespace.clone(),
                data: Some(json!({ "token": token })),
            },
        )
        .await?;

        loop {
            match next_packet(&mut read).await? {
                Packet::Connect { namespace, .. } if namespace == self.namespace => break,
                Packet::ConnectError { data, .. } => {
                    return Err(TransportError::Rejected(rejection_reason(&data)))
                }
                Packet::Ping => send_packet(&mut write, &Packet::Pong).await?,
                Packet::Close => return Err(TransportError::Closed),
                other => crate::log_debug!("ignoring {:?} during handshake", other),
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            read,
            inbound_tx,
            control_tx,
            self.namespace.clone(),
        ));
        tokio::spawn(write_loop(
            write,
            outbound_rx,
            control_rx,
            self.namespace.clone(),
        ));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

fn rejection_reason(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

async fn next_packet(read: &mut WsRead) -> Result<Packet, TransportError> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Packet::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
        }
    }
}

async fn send_packet(write: &mut WsWrite, packet: &Packet) -> Result<(), TransportError> {
    write
        .send(Message::Text(packet.encode().into()))
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
}

/// Forward events to the manager and hand pings to the writer. Ends when
/// the socket closes or the server disconnects the namespace; dropping
/// `inbound` is how the manager learns about it.
async fn read_loop(
    mut read: WsRead,
    inbound: UnboundedSender<EventFrame>,
    control: UnboundedSender<Packet>,
    namespace: String,
) {
    while let Some(msg_result) = read.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                crate::log_info!("realtime server closed the socket");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                crate::log_error!("websocket read error: {}", e);
                break;
            }
        };

        match Packet::decode(text.as_str()) {
            Ok(Packet::Event { namespace: ns, frame }) if ns == namespace => {
                if inbound.send(frame).is_err() {
                    // Manager tore the session down.
                    break;
                }
            }
            Ok(Packet::Ping) => {
                let _ = control.send(Packet::Pong);
            }
            Ok(Packet::Disconnect { namespace: ns }) if ns == namespace => {
                crate::log_warn!("server disconnected namespace {}", ns);
                break;
            }
            Ok(Packet::Close) => break,
            Ok(other) => crate::log_debug!("ignoring packet {:?}", other),
            Err(e) => crate::log_warn!("dropping undecodable packet: {}", e),
        }
    }
}

/// Serialize outbound events and control packets onto the socket. When the
/// manager drops its sender the namespace is left and the socket closed.
async fn write_loop(
    mut write: WsWrite,
    mut outbound: UnboundedReceiver<EventFrame>,
    mut control: UnboundedReceiver<Packet>,
    namespace: String,
) {
    loop {
        let packet = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Packet::Event { namespace: namespace.clone(), frame },
                None => {
                    let _ = send_packet(&mut write, &Packet::Disconnect { namespace: namespace.clone() }).await;
                    break;
                }
            },
            control_packet = control.recv() => match control_packet {
                Some(packet) => packet,
                // Reader is gone, so is the socket.
                None => break,
            },
        };

        if let Err(e) = send_packet(&mut write, &packet).await {
            crate::log_error!("websocket send failed: {}", e);
            break;
        }
    }
    let _ = write.close().await;
}
