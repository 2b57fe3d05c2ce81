//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the subset a websocket-only client needs is supported: engine
//! open/close/ping/pong/noop and socket connect, disconnect, event and
//! connect_error. Binary packets and acknowledgements are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::EventFrame;

/// Default Socket.IO namespace.
pub const ROOT_NAMESPACE: &str = "/";

/// Payload of the engine `open` packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        frame: EventFrame,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl Packet {
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(info) => {
                // OpenInfo only holds strings and integers.
                format!("0{}", serde_json::to_string(info).unwrap_or_default())
            }
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { namespace, data } => {
                let body = data.as_ref().map(Value::to_string).unwrap_or_default();
                format!("40{}{}", namespace_prefix(namespace), body)
            }
            Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
            Packet::Event { namespace, frame } => {
                let mut args = vec![Value::String(frame.name.clone())];
                if let Some(data) = &frame.data {
                    args.push(data.clone());
                }
                format!("42{}{}", namespace_prefix(namespace), Value::Array(args))
            }
            Packet::ConnectError { namespace, data } => {
                format!("44{}{}", namespace_prefix(namespace), data)
            }
        }
    }

    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let mut chars = text.chars();
        let engine_type = chars
            .next()
            .ok_or_else(|| ProtocolError::Malformed("empty packet".to_string()))?;
        let rest = chars.as_str();

        match engine_type {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(ProtocolError::Malformed(format!(
                "unsupported engine packet type {other:?}"
            ))),
        }
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == ROOT_NAMESPACE {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn decode_socket_packet(text: &str) -> ProtocolResult<Packet> {
    let mut chars = text.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| ProtocolError::Malformed("message packet without socket type".to_string()))?;
    let (namespace, body) = split_namespace(chars.as_str());

    match socket_type {
        '0' => Ok(Packet::Connect {
            namespace,
            data: parse_optional(body)?,
        }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => Ok(Packet::Event {
            namespace,
            frame: decode_event(body)?,
        }),
        '4' => Ok(Packet::ConnectError {
            namespace,
            data: parse_optional(body)?.unwrap_or(Value::Null),
        }),
        '3' | '6' => Err(ProtocolError::Malformed(
            "acknowledgements are not supported".to_string(),
        )),
        '5' => Err(ProtocolError::Malformed(
            "binary events are not supported".to_string(),
        )),
        other => Err(ProtocolError::Malformed(format!(
            "unknown socket packet type {other:?}"
        ))),
    }
}

fn split_namespace(text: &str) -> (String, &str) {
    if !text.starts_with('/') {
        return (ROOT_NAMESPACE.to_string(), text);
    }
    match text.find(',') {
        Some(idx) => (text[..idx].to_string(), &text[idx + 1..]),
        None => (text.to_string(), ""),
    }
}

fn parse_optional(body: &str) -> ProtocolResult<Option<Value>> {
    if body.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(body)?))
    }
}

fn decode_event(body: &str) -> ProtocolResult<EventFrame> {
    // An ack id may precede the payload; this client never requests acks.
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let args: Vec<Value> = serde_json::from_str(body)?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(ProtocolError::Malformed(
                "event packet without a name".to_string(),
            ))
        }
    };
    Ok(EventFrame {
        name,
        data: args.next(),
    })
}
