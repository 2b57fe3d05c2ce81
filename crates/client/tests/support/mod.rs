//! In-memory transport and helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use rentline_client::ws::{Connector, ReconnectConfig, TransportLink};
use rentline_client::{RealtimeClient, RealtimeConfig, TransportError};
use rentline_shared::{ClientEvent, EventFrame, ServerEvent};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

enum Outcome {
    Fail(TransportError),
    Stall,
}

struct Link {
    inbound: Option<UnboundedSender<EventFrame>>,
    outbound: UnboundedReceiver<EventFrame>,
}

#[derive(Default)]
struct State {
    script: VecDeque<Outcome>,
    links: Vec<Link>,
    opens: usize,
    sent: Vec<ClientEvent>,
}

/// Scripted [`Connector`]: handshakes succeed unless a failure or stall was
/// queued, outbound frames are captured and inbound frames injected.
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<State>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, cause: TransportError) {
        self.state.lock().unwrap().script.push_back(Outcome::Fail(cause));
    }

    /// The next handshake never completes.
    pub fn stall_next(&self) {
        self.state.lock().unwrap().script.push_back(Outcome::Stall);
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    /// Every event the client has written, across all transports, in order.
    pub fn sent(&self) -> Vec<ClientEvent> {
        let mut state = self.state.lock().unwrap();
        let mut drained = Vec::new();
        for link in &mut state.links {
            while let Ok(frame) = link.outbound.try_recv() {
                drained.push(ClientEvent::from_frame(frame).expect("client sent a bad frame"));
            }
        }
        state.sent.extend(drained);
        state.sent.clone()
    }

    /// Deliver `event` on the most recent transport.
    pub fn push(&self, event: ServerEvent) {
        self.push_frame(event.to_frame().unwrap());
    }

    pub fn push_frame(&self, frame: EventFrame) {
        let state = self.state.lock().unwrap();
        let link = state.links.last().expect("no transport opened");
        link.inbound
            .as_ref()
            .expect("transport already dropped")
            .send(frame)
            .unwrap();
    }

    /// Simulate the server going away on the most recent transport.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(link) = state.links.last_mut() {
            link.inbound = None;
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _token: &str) -> Result<TransportLink, TransportError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            state.script.pop_front()
        };
        match outcome {
            Some(Outcome::Fail(cause)) => return Err(cause),
            Some(Outcome::Stall) => std::future::pending::<()>().await,
            None => {}
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().links.push(Link {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        });
        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

pub fn fast_config() -> RealtimeConfig {
    RealtimeConfig::default()
        .with_handshake_timeout(Duration::from_millis(100))
        .with_reconnect(ReconnectConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        })
}

pub fn client(mock: &Arc<MockConnector>) -> RealtimeClient {
    RealtimeClient::new(fast_config(), mock.clone())
}

pub fn mint(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"not-the-server-key"),
    )
    .unwrap()
}

pub fn valid_token() -> String {
    mint(json!({ "sub": "user-1", "exp": chrono::Utc::now().timestamp() + 3600 }))
}

/// Let spawned tasks (pump, dispatch) catch up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
