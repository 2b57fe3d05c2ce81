//! The connection manager: one shared realtime connection per client.
//!
//! [`RealtimeClient`] is cheap to clone; every clone drives the same
//! connection, listener registry and pending queues. Construct one per
//! process (or per test) and hand clones to whatever needs it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use rentline_shared::{ClientEvent, EventFrame, EventKind, ServerEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;

use super::connection::{ConnectDecision, ConnectionMachine, ConnectionState};
use super::socket_io::SocketIoConnector;
use super::transport::{Connector, TransportLink};
use crate::config::RealtimeConfig;
use crate::credential::Credential;
use crate::error::{ConnectError, ConnectResult, TransportError};
use crate::registry::ListenerRegistry;

/// Callback for inbound server events.
pub type Listener = crate::registry::Listener<ServerEvent>;

/// Awaitable outcome of a `connect` call. Clones observe the same attempt.
pub type ConnectHandle = Shared<BoxFuture<'static, ConnectResult>>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

enum ListenerOp {
    Add(EventKind, Listener),
    Remove(EventKind, Listener),
    Clear(EventKind),
}

struct LiveLink {
    outbound: mpsc::UnboundedSender<EventFrame>,
    // Dropping this stops the session's inbound pump.
    _shutdown: oneshot::Sender<()>,
}

struct Session {
    machine: ConnectionMachine,
    /// Bumped whenever a session is started or torn down, so late results
    /// from an abandoned handshake or pump are ignored.
    generation: u64,
    in_flight: Option<ConnectHandle>,
    /// The task running the in-flight handshake, aborted on `disconnect`.
    handshake: Option<AbortHandle>,
    live: Option<LiveLink>,
    pending_emits: VecDeque<ClientEvent>,
    pending_listeners: Vec<ListenerOp>,
}

struct Inner {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    registry: ListenerRegistry<EventKind, ServerEvent>,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped whenever room joins already issued are lost on the server
    /// side or discarded from the queue.
    resets_tx: watch::Sender<u64>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn reset_membership(&self) {
        self.resets_tx.send_modify(|n| *n += 1);
    }

    fn apply(&self, op: ListenerOp) {
        match op {
            ListenerOp::Add(kind, listener) => self.registry.register(kind, listener),
            ListenerOp::Remove(kind, listener) => {
                self.registry.unregister(kind, &listener);
            }
            ListenerOp::Clear(kind) => self.registry.clear(kind),
        }
    }
}

/// Handle to the shared realtime connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Client that talks Socket.IO to `config.endpoint`.
    pub fn from_config(config: RealtimeConfig) -> Self {
        let connector = Arc::new(SocketIoConnector::new(&config));
        Self::new(config, connector)
    }

    /// Client over an arbitrary transport.
    pub fn new(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (resets_tx, _) = watch::channel(0);
        let machine = ConnectionMachine::new(config.reconnect.max_attempts);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                registry: ListenerRegistry::new(),
                session: Mutex::new(Session {
                    machine,
                    generation: 0,
                    in_flight: None,
                    handshake: None,
                    live: None,
                    pending_emits: VecDeque::new(),
                    pending_listeners: Vec::new(),
                }),
                state_tx,
                resets_tx,
            }),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Connect with `credential`, or join the attempt already in flight.
    ///
    /// Must be called from within a Tokio runtime. The credential is checked
    /// before anything touches the transport.
    pub fn connect(&self, credential: &str) -> ConnectHandle {
        let mut session = self.inner.session();

        let attempt = match session.machine.request_connect() {
            ConnectDecision::AlreadyConnected => return resolved(Ok(())),
            ConnectDecision::InFlight => {
                if let Some(handle) = session.in_flight.clone() {
                    return handle;
                }
                crate::log_error!("connecting without an in-flight handle, restarting");
                session.machine.reset();
                1
            }
            ConnectDecision::Start { attempt } => attempt,
            ConnectDecision::Exhausted { attempts, cause } => {
                self.inner.publish(session.machine.state());
                crate::log_warn!("connect refused: {} attempts already failed", attempts);
                return resolved(Err(ConnectError::RetriesExhausted { attempts, cause }));
            }
        };

        let credential = match Credential::parse(credential) {
            Ok(credential) => credential,
            Err(e) => {
                crate::log_warn!("refusing to connect: {}", e);
                return resolved(Err(e.into()));
            }
        };

        session.machine.start(attempt);
        session.generation += 1;
        let generation = session.generation;

        let (done_tx, done_rx) = oneshot::channel();
        let handle: ConnectHandle = async move {
            done_rx.await.unwrap_or(Err(ConnectError::Cancelled))
        }
        .boxed()
        .shared();
        session.in_flight = Some(handle.clone());
        self.inner.publish(session.machine.state());

        crate::log_info!(
            "connecting as {} (attempt {})",
            credential.identity(),
            attempt
        );
        let task = tokio::spawn(self.clone().handshake(credential, attempt, generation, done_tx));
        session.handshake = Some(task.abort_handle());
        handle
    }

    async fn handshake(
        self,
        credential: Credential,
        attempt: u32,
        generation: u64,
        done: oneshot::Sender<ConnectResult>,
    ) {
        let config = &self.inner.config;
        let delay = config.reconnect.delay_before(attempt);
        if !delay.is_zero() {
            crate::log_debug!("waiting {:?} before attempt {}", delay, attempt);
            tokio::time::sleep(delay).await;
            if self.inner.session().generation != generation {
                let _ = done.send(Err(ConnectError::Cancelled));
                return;
            }
        }

        let opened = tokio::time::timeout(
            config.handshake_timeout,
            self.inner.connector.open(credential.token()),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(config.handshake_timeout)));

        let outcome = match opened {
            Ok(link) => self.establish(link, generation),
            Err(cause) => self.handshake_failed(cause, generation),
        };
        let _ = done.send(outcome);
    }

    fn establish(&self, link: TransportLink, generation: u64) -> ConnectResult {
        let TransportLink { outbound, inbound } = link;
        let mut session = self.inner.session();
        if session.generation != generation {
            crate::log_debug!("discarding transport opened for a cancelled attempt");
            return Err(ConnectError::Cancelled);
        }

        session.machine.handshake_succeeded();
        session.in_flight = None;
        session.handshake = None;

        for op in session.pending_listeners.drain(..) {
            self.inner.apply(op);
        }

        let queued = session.pending_emits.len();
        for event in session.pending_emits.drain(..) {
            send_event(&outbound, &event);
        }
        send_event(&outbound, &ClientEvent::UserOnline);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        session.live = Some(LiveLink {
            outbound,
            _shutdown: shutdown_tx,
        });
        self.inner.publish(session.machine.state());
        drop(session);

        crate::log_info!("realtime connection established, flushed {} queued events", queued);
        tokio::spawn(self.clone().pump(inbound, shutdown_rx, generation));
        Ok(())
    }

    fn handshake_failed(&self, cause: TransportError, generation: u64) -> ConnectResult {
        let mut session = self.inner.session();
        if session.generation != generation {
            return Err(ConnectError::Cancelled);
        }
        session.in_flight = None;
        session.handshake = None;
        let attempt = session.machine.handshake_failed(cause.clone());
        self.inner.publish(session.machine.state());
        drop(session);

        crate::log_warn!("handshake attempt {} failed: {}", attempt, cause);
        Err(ConnectError::Handshake { attempt, cause })
    }

    /// Dispatch inbound frames in arrival order until the transport ends or
    /// the session is torn down.
    async fn pump(
        self,
        mut inbound: mpsc::UnboundedReceiver<EventFrame>,
        mut shutdown: oneshot::Receiver<()>,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => self.deliver(frame),
                    None => break,
                },
                _ = &mut shutdown => return,
            }
        }
        self.connection_lost(generation);
    }

    fn deliver(&self, frame: EventFrame) {
        match ServerEvent::from_frame(frame) {
            Ok(event) => {
                let kind = event.kind();
                let invoked = self.inner.registry.dispatch(kind, &event);
                crate::log_debug!("dispatched {} to {} listeners", kind, invoked);
            }
            Err(rentline_shared::ProtocolError::UnknownEvent(name)) => {
                crate::log_debug!("no handler for server event {}", name);
            }
            Err(e) => crate::log_warn!("dropping server event: {}", e),
        }
    }

    fn connection_lost(&self, generation: u64) {
        let mut session = self.inner.session();
        if session.generation != generation || !session.machine.dropped() {
            return;
        }
        session.generation += 1;
        session.live = None;
        session.in_flight = None;
        session.pending_emits.clear();
        session.pending_listeners.clear();
        self.inner.publish(session.machine.state());
        drop(session);

        self.inner.reset_membership();
        crate::log_warn!("realtime connection lost");
    }

    /// Send `event` now if connected, otherwise queue it for the next
    /// successful handshake. Never fails.
    pub fn emit(&self, event: ClientEvent) {
        let mut session = self.inner.session();
        match &session.live {
            Some(live) => {
                if !send_event(&live.outbound, &event) {
                    crate::log_warn!("transport closed, dropped {}", event.name());
                }
            }
            None => {
                crate::log_debug!("queueing {} until connected", event.name());
                session.pending_emits.push_back(event);
            }
        }
    }

    /// Register `listener` for `kind`. Buffered until connected.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.schedule(ListenerOp::Add(kind, listener));
    }

    /// Remove `listener` (first matching reference) or, with `None`, every
    /// listener for `kind`. Buffered until connected.
    pub fn off(&self, kind: EventKind, listener: Option<&Listener>) {
        let op = match listener {
            Some(listener) => ListenerOp::Remove(kind, listener.clone()),
            None => ListenerOp::Clear(kind),
        };
        self.schedule(op);
    }

    fn schedule(&self, op: ListenerOp) {
        let mut session = self.inner.session();
        if session.machine.is_connected() {
            self.inner.apply(op);
        } else {
            session.pending_listeners.push(op);
        }
    }

    /// Tear everything down: transport, state, retry counter, queues and
    /// registered listeners. An in-flight handshake is aborted and its
    /// `connect` handle resolves as cancelled right away.
    pub fn disconnect(&self) {
        let mut session = self.inner.session();
        session.generation += 1;
        session.machine.reset();
        if let Some(task) = session.handshake.take() {
            task.abort();
        }
        session.live = None;
        session.in_flight = None;
        session.pending_emits.clear();
        session.pending_listeners.clear();
        self.inner.registry.clear_all();
        self.inner.publish(session.machine.state());
        drop(session);

        self.inner.reset_membership();
        crate::log_info!("realtime client disconnected");
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch connection state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Ticks whenever rooms joined so far are forgotten: the live session
    /// dropped, or `disconnect` discarded the queue. Views rejoin after it.
    pub fn membership_resets(&self) -> watch::Receiver<u64> {
        self.inner.resets_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session().machine.is_connected()
    }

    /// Consecutive failed handshakes in the current cycle.
    pub fn failed_attempts(&self) -> u32 {
        self.inner.session().machine.failures()
    }

    /// Events waiting for the next successful handshake.
    pub fn queued_events(&self) -> usize {
        self.inner.session().pending_emits.len()
    }

    /// Listeners currently active for `kind` (buffered ones excluded).
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.registry.listener_count(kind)
    }
}

fn resolved(result: ConnectResult) -> ConnectHandle {
    future::ready(result).boxed().shared()
}

fn send_event(outbound: &mpsc::UnboundedSender<EventFrame>, event: &ClientEvent) -> bool {
    match event.to_frame() {
        Ok(frame) => outbound.send(frame).is_ok(),
        Err(e) => {
            crate::log_error!("could not encode {}: {}", event.name(), e);
            false
        }
    }
}
