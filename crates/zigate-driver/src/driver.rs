//! Driver orchestrator.
//!
//! The [`Driver`] owns the connection lifecycle and runs every command
//! through a single-slot [`CommandQueue`], so at most one command is in
//! flight. A command registers what it expects back in the
//! [`WaiterRegistry`], writes its frame, then awaits the status
//! confirmation and races the declared response shapes.
//!
//! Inbound frames are decoded on a dispatcher task, offered to the registry,
//! and classified into [`DriverEvent`]s for subscribers.

use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zigate_protocol::{
    Catalog, Frame, Message, Payload, CMD_GET_NETWORK_STATE, CMD_GET_VERSION, CMD_PERMIT_JOIN,
    CMD_RESET, CMD_START_NETWORK, MSG_DATA_INDICATION, MSG_LEAVE_INDICATION,
};

use crate::config::DriverConfig;
use crate::error::{CommandError, ConfigError, DriverError, Result};
use crate::matcher::{Matcher, MessagePolicy};
use crate::queue::CommandQueue;
use crate::transport::{Session, SessionEvent, TransportKind};
use crate::waiter::{first_of, WaitHandle, WaiterRegistry};

/// Broadcast short address used by permit-join.
const PERMIT_JOIN_BROADCAST: u16 = 0xFFFC;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport session.
    Closed,
    /// A transport session is being established.
    Opening,
    /// Commands can be sent.
    Open,
    /// The transport session is being released.
    Closing,
}

/// Something subscribers are told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// An application-layer data indication.
    Received(Message),
    /// A device announced itself on the network.
    DeviceJoined {
        /// Network address assigned to the device.
        short_address: u16,
        /// IEEE address of the device.
        extended_address: u64,
    },
    /// A device left the network.
    DeviceLeft(Message),
    /// The connection was closed, by [`Driver::close`] or by the transport.
    Closed,
}

/// Per-command options for [`Driver::send_command_with`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Deadline for each expectation; the configured default when unset.
    pub timeout: Option<Duration>,
    /// Extra parameters response rules may refer to.
    pub extra: Option<Payload>,
    /// Skip response expectations; the status confirmation is still awaited.
    pub disable_response: bool,
}

impl SendOptions {
    /// Override the deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach extra parameters.
    pub fn extra(mut self, extra: Payload) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Do not wait for response messages.
    pub fn disable_response(mut self) -> Self {
        self.disable_response = true;
        self
    }
}

struct Link {
    state: ConnectionState,
    session: Option<Arc<Session>>,
    dispatcher: Option<JoinHandle<()>>,
    /// Bumped on every open so a stale dispatcher cannot close a newer session.
    generation: u64,
}

struct Inner {
    config: DriverConfig,
    catalog: Catalog,
    waiters: WaiterRegistry<MessagePolicy>,
    queue: CommandQueue,
    events: broadcast::Sender<DriverEvent>,
    link: Mutex<Link>,
}

/// Host-side driver for a ZiGate coordinator.
///
/// Cloning is cheap; clones share one connection.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<Inner>,
}

impl Driver {
    /// Create a closed driver using the ZiGate command catalog.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_catalog(config, Catalog::zigate())
    }

    /// Create a closed driver with a custom catalog.
    pub fn with_catalog(config: DriverConfig, catalog: Catalog) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Driver {
            inner: Arc::new(Inner {
                config,
                catalog,
                waiters: WaiterRegistry::new(MessagePolicy),
                queue: CommandQueue::new(1),
                events,
                link: Mutex::new(Link {
                    state: ConnectionState::Closed,
                    session: None,
                    dispatcher: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    /// Command catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().state
    }

    /// Subscribe to driver events. Only events sent after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.events.subscribe()
    }

    /// Number of expectations still registered.
    pub fn pending_expectations(&self) -> usize {
        self.inner.waiters.len()
    }

    /// Open the transport named by the configured address.
    pub async fn open(&self) -> Result<()> {
        let address = self.inner.config.address.clone();
        if address.trim().is_empty() {
            return Err(ConfigError::MissingAddress.into());
        }

        let generation = self.begin_open()?;
        info!(
            "Opening coordinator link to {} ({:?})",
            address,
            TransportKind::detect(&address)
        );

        match Session::open(&address, self.inner.config.baud_rate).await {
            Ok((session, events)) => self.finish_open(&address, generation, session, events).await,
            Err(source) => {
                self.abort_open(generation);
                Err(DriverError::Open { address, source })
            }
        }
    }

    /// Open over an already-established duplex stream.
    pub async fn open_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let generation = self.begin_open()?;
        let (session, events) = Session::from_stream(TransportKind::Socket, stream);
        self.finish_open("stream", generation, session, events).await
    }

    fn begin_open(&self) -> Result<u64> {
        let mut link = self.inner.link.lock();
        if link.state != ConnectionState::Closed {
            return Err(DriverError::InvalidState(link.state));
        }
        link.state = ConnectionState::Opening;
        link.generation += 1;
        Ok(link.generation)
    }

    fn abort_open(&self, generation: u64) {
        let mut link = self.inner.link.lock();
        if link.generation == generation && link.state == ConnectionState::Opening {
            link.state = ConnectionState::Closed;
        }
    }

    async fn finish_open(
        &self,
        address: &str,
        generation: u64,
        session: Session,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<()> {
        let session = Arc::new(session);
        {
            let mut link = self.inner.link.lock();
            if link.generation == generation && link.state == ConnectionState::Opening {
                self.inner.queue.reset();
                link.state = ConnectionState::Open;
                link.session = Some(Arc::clone(&session));
                link.dispatcher = Some(tokio::spawn(dispatch_loop(
                    Arc::downgrade(&self.inner),
                    generation,
                    events,
                )));
                info!("Coordinator link open ({:?})", session.kind());
                return Ok(());
            }
        }

        // close() ran while the session was being established
        if let Err(e) = session.close().await {
            warn!("Closing aborted session failed: {}", e);
        }
        Err(DriverError::Open {
            address: address.to_string(),
            source: io::Error::new(io::ErrorKind::Interrupted, "driver closed while opening"),
        })
    }

    /// Close the connection.
    ///
    /// Commands that have not started are rejected. A command already in
    /// flight keeps its expectations, which settle by their own deadlines.
    /// [`DriverEvent::Closed`] is emitted when this call performed the
    /// transition, even if releasing the transport failed.
    pub async fn close(&self) -> Result<()> {
        self.inner.queue.drain();

        let (session, dispatcher) = {
            let mut link = self.inner.link.lock();
            match link.state {
                ConnectionState::Open | ConnectionState::Opening => {
                    link.state = ConnectionState::Closing;
                    (link.session.take(), link.dispatcher.take())
                }
                ConnectionState::Closing | ConnectionState::Closed => return Ok(()),
            }
        };

        let result = match session {
            Some(session) => session.close().await.map_err(DriverError::Close),
            None => Ok(()),
        };
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }

        self.inner.link.lock().state = ConnectionState::Closed;
        info!("Coordinator link closed");
        let _ = self.inner.events.send(DriverEvent::Closed);
        result
    }

    /// Send a command with default options.
    ///
    /// Resolves with the response message, the status confirmation when the
    /// command declares no response, or `None` when nothing was awaited.
    pub async fn send_command(&self, code: u16, payload: Payload) -> Result<Option<Message>> {
        self.send_command_with(code, payload, SendOptions::default())
            .await
    }

    /// Send a command.
    pub async fn send_command_with(
        &self,
        code: u16,
        payload: Payload,
        options: SendOptions,
    ) -> Result<Option<Message>> {
        let inner = &self.inner;
        let name = inner
            .catalog
            .get(code)
            .map(|spec| spec.name)
            .unwrap_or("unknown");

        let outcome = match inner.queue.execute(inner.execute(code, payload, options)).await {
            Ok(outcome) => outcome,
            Err(drained) => Err(drained.into()),
        };
        outcome.map_err(|source| {
            debug!("{} (0x{:04X}) failed: {}", name, code, source);
            DriverError::Command { code, name, source }
        })
    }

    /// Query the firmware version.
    pub async fn version(&self) -> Result<Message> {
        let reply = self.send_command(CMD_GET_VERSION, Payload::new()).await;
        expect_message(CMD_GET_VERSION, "GetVersion", reply)
    }

    /// Query the network the coordinator is running.
    pub async fn network_state(&self) -> Result<Message> {
        let reply = self
            .send_command(CMD_GET_NETWORK_STATE, Payload::new())
            .await;
        expect_message(CMD_GET_NETWORK_STATE, "GetNetworkState", reply)
    }

    /// Allow devices to join for `seconds` (0 closes, 255 keeps it open).
    pub async fn permit_join(&self, seconds: u8) -> Result<Message> {
        let payload = Payload::new()
            .with("target_short_address", PERMIT_JOIN_BROADCAST)
            .with("interval", seconds)
            .with("tc_significance", 0u8);
        let reply = self.send_command(CMD_PERMIT_JOIN, payload).await;
        expect_message(CMD_PERMIT_JOIN, "PermitJoin", reply)
    }

    /// Restart the coordinator and wait for it to come back.
    pub async fn reset(&self) -> Result<Message> {
        let options = SendOptions::default().timeout(self.inner.config.reset_timeout());
        let reply = self
            .send_command_with(CMD_RESET, Payload::new(), options)
            .await;
        expect_message(CMD_RESET, "Reset", reply)
    }

    /// Form or resume the network.
    pub async fn start_network(&self) -> Result<Message> {
        let reply = self.send_command(CMD_START_NETWORK, Payload::new()).await;
        expect_message(CMD_START_NETWORK, "StartNetwork", reply)
    }
}

fn expect_message(code: u16, name: &'static str, reply: Result<Option<Message>>) -> Result<Message> {
    reply?.ok_or(DriverError::Command {
        code,
        name,
        source: CommandError::NoResponse,
    })
}

impl Inner {
    fn session(&self) -> Option<Arc<Session>> {
        let link = self.link.lock();
        match link.state {
            ConnectionState::Open => link.session.clone(),
            _ => None,
        }
    }

    /// One command, run inside the queue.
    async fn execute(
        &self,
        code: u16,
        payload: Payload,
        options: SendOptions,
    ) -> std::result::Result<Option<Message>, CommandError> {
        let request = Arc::new(self.catalog.build_request(code, payload)?);
        let wire = request.encode();
        let session = self.session().ok_or(CommandError::NotOpen)?;

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.command_timeout());
        let extra = options.extra.map(Arc::new);

        let responses: Vec<WaitHandle<MessagePolicy>> = if options.disable_response {
            Vec::new()
        } else {
            request
                .response_rules()
                .iter()
                .map(|rules| {
                    let matcher = Matcher::new(Arc::clone(&request), rules.clone(), extra.clone());
                    self.waiters.register(matcher, timeout)
                })
                .collect()
        };
        let status = request
            .wait_status()
            .then(|| {
                self.waiters
                    .register(Matcher::status(Arc::clone(&request)), timeout)
            })
            .map(WaitHandle::start);

        debug!(
            "Sending {} (0x{:04X}) {} [{} response(s), status: {}]",
            request.name(),
            request.code(),
            request.payload(),
            responses.len(),
            status.is_some()
        );

        // Every early return below drops the remaining handles, which
        // removes them from the registry.
        session.write(&wire, timeout).await.map_err(CommandError::Write)?;

        if let Some(status) = status {
            let status = status.wait().await?;
            if !status.is_success_status() {
                return Err(CommandError::Status {
                    status: status.status().unwrap_or(u8::MAX),
                    message: status,
                });
            }
            if responses.is_empty() {
                return Ok(Some(status));
            }
        }

        if responses.is_empty() {
            return Ok(None);
        }
        Ok(Some(first_of(responses).await?))
    }

    fn dispatch(&self, body: &[u8]) {
        let message = match Frame::parse(body).and_then(|frame| Message::decode(&frame)) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                return;
            }
        };
        debug!(
            "Received {} (0x{:04X}) {} lqi={}",
            message.name, message.code, message.payload, message.lqi
        );

        self.waiters.settle(&message);

        let event = match message.announced_device() {
            Some((short_address, extended_address)) => Some(DriverEvent::DeviceJoined {
                short_address,
                extended_address,
            }),
            None => match message.code {
                MSG_LEAVE_INDICATION => Some(DriverEvent::DeviceLeft(message)),
                MSG_DATA_INDICATION => Some(DriverEvent::Received(message)),
                _ => None,
            },
        };
        if let Some(event) = event {
            // No subscribers is not an error
            let _ = self.events.send(event);
        }
    }

    fn transport_closed(&self, generation: u64, error: Option<io::Error>) {
        let session = {
            let mut link = self.link.lock();
            if link.generation != generation
                || matches!(
                    link.state,
                    ConnectionState::Closing | ConnectionState::Closed
                )
            {
                return;
            }
            link.state = ConnectionState::Closed;
            // The dispatcher is the caller; detach rather than abort it
            link.dispatcher.take();
            link.session.take()
        };

        self.queue.drain();
        match error {
            Some(e) => warn!("Coordinator link failed: {}", e),
            None => warn!("Coordinator link closed by peer"),
        }
        drop(session);
        let _ = self.events.send(DriverEvent::Closed);
    }
}

async fn dispatch_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            SessionEvent::Frame(body) => inner.dispatch(&body),
            SessionEvent::Closed => {
                inner.transport_closed(generation, None);
                return;
            }
            SessionEvent::Error(e) => {
                inner.transport_closed(generation, Some(e));
                return;
            }
        }
    }
}
