//! RfidReader -- the session state machine for one reader.
//!
//! A reader moves through
//! `Disconnected → Connecting → Initializing → Ready ⇄ Scanning` and back to
//! `Disconnected`. [`connect`](RfidReader::connect) opens the link, spawns
//! the IO task, and runs the initialization sequence (stop any running
//! inventory, set the heartbeat, read the identification). Every later
//! operation validates its arguments against the [`ReaderModel`] and then
//! goes through the IO task's single command slot.
//!
//! The session lock is never held across a command round trip; the IO task
//! takes the same lock to apply inventory reports and input changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use rfidlib_core::error::{Error, ReaderErrorCode, Result};
use rfidlib_core::events::{EventBus, EventKind, EventSubscription, ReaderEvent};
use rfidlib_core::session::SharedSession;
use rfidlib_core::tag::Tag;
use rfidlib_core::transport::Transport;
use rfidlib_core::types::{
    AntennaMode, ConnectionState, LinkKind, Multiplex, ProtocolDialect, ReaderIdentity,
    ReaderModel,
};
use rfidlib_line_io::commands::{self, Command};
use rfidlib_line_io::{
    CommandHandle, Dialect, IoConfig, IoContext, LineChannel, ReaderIo, Reply, spawn_io_task,
};
use rfidlib_transport::{SerialTransport, TcpTransport};

use rfidlib_ascii::AsciiDialect;
use rfidlib_at::AtDialect;

/// Where the reader's bytes come from.
pub(crate) enum Link {
    Serial { port: String, baud_rate: u32 },
    Tcp { addr: String },
    /// A transport handed in by the caller. Usable for one connection.
    Provided {
        transport: Mutex<Option<Box<dyn Transport>>>,
        kind: LinkKind,
    },
}

impl Link {
    fn kind(&self) -> LinkKind {
        match self {
            Link::Serial { .. } => LinkKind::Serial,
            Link::Tcp { .. } => LinkKind::Network,
            Link::Provided { kind, .. } => *kind,
        }
    }
}

/// Timing knobs collected by the builder.
#[derive(Debug, Clone)]
pub(crate) struct Timing {
    pub command_timeout: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub reset_delay: Duration,
    pub connect_timeout: Duration,
}

/// Pick the wire dialect for a model.
pub fn dialect_for(protocol: ProtocolDialect) -> Arc<dyn Dialect> {
    match protocol {
        ProtocolDialect::At => Arc::new(AtDialect::new()),
        ProtocolDialect::Ascii => Arc::new(AsciiDialect::new()),
    }
}

/// A reader session.
///
/// Constructed via [`ReaderBuilder`](crate::builder::ReaderBuilder).
pub struct RfidReader {
    model: ReaderModel,
    link: Link,
    dialect: Arc<dyn Dialect>,
    session: SharedSession,
    events: EventBus,
    io: Mutex<Option<ReaderIo>>,
    timing: Timing,
}

impl RfidReader {
    pub(crate) fn new(
        model: ReaderModel,
        link: Link,
        session: SharedSession,
        events: EventBus,
        timing: Timing,
    ) -> Self {
        RfidReader {
            dialect: dialect_for(model.protocol),
            model,
            link,
            session,
            events,
            io: Mutex::new(None),
            timing,
        }
    }

    pub fn model(&self) -> &ReaderModel {
        &self.model
    }

    pub fn link_kind(&self) -> LinkKind {
        self.link.kind()
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Open the link and initialize the reader.
    ///
    /// Does nothing if already connected. On failure the IO task is torn
    /// down and the session is back in `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let mut io_guard = self.io.lock().await;
        if let Some(io) = io_guard.as_ref() {
            if io.handle().is_alive() {
                debug!(model = self.model.name, "already connected");
                return Ok(());
            }
        }
        if let Some(stale) = io_guard.take() {
            if let Err(e) = stale.shutdown().await {
                debug!(error = %e, "closing stale connection");
            }
        }

        self.set_state(ConnectionState::Connecting).await;
        let transport = match self.open_transport().await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(model = self.model.name, error = %e, "failed to open link");
                self.set_state(ConnectionState::Disconnected).await;
                return Err(e);
            }
        };

        self.session.lock().await.reset_connection();
        let channel = LineChannel::new(
            transport,
            self.dialect.line_terminator(),
            self.timing.poll_interval,
        );
        let io = spawn_io_task(
            channel,
            IoConfig {
                poll_interval: self.timing.poll_interval,
                ..IoConfig::default()
            },
            IoContext {
                dialect: Arc::clone(&self.dialect),
                session: Arc::clone(&self.session),
                events: self.events.clone(),
            },
        );

        self.set_state(ConnectionState::Initializing).await;
        match self.initialize(&io.handle()).await {
            Ok(()) => {
                *io_guard = Some(io);
                self.set_state(ConnectionState::Ready).await;
                info!(model = self.model.name, dialect = self.dialect.name(), "reader ready");
                Ok(())
            }
            Err(e) => {
                warn!(model = self.model.name, error = %e, "initialization failed");
                if let Err(close) = io.shutdown().await {
                    debug!(error = %close, "closing link after failed initialization");
                }
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Stop the IO task and close the link. The tag store is cleared.
    ///
    /// A command still awaiting its reply fails with
    /// [`Error::ConnectionLost`].
    pub async fn disconnect(&self) -> Result<()> {
        let io = self.io.lock().await.take();
        let result = match io {
            Some(io) => io.shutdown().await,
            None => Ok(()),
        };
        self.set_state(ConnectionState::Disconnected).await;
        info!(model = self.model.name, "disconnected");
        result
    }

    /// True while the session is `Ready` or `Scanning`.
    pub async fn is_connected(&self) -> bool {
        self.state().await.is_operational()
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state
    }

    /// Identification read during initialization.
    pub async fn identity(&self) -> Option<ReaderIdentity> {
        self.session.lock().await.identity.clone()
    }

    /// Reset the reader and re-run initialization.
    pub async fn reset(&self) -> Result<()> {
        let handle = self.handle().await?;
        self.run(&handle, &Command::Reset).await?;
        debug!(delay = ?self.timing.reset_delay, "waiting for reader to restart");
        tokio::time::sleep(self.timing.reset_delay).await;

        {
            let mut session = self.session.lock().await;
            session.reset_connection();
            session.set_antenna_mode(AntennaMode::Single(1));
        }
        self.set_state(ConnectionState::Initializing).await;
        match self.initialize(&handle).await {
            Ok(()) => {
                self.set_state(ConnectionState::Ready).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "re-initialization after reset failed");
                if let Err(close) = self.disconnect().await {
                    debug!(error = %close, "closing link after failed reset");
                }
                Err(e)
            }
        }
    }

    async fn open_transport(&self) -> Result<Box<dyn Transport>> {
        match &self.link {
            Link::Serial { port, baud_rate } => {
                Ok(Box::new(SerialTransport::open(port, *baud_rate).await?))
            }
            Link::Tcp { addr } => Ok(Box::new(
                TcpTransport::connect_with_timeout(addr, self.timing.connect_timeout).await?,
            )),
            Link::Provided { transport, .. } => transport.lock().await.take().ok_or_else(|| {
                Error::Transport("provided transport was already used by an earlier connection".into())
            }),
        }
    }

    /// Stop inventory, set the heartbeat, read the identification.
    async fn initialize(&self, handle: &CommandHandle) -> Result<()> {
        self.stop_running_inventory(handle).await?;

        if self.model.supports_heartbeat {
            let secs = match self.link.kind() {
                LinkKind::Network => {
                    u32::try_from(self.timing.heartbeat_interval.as_secs()).unwrap_or(u32::MAX)
                }
                LinkKind::Serial => 0,
            };
            self.run_set(handle, &Command::SetHeartbeat(secs)).await?;
            self.session.lock().await.heartbeat_secs = secs;
        }

        let reply = self.run(handle, &Command::DeviceInfo).await?;
        let identity = commands::parse_identity(&reply)?;
        info!(
            firmware = %identity.firmware_name,
            version = %identity.firmware,
            hardware = %identity.hardware_name,
            serial = %identity.serial_number,
            "reader identified"
        );
        self.session.lock().await.identity = Some(identity);
        Ok(())
    }

    /// Stop inventory, treating "not running" as success.
    async fn stop_running_inventory(&self, handle: &CommandHandle) -> Result<()> {
        match self.run(handle, &Command::StopInventory).await {
            Ok(_) => Ok(()),
            Err(e) if e.reader_code() == Some(ReaderErrorCode::NotRunning) => {
                debug!("no inventory was running");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        {
            let mut session = self.session.lock().await;
            if session.state == state {
                return;
            }
            debug!(from = %session.state, to = %state, "state change");
            if state == ConnectionState::Disconnected {
                session.mark_disconnected();
            } else {
                session.state = state;
            }
        }
        self.events.publish(ReaderEvent::StatusChanged {
            state,
            timestamp: Utc::now(),
        });
    }

    // -----------------------------------------------------------------
    // Command plumbing
    // -----------------------------------------------------------------

    async fn handle(&self) -> Result<CommandHandle> {
        self.io
            .lock()
            .await
            .as_ref()
            .map(ReaderIo::handle)
            .ok_or(Error::NotConnected)
    }

    async fn run(&self, handle: &CommandHandle, command: &Command) -> Result<Reply> {
        let text = self.dialect.encode(command);
        debug!(command = %text, "execute");
        handle.execute(&text, self.timing.command_timeout).await
    }

    async fn run_set(&self, handle: &CommandHandle, command: &Command) -> Result<()> {
        let reply = self.run(handle, command).await?;
        commands::expect_empty(&reply)
    }

    async fn send(&self, command: &Command) -> Result<Reply> {
        let handle = self.handle().await?;
        self.run(&handle, command).await
    }

    async fn send_set(&self, command: &Command) -> Result<()> {
        let handle = self.handle().await?;
        self.run_set(&handle, command).await
    }

    /// Send a raw command line and return its reply.
    pub async fn execute(&self, text: &str) -> Result<Reply> {
        self.execute_with_timeout(text, self.timing.command_timeout)
            .await
    }

    pub async fn execute_with_timeout(&self, text: &str, timeout: Duration) -> Result<Reply> {
        let handle = self.handle().await?;
        handle.execute(text, timeout).await
    }

    /// Send a raw command that carries no reply data.
    pub async fn set_command(&self, text: &str) -> Result<()> {
        let reply = self.execute(text).await?;
        commands::expect_empty(&reply)
    }

    /// Send a raw query and return its value, header stripped.
    pub async fn get_command(&self, text: &str) -> Result<String> {
        let reply = self.execute(text).await?;
        if reply.is_empty() {
            return Err(reply.malformed());
        }
        Ok(rfidlib_line_io::protocol::reply_value(reply.payload()).to_string())
    }

    // -----------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------

    /// Start continuous inventory. Clears the tag store first.
    pub async fn start_inventory(&self) -> Result<()> {
        let handle = self.handle().await?;
        self.session.lock().await.clear_tags();
        self.run_set(&handle, &Command::StartInventory).await?;
        self.set_state(ConnectionState::Scanning).await;
        Ok(())
    }

    /// Stop continuous inventory. A reader that was not scanning is fine.
    pub async fn stop_inventory(&self) -> Result<()> {
        let handle = self.handle().await?;
        self.stop_running_inventory(&handle).await?;
        if self.state().await == ConnectionState::Scanning {
            self.set_state(ConnectionState::Ready).await;
        }
        Ok(())
    }

    /// Run one inventory round and return the tags it saw.
    ///
    /// The sightings go into the same store continuous inventory uses. The
    /// reply is complete, so nothing waits for a multiplex round marker.
    pub async fn inventory(&self) -> Result<Vec<Tag>> {
        let reply = self.send(&Command::Inventory).await?;
        let reports = reply
            .lines
            .iter()
            .map(|line| self.dialect.parse_inventory(line))
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        let tags: Vec<Tag> = {
            let mut session = self.session.lock().await;
            reports
                .into_iter()
                .flat_map(|report| session.apply_inventory_now(report, now))
                .collect()
        };
        if !tags.is_empty() {
            self.events.publish(ReaderEvent::InventoryUpdated {
                tags: tags.clone(),
                timestamp: now,
            });
        }
        Ok(tags)
    }

    /// Every tag seen in the current inventory session.
    pub async fn tags(&self) -> Vec<Tag> {
        self.session.lock().await.tags.tags().to_vec()
    }

    pub async fn tag(&self, id: &str) -> Option<Tag> {
        self.session.lock().await.tags.get(id).cloned()
    }

    pub async fn clear_tags(&self) {
        self.session.lock().await.clear_tags();
    }

    // -----------------------------------------------------------------
    // Antennas
    // -----------------------------------------------------------------

    /// Select one antenna port.
    pub async fn set_antenna(&self, port: u8) -> Result<()> {
        self.model.check_antenna(port)?;
        self.send_set(&Command::SetAntenna(port)).await?;
        self.session
            .lock()
            .await
            .set_antenna_mode(AntennaMode::Single(port));
        Ok(())
    }

    /// Ask the reader which antenna port is selected.
    pub async fn get_antenna(&self) -> Result<u8> {
        let reply = self.send(&Command::GetAntenna).await?;
        commands::parse_number(&reply)
    }

    /// The recorded port in single-antenna mode.
    pub async fn current_antenna(&self) -> Option<u8> {
        self.session.lock().await.current_antenna()
    }

    pub async fn is_single_antenna(&self) -> bool {
        self.session.lock().await.antenna().is_single()
    }

    /// Cycle through several antenna ports while scanning.
    pub async fn set_antenna_multiplex(&self, multiplex: Multiplex) -> Result<()> {
        match &multiplex {
            Multiplex::Count(n) => {
                if *n == 0 || *n > self.model.antenna_count {
                    return Err(Error::InvalidParameter(format!(
                        "multiplex count {n} out of range (1..={})",
                        self.model.antenna_count
                    )));
                }
            }
            Multiplex::Sequence(ports) => {
                if ports.is_empty() {
                    return Err(Error::InvalidParameter(
                        "multiplex sequence must name at least one port".into(),
                    ));
                }
                for port in ports {
                    self.model.check_antenna(*port)?;
                }
            }
        }
        self.send_set(&Command::SetMultiplex(multiplex.clone()))
            .await?;
        self.session
            .lock()
            .await
            .set_antenna_mode(AntennaMode::Multiplex(multiplex.ports()));
        Ok(())
    }

    /// The port sequence the reader cycles through.
    pub async fn get_antenna_multiplex(&self) -> Result<Vec<u8>> {
        let reply = self.send(&Command::GetMultiplex).await?;
        commands::parse_multiplex(&reply)
    }

    // -----------------------------------------------------------------
    // Digital IO
    // -----------------------------------------------------------------

    /// Drive one output pin, leaving the others untouched.
    pub async fn set_output(&self, pin: u8, high: bool) -> Result<()> {
        self.model.check_output_pin(pin)?;
        let fields = commands::single_output(pin, high, self.model.output_pins);
        self.send_set(&Command::SetOutputs(fields)).await
    }

    /// All output levels. Pins the reader leaves blank read as low.
    pub async fn get_outputs(&self) -> Result<Vec<bool>> {
        let reply = self.send(&Command::GetOutputs).await?;
        let levels = commands::parse_levels(&reply)?;
        Ok(levels.into_iter().map(|l| l.unwrap_or(false)).collect())
    }

    pub async fn get_output(&self, pin: u8) -> Result<bool> {
        self.model.check_output_pin(pin)?;
        let reply = self.send(&Command::GetOutputs).await?;
        pin_level(&reply, pin)
    }

    /// All input levels. Updates the cached levels.
    pub async fn get_inputs(&self) -> Result<Vec<bool>> {
        let reply = self.send(&Command::GetInputs).await?;
        let levels = commands::parse_levels(&reply)?;
        let mut session = self.session.lock().await;
        for (idx, level) in levels.iter().enumerate() {
            if let (Some(high), Ok(pin)) = (level, u8::try_from(idx + 1)) {
                session.set_input(pin, *high);
            }
        }
        Ok(levels.into_iter().map(|l| l.unwrap_or(false)).collect())
    }

    pub async fn get_input(&self, pin: u8) -> Result<bool> {
        self.model.check_input_pin(pin)?;
        let reply = self.send(&Command::GetInputs).await?;
        let high = pin_level(&reply, pin)?;
        self.session.lock().await.set_input(pin, high);
        Ok(high)
    }

    /// Last level reported for an input pin, by query or notification.
    pub async fn last_input(&self, pin: u8) -> Option<bool> {
        let session = self.session.lock().await;
        let idx = usize::from(pin.checked_sub(1)?);
        session.inputs.get(idx).copied().flatten()
    }

    /// Turn input-change notifications on or off.
    pub async fn enable_input_events(&self, enabled: bool) -> Result<()> {
        if self.model.input_pins == 0 {
            return Err(Error::Unsupported(format!(
                "{} has no input pins",
                self.model.name
            )));
        }
        if let Some(required) = self.model.input_events_since {
            let firmware = self
                .session
                .lock()
                .await
                .identity
                .as_ref()
                .map(|id| id.firmware)
                .ok_or(Error::NotConnected)?;
            if firmware < required {
                return Err(Error::Unsupported(format!(
                    "input events need firmware {required} or newer (reader has {firmware})"
                )));
            }
        }
        self.send_set(&Command::SetInputEvents(enabled)).await?;
        self.session.lock().await.input_events_enabled = enabled;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Heartbeat and power
    // -----------------------------------------------------------------

    /// Set the heartbeat interval. Zero turns heartbeats off.
    pub async fn set_heartbeat(&self, interval: Duration) -> Result<()> {
        if !self.model.supports_heartbeat {
            return Err(Error::Unsupported(format!(
                "{} has no heartbeat",
                self.model.name
            )));
        }
        let secs = u32::try_from(interval.as_secs()).map_err(|_| {
            Error::InvalidParameter(format!("heartbeat interval {interval:?} out of range"))
        })?;
        self.send_set(&Command::SetHeartbeat(secs)).await?;
        self.session.lock().await.heartbeat_secs = secs;
        Ok(())
    }

    /// Set transmit power in device units.
    pub async fn set_power(&self, level: u16) -> Result<()> {
        self.model.check_power(level)?;
        self.send_set(&Command::SetPower(level)).await
    }

    pub async fn get_power(&self) -> Result<u16> {
        if self.model.power_range.is_none() {
            return Err(Error::Unsupported(format!(
                "{} has no adjustable power",
                self.model.name
            )));
        }
        let reply = self.send(&Command::GetPower).await?;
        commands::parse_number(&reply)
    }

    // -----------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------

    /// Receive every event.
    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.events.subscribe()
    }

    /// Receive only the given kinds of event.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        self.events.subscribe_to(kinds)
    }
}

/// Level of one pin from an `IN?`/`OUT?` reply. Blank reads as low.
fn pin_level(reply: &Reply, pin: u8) -> Result<bool> {
    let levels = commands::parse_levels(reply)?;
    let idx = usize::from(pin.saturating_sub(1));
    match levels.get(idx) {
        Some(level) => Ok(level.unwrap_or(false)),
        None => Err(reply.malformed()),
    }
}
