//! ReaderBuilder -- fluent builder for [`RfidReader`] instances.
//!
//! Separates configuration from connection: `build()` only assembles the
//! session, [`RfidReader::connect`] opens the link.
//!
//! # Example
//!
//! ```no_run
//! use rfidlib::ReaderBuilder;
//! use rfidlib::at::models::pulsar_lr;
//! use std::time::Duration;
//!
//! # async fn example() -> rfidlib::Result<()> {
//! let reader = ReaderBuilder::new(pulsar_lr())
//!     .tcp_address("192.168.2.239")
//!     .heartbeat_interval(Duration::from_secs(10))
//!     .build()
//!     .await?;
//! reader.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::Mutex;

use rfidlib_core::error::{Error, Result};
use rfidlib_core::events::{DEFAULT_EVENT_CAPACITY, EventBus};
use rfidlib_core::session::SessionState;
use rfidlib_core::transport::Transport;
use rfidlib_core::types::{LinkKind, ReaderModel};

use crate::reader::{Link, RfidReader, Timing};

/// Fluent builder for [`RfidReader`].
///
/// Defaults come from the [`ReaderModel`]; only the link has to be set.
pub struct ReaderBuilder {
    model: ReaderModel,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    tcp_address: Option<String>,
    command_timeout: Duration,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    reset_delay: Duration,
    connect_timeout: Duration,
    event_capacity: usize,
}

impl ReaderBuilder {
    pub fn new(model: ReaderModel) -> Self {
        ReaderBuilder {
            model,
            serial_port: None,
            baud_rate: None,
            tcp_address: None,
            command_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(10),
            reset_delay: Duration::from_millis(1500),
            connect_timeout: Duration::from_secs(5),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the model's default baud rate.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Network address, `host` or `host:port`. Without a port the model's
    /// default TCP port is used. Takes precedence over a serial port.
    pub fn tcp_address(mut self, addr: &str) -> Self {
        self.tcp_address = Some(addr.to_string());
        self
    }

    /// How long a command may wait for its terminal line.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Heartbeat requested on network links during initialization.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Settle time between a reset command and re-initialization.
    pub fn reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Assemble a reader for the configured serial port or TCP address.
    ///
    /// Must run inside a Tokio runtime; the event dispatch task is spawned
    /// here.
    pub async fn build(self) -> Result<RfidReader> {
        let link = if let Some(addr) = &self.tcp_address {
            Link::Tcp {
                addr: self.resolve_tcp_address(addr)?,
            }
        } else if let Some(port) = &self.serial_port {
            Link::Serial {
                port: port.clone(),
                baud_rate: self.baud_rate.unwrap_or(self.model.default_baud_rate),
            }
        } else {
            return Err(Error::InvalidParameter(
                "no serial port or TCP address configured".into(),
            ));
        };
        Ok(self.assemble(link))
    }

    /// Assemble a reader around a caller-supplied transport.
    ///
    /// `kind` decides the heartbeat negotiated at connect time. The
    /// transport serves one connection.
    pub async fn build_with_transport(
        self,
        transport: Box<dyn Transport>,
        kind: LinkKind,
    ) -> RfidReader {
        self.assemble(Link::Provided {
            transport: Mutex::new(Some(transport)),
            kind,
        })
    }

    fn resolve_tcp_address(&self, addr: &str) -> Result<String> {
        if addr.rsplit_once(':').is_some() {
            return Ok(addr.to_string());
        }
        match self.model.default_tcp_port {
            Some(port) => Ok(format!("{addr}:{port}")),
            None => Err(Error::InvalidParameter(format!(
                "{} has no default TCP port; give one in the address",
                self.model.name
            ))),
        }
    }

    fn assemble(self, link: Link) -> RfidReader {
        let session = SessionState::shared(self.model.input_pins);
        let events = EventBus::new(self.event_capacity);
        let timing = Timing {
            command_timeout: self.command_timeout,
            poll_interval: self.poll_interval,
            heartbeat_interval: self.heartbeat_interval,
            reset_delay: self.reset_delay,
            connect_timeout: self.connect_timeout,
        };
        RfidReader::new(self.model, link, session, events, timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfidlib_at::models::{pulsar_lr, qr_g2};
    use rfidlib_core::types::ConnectionState;
    use rfidlib_test_harness::MockTransport;

    #[tokio::test]
    async fn build_requires_a_link() {
        let result = ReaderBuilder::new(pulsar_lr()).build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn tcp_address_gets_default_port() {
        let builder = ReaderBuilder::new(pulsar_lr());
        assert_eq!(
            builder.resolve_tcp_address("192.168.2.239").unwrap(),
            "192.168.2.239:10001"
        );
        assert_eq!(
            builder.resolve_tcp_address("reader.local:4000").unwrap(),
            "reader.local:4000"
        );
    }

    #[tokio::test]
    async fn tcp_address_without_port_needs_model_default() {
        let builder = ReaderBuilder::new(qr_g2());
        assert!(builder.resolve_tcp_address("10.0.0.5").is_err());
    }

    #[tokio::test]
    async fn serial_link_is_not_opened_by_build() {
        let reader = ReaderBuilder::new(pulsar_lr())
            .serial_port("/dev/does-not-exist")
            .baud_rate(57_600)
            .build()
            .await
            .unwrap();
        assert_eq!(reader.link_kind(), LinkKind::Serial);
        assert_eq!(reader.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn provided_transport_keeps_link_kind() {
        let reader = ReaderBuilder::new(pulsar_lr())
            .build_with_transport(Box::new(MockTransport::new()), LinkKind::Network)
            .await;
        assert_eq!(reader.link_kind(), LinkKind::Network);
        assert_eq!(reader.model().name, "Pulsar LR");
    }
}
