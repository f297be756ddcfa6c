//! IO task for line-protocol readers.
//!
//! One tokio task owns the [`LineChannel`] exclusively. It writes commands,
//! reads every line the reader sends, and routes each one: reply material
//! goes to the single in-flight command, events update the shared session
//! and are published on the [`EventBus`]. Callers talk to the task through
//! [`CommandHandle`]; replies come back on a oneshot.
//!
//! Only one command is ever outstanding. The request arm of the select is
//! disabled while the in-flight slot is occupied, so later callers wait in
//! the queue until the current command completes, fails, or times out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use rfidlib_core::error::{Error, Result};
use rfidlib_core::events::{EventBus, ReaderEvent};
use rfidlib_core::session::SharedSession;
use rfidlib_core::types::ConnectionState;

use crate::channel::LineChannel;
use crate::dialect::Dialect;
use crate::protocol::{self, EventClass, LineClass, Reply, ReplyAccumulator, Step};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Longest single wait on the channel. Bounds how late a command
    /// deadline or a new request is noticed.
    pub poll_interval: Duration,
    /// Depth of the request queue.
    pub queue_depth: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            poll_interval: Duration::from_millis(50),
            queue_depth: 32,
        }
    }
}

/// Everything the task needs besides the channel.
pub struct IoContext {
    pub dialect: Arc<dyn Dialect>,
    pub session: SharedSession,
    pub events: EventBus,
}

/// A request sent to the IO task.
enum Request {
    Command {
        text: String,
        timeout: Duration,
        reply: oneshot::Sender<Result<Reply>>,
    },
}

/// The command currently awaiting its terminal line.
struct InFlight {
    accumulator: ReplyAccumulator,
    deadline: Instant,
    reply: oneshot::Sender<Result<Reply>>,
}

impl InFlight {
    fn finish(self, result: Result<Reply>) {
        if self.reply.send(result).is_err() {
            debug!(command = self.accumulator.command(), "caller gone before reply");
        }
    }
}

/// Cloneable sender side used by the session layer.
#[derive(Clone)]
pub struct CommandHandle {
    tx: mpsc::Sender<Request>,
}

impl CommandHandle {
    /// Send `text` and wait for its reply.
    ///
    /// `timeout` runs from the moment the command is written, not from
    /// when it was queued.
    pub async fn execute(&self, text: &str, timeout: Duration) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Command {
                text: text.to_string(),
                timeout,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        reply_rx.await.unwrap_or(Err(Error::ConnectionLost))
    }

    /// True while the IO task is running.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Handle to the IO task. Stored inside the reader.
pub struct ReaderIo {
    handle: CommandHandle,
    cancel: CancellationToken,
    task: JoinHandle<LineChannel>,
}

impl ReaderIo {
    pub fn handle(&self) -> CommandHandle {
        self.handle.clone()
    }

    pub async fn execute(&self, text: &str, timeout: Duration) -> Result<Reply> {
        self.handle.execute(text, timeout).await
    }

    /// Stop the task, fail anything pending with
    /// [`Error::ConnectionLost`], and close the channel.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        match self.task.await {
            Ok(mut channel) => channel.close().await,
            Err(e) => Err(Error::Transport(format!("IO task failed: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for sending commands.
pub fn spawn_io_task(channel: LineChannel, config: IoConfig, ctx: IoContext) -> ReaderIo {
    let (tx, rx) = mpsc::channel::<Request>(config.queue_depth.max(1));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(io_loop(channel, config, ctx, rx, cancel.clone()));
    ReaderIo {
        handle: CommandHandle { tx },
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// IO loop
// ---------------------------------------------------------------------------

/// The main IO loop. Returns the channel so the owner can close it.
///
/// `tokio::select! { biased; }` priorities:
/// 1. Cancellation
/// 2. A new request, only while no command is in flight
/// 3. The next line from the reader
async fn io_loop(
    mut channel: LineChannel,
    config: IoConfig,
    ctx: IoContext,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) -> LineChannel {
    let mut in_flight: Option<InFlight> = None;
    let expects_echo = ctx.dialect.echo_prefix().is_some();

    loop {
        let now = Instant::now();
        if in_flight.as_ref().is_some_and(|f| now >= f.deadline) {
            if let Some(f) = in_flight.take() {
                let InFlight {
                    accumulator, reply, ..
                } = f;
                let err = accumulator.expire();
                debug!(error = %err, "command deadline passed");
                let _ = reply.send(Err(err));
            }
        }

        let wait = match &in_flight {
            Some(f) => config.poll_interval.min(f.deadline.saturating_duration_since(now)),
            None => config.poll_interval,
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("line IO task cancelled");
                if let Some(f) = in_flight.take() {
                    f.finish(Err(Error::ConnectionLost));
                }
                break;
            }

            req = rx.recv(), if in_flight.is_none() => {
                let Some(Request::Command { text, timeout, reply }) = req else {
                    debug!("request channel closed, exiting IO task");
                    break;
                };
                if reply.is_closed() {
                    debug!(command = %text, "dropping command abandoned while queued");
                    continue;
                }
                match channel.send_line(&text).await {
                    Ok(()) => {
                        in_flight = Some(InFlight {
                            accumulator: ReplyAccumulator::new(text, expects_echo),
                            deadline: Instant::now() + timeout,
                            reply,
                        });
                    }
                    Err(e) => {
                        error!(command = %text, error = %e, "failed to write command");
                        let fatal = e.is_communication_error();
                        let _ = reply.send(Err(e));
                        if fatal {
                            mark_disconnected(&ctx).await;
                            break;
                        }
                    }
                }
            }

            line = channel.read_line_timeout(wait) => {
                match line {
                    Ok(line) => dispatch_line(&line, &mut in_flight, &ctx).await,
                    Err(Error::Timeout { .. }) => {}
                    Err(e) => {
                        error!(error = %e, "reader connection failed");
                        if let Some(f) = in_flight.take() {
                            f.finish(Err(e));
                        }
                        mark_disconnected(&ctx).await;
                        break;
                    }
                }
            }
        }
    }

    rx.close();
    while let Ok(Request::Command { reply, .. }) = rx.try_recv() {
        let _ = reply.send(Err(Error::ConnectionLost));
    }
    channel
}

async fn mark_disconnected(ctx: &IoContext) {
    if !ctx.session.lock().await.mark_disconnected() {
        return;
    }
    ctx.events.publish(ReaderEvent::StatusChanged {
        state: ConnectionState::Disconnected,
        timestamp: Utc::now(),
    });
}

/// Route one line to the in-flight command or the event handlers.
async fn dispatch_line(line: &str, in_flight: &mut Option<InFlight>, ctx: &IoContext) {
    let dialect = &*ctx.dialect;
    match protocol::classify_line(line, dialect, in_flight.is_some()) {
        LineClass::Empty => {}
        LineClass::Event(class) => handle_event(class, line.trim(), ctx).await,
        LineClass::Reply => {
            let Some(f) = in_flight.as_mut() else {
                debug!(line, "reply line with no command outstanding");
                return;
            };
            if let Step::Done(result) = f.accumulator.feed(line, dialect) {
                if let Some(f) = in_flight.take() {
                    f.finish(result);
                }
            }
        }
    }
}

async fn handle_event(class: EventClass, line: &str, ctx: &IoContext) {
    match class {
        EventClass::Heartbeat => trace!("heartbeat"),
        EventClass::Inventory => match ctx.dialect.parse_inventory(line) {
            Ok(report) if report.is_empty() => {}
            Ok(report) => {
                let tags = ctx
                    .session
                    .lock()
                    .await
                    .apply_inventory(report, Utc::now());
                if !tags.is_empty() {
                    ctx.events.publish(ReaderEvent::InventoryUpdated {
                        tags,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => warn!(line, error = %e, "unparseable inventory line"),
        },
        EventClass::InputChange => match protocol::parse_input_change(line) {
            Ok((pin, high)) => {
                ctx.session.lock().await.set_input(pin, high);
                ctx.events.publish(ReaderEvent::InputChanged {
                    pin,
                    high,
                    timestamp: Utc::now(),
                });
            }
            Err(_) => ctx.dialect.handle_unsolicited(line),
        },
        EventClass::Other => ctx.dialect.handle_unsolicited(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use rfidlib_core::error::{ReaderErrorCode, TransponderErrorCode};
    use rfidlib_core::events::EventKind;
    use rfidlib_core::session::SessionState;
    use rfidlib_core::tag::{InventoryReport, TagKind, TagSighting};
    use rfidlib_core::transport::Transport;
    use rfidlib_test_harness::MockTransport;

    /// AT-style dialect with a trivial `+CINV: <EPC>` record.
    struct TestDialect;

    impl Dialect for TestDialect {
        fn name(&self) -> &'static str {
            "test"
        }
        fn line_terminator(&self) -> &'static str {
            "\r\n"
        }
        fn echo_prefix(&self) -> Option<&'static str> {
            Some("AT")
        }
        fn encode(&self, command: &Command) -> String {
            format!("AT+{}", command.body())
        }
        fn parse_inventory(&self, line: &str) -> Result<InventoryReport> {
            let value = protocol::reply_value(line);
            if value.starts_with('<') {
                return Ok(InventoryReport::default());
            }
            Ok(InventoryReport {
                sightings: vec![TagSighting::new(value, TagKind::Uhf { rssi: None })],
                round_antenna: None,
            })
        }
        fn classify_error(&self, command: &str, detail: &str) -> Error {
            if detail == "NO TAG" {
                Error::Transponder {
                    command: command.into(),
                    code: TransponderErrorCode::NoTag,
                    message: detail.into(),
                }
            } else {
                Error::Reader {
                    command: command.into(),
                    code: ReaderErrorCode::Other,
                    message: detail.into(),
                }
            }
        }
    }

    struct Fixture {
        mock: MockTransport,
        io: ReaderIo,
        session: SharedSession,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        let mock = MockTransport::new();
        let session = SessionState::shared(2);
        let events = EventBus::new(64);
        let channel = LineChannel::new(Box::new(mock.clone()), "\r\n", Duration::from_millis(10));
        let config = IoConfig {
            poll_interval: Duration::from_millis(10),
            queue_depth: 8,
        };
        let io = spawn_io_task(
            channel,
            config,
            IoContext {
                dialect: Arc::new(TestDialect),
                session: session.clone(),
                events: events.clone(),
            },
        );
        Fixture {
            mock,
            io,
            session,
            events,
        }
    }

    const T: Duration = Duration::from_millis(300);

    // =======================================================================
    // Command exchanges
    // =======================================================================

    #[tokio::test]
    async fn echo_and_ok_give_empty_payload() {
        let fx = fixture();
        fx.mock.expect(b"AT+ANT=2\r\n", b"AT+ANT=2\r\nOK\r\n");

        let reply = fx.io.execute("AT+ANT=2", T).await.unwrap();
        assert_eq!(reply.payload(), "");
        assert_eq!(fx.mock.sent_lines(), vec!["AT+ANT=2".to_string()]);
    }

    #[tokio::test]
    async fn data_line_becomes_payload() {
        let fx = fixture();
        fx.mock.expect(b"AT+MUX?\r\n", b"AT+MUX?\r\n+MUX: 3\r\nOK\r\n");

        let reply = fx.io.execute("AT+MUX?", T).await.unwrap();
        assert_eq!(reply.payload(), "+MUX: 3");
    }

    #[tokio::test]
    async fn heartbeat_during_command_is_ignored() {
        let fx = fixture();
        fx.mock
            .expect(b"AT+ANT?\r\n", b"AT+ANT?\r\n+HBT\r\n+ANT: 1\r\n+HBT\r\nOK\r\n");

        let reply = fx.io.execute("AT+ANT?", T).await.unwrap();
        assert_eq!(reply.lines, vec!["+ANT: 1".to_string()]);
    }

    #[tokio::test]
    async fn error_detail_is_classified() {
        let fx = fixture();
        fx.mock.expect(b"AT+READ\r\n", b"AT+READ\r\n<NO TAG>\r\nERROR\r\n");

        let err = fx.io.execute("AT+READ", T).await.unwrap_err();
        assert!(err.is_transponder_error());
    }

    #[tokio::test]
    async fn silence_times_out_with_command() {
        let fx = fixture();
        fx.mock.expect(b"AT+INV\r\n", b"AT+INV\r\n");

        let err = fx.io.execute("AT+INV", Duration::from_millis(60)).await.unwrap_err();
        match err {
            Error::Timeout { command } => assert_eq!(command.as_deref(), Some("AT+INV")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unterminated_reply_is_malformed() {
        let fx = fixture();
        fx.mock.expect(b"ATI\r\n", b"ATI\r\n+SW: X 0100\r\n");

        let err = fx.io.execute("ATI", Duration::from_millis(60)).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { command, .. } if command == "ATI"));
    }

    #[tokio::test]
    async fn slot_is_free_after_timeout() {
        let fx = fixture();
        fx.mock.expect(b"AT+INV\r\n", b"");
        fx.mock.expect(b"AT+ANT?\r\n", b"AT+ANT?\r\n+ANT: 1\r\nOK\r\n");

        assert!(fx.io.execute("AT+INV", Duration::from_millis(40)).await.is_err());
        let reply = fx.io.execute("AT+ANT?", T).await.unwrap();
        assert_eq!(reply.payload(), "+ANT: 1");
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let fx = fixture();
        fx.mock.expect(b"AT+ANT?\r\n", b"AT+ANT?\r\n+ANT: 1\r\nOK\r\n");
        fx.mock.expect(b"AT+MUX?\r\n", b"AT+MUX?\r\n+MUX: 2\r\nOK\r\n");

        let a = fx.io.handle();
        let b = fx.io.handle();
        let (ra, rb) = tokio::join!(a.execute("AT+ANT?", T), b.execute("AT+MUX?", T));
        assert_eq!(ra.unwrap().payload(), "+ANT: 1");
        assert_eq!(rb.unwrap().payload(), "+MUX: 2");
        assert_eq!(fx.mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn stray_reply_without_command_is_dropped() {
        let fx = fixture();
        fx.mock.inject(b"OK\r\n");
        tokio::time::sleep(Duration::from_millis(30)).await;

        fx.mock.expect(b"AT+ANT?\r\n", b"AT+ANT?\r\n+ANT: 4\r\nOK\r\n");
        let reply = fx.io.execute("AT+ANT?", T).await.unwrap();
        assert_eq!(reply.payload(), "+ANT: 4");
    }

    // =======================================================================
    // Events
    // =======================================================================

    #[tokio::test]
    async fn inventory_line_updates_store_and_notifies_once() {
        let fx = fixture();
        let mut sub = fx.events.subscribe_to(&[EventKind::Inventory]);

        fx.mock.inject(b"+CINV: 3000E2001234\r\n");

        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ReaderEvent::InventoryUpdated { tags, .. } => {
                assert_eq!(tags.len(), 1);
                assert_eq!(tags[0].id, "3000E2001234");
                assert_eq!(tags[0].seen_count, 1);
                assert!(tags[0].kind.is_uhf());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(fx.session.lock().await.tags.len(), 1);

        assert!(
            tokio::time::timeout(Duration::from_millis(50), sub.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn inventory_without_tags_does_not_notify() {
        let fx = fixture();
        let mut sub = fx.events.subscribe_to(&[EventKind::Inventory]);
        fx.mock.inject(b"+CINV: <NO TAGS FOUND>\r\n");
        assert!(
            tokio::time::timeout(Duration::from_millis(60), sub.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn inventory_during_command_does_not_disturb_reply() {
        let fx = fixture();
        let mut sub = fx.events.subscribe_to(&[EventKind::Inventory]);
        fx.mock.expect(
            b"AT+ANT?\r\n",
            b"AT+ANT?\r\n+CINV: E2801160\r\n+ANT: 1\r\nOK\r\n",
        );

        let reply = fx.io.execute("AT+ANT?", T).await.unwrap();
        assert_eq!(reply.lines, vec!["+ANT: 1".to_string()]);
        assert!(
            tokio::time::timeout(Duration::from_secs(1), sub.recv())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn input_change_updates_session_and_notifies() {
        let fx = fixture();
        let mut sub = fx.events.subscribe_to(&[EventKind::Input]);
        fx.mock.inject(b"+IEV: 2,HIGH\r\n");

        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ReaderEvent::InputChanged { pin: 2, high: true, .. }));
        assert_eq!(fx.session.lock().await.inputs[1], Some(true));
    }

    // =======================================================================
    // Shutdown and failure
    // =======================================================================

    #[tokio::test]
    async fn shutdown_fails_pending_command_with_connection_lost() {
        let fx = fixture();
        fx.mock.expect(b"AT+INV\r\n", b"AT+INV\r\n");

        let handle = fx.io.handle();
        let pending = tokio::spawn(async move {
            handle.execute("AT+INV", Duration::from_secs(10)).await
        });
        tokio::time::sleep(Duration::from_millis(40)).await;

        fx.io.shutdown().await.unwrap();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionLost)));
        assert!(!fx.mock.is_connected());
    }

    #[tokio::test]
    async fn lost_transport_fails_command_and_marks_disconnected() {
        let fx = fixture();
        fx.session.lock().await.state = ConnectionState::Ready;
        let mut sub = fx.events.subscribe_to(&[EventKind::Status]);
        fx.mock.expect(b"AT+INV\r\n", b"");

        let handle = fx.io.handle();
        let pending = tokio::spawn(async move {
            handle.execute("AT+INV", Duration::from_secs(10)).await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        fx.mock.sever();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionLost)));
        assert_eq!(fx.session.lock().await.state, ConnectionState::Disconnected);

        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            ReaderEvent::StatusChanged { state: ConnectionState::Disconnected, .. }
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!fx.io.handle().is_alive());
    }

    #[tokio::test]
    async fn commands_after_shutdown_are_not_connected() {
        let fx = fixture();
        let handle = fx.io.handle();
        fx.io.shutdown().await.unwrap();
        assert!(matches!(
            handle.execute("ATI", T).await,
            Err(Error::NotConnected)
        ));
    }
}
