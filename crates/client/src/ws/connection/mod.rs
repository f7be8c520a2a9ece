//! Self-reconnecting WebSocket with an outbound queue.
//!
//! [`connect`] spawns a driver task that owns at most one physical
//! connection at a time. When the connection errors, closes unexpectedly, or
//! fails to open within `connection_timeout`, the driver tears it down and
//! schedules a fresh one with exponential backoff. Payloads sent while no
//! connection is open are queued and flushed in order on the next open.
//!
//! Callers see a stable stream of [`SocketEvent`]s no matter how many
//! physical reconnects happen underneath.

mod driver;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use ticketdesk_shared::ClientCommand;
use tokio::sync::{mpsc, watch};

use super::room::UrlProvider;
use super::transport::Connector;

/// Connection state for a WebSocket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Events published by a socket, one per underlying transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Close {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    Error(String),
}

/// Reconnect and queueing behaviour.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Upper bound for the backoff delay.
    pub max_reconnection_delay: Duration,
    /// Delay before the first retry after a failure.
    pub min_reconnection_delay: Duration,
    /// Multiplier applied per consecutive failure.
    pub grow_factor: f64,
    /// How long a connection must stay open before it counts as healthy.
    pub min_uptime: Duration,
    /// How long an attempt may take to open.
    pub connection_timeout: Duration,
    /// Attempts before giving up (`None` = retry forever).
    pub max_retries: Option<u32>,
    /// Payloads kept while disconnected (`None` = unbounded).
    pub max_enqueued_messages: Option<usize>,
    /// Don't connect until [`WsHandle::start`] is called.
    pub start_closed: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        // Jitter the base delay so a fleet of widgets doesn't reconnect in lockstep.
        let jitter = rand::thread_rng().gen_range(0..4000);
        Self {
            max_reconnection_delay: Duration::from_millis(10_000),
            min_reconnection_delay: Duration::from_millis(1000 + jitter),
            grow_factor: 1.3,
            min_uptime: Duration::from_millis(5000),
            connection_timeout: Duration::from_millis(4000),
            max_retries: None,
            max_enqueued_messages: None,
            start_closed: false,
        }
    }
}

impl SocketOptions {
    /// Calculate the delay before an attempt, given the retry count at that attempt.
    ///
    /// The first attempt of a cycle (`retry_count <= 0`) goes out immediately.
    pub fn delay_for_attempt(&self, retry_count: i32) -> Duration {
        if retry_count <= 0 {
            return Duration::ZERO;
        }
        let max = self.max_reconnection_delay;
        let delay =
            self.min_reconnection_delay.as_secs_f64() * self.grow_factor.powi(retry_count - 1);
        if !delay.is_finite() || delay >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    pub fn with_min_reconnection_delay(mut self, delay: Duration) -> Self {
        self.min_reconnection_delay = delay;
        self
    }

    pub fn with_max_reconnection_delay(mut self, delay: Duration) -> Self {
        self.max_reconnection_delay = delay;
        self
    }

    pub fn with_grow_factor(mut self, factor: f64) -> Self {
        self.grow_factor = factor;
        self
    }

    pub fn with_min_uptime(mut self, uptime: Duration) -> Self {
        self.min_uptime = uptime;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: Option<u32>) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_max_enqueued_messages(mut self, limit: Option<usize>) -> Self {
        self.max_enqueued_messages = limit;
        self
    }

    pub fn with_start_closed(mut self, start_closed: bool) -> Self {
        self.start_closed = start_closed;
        self
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Send(String),
    Close { code: u16, reason: String },
    Reconnect { code: u16, reason: String },
    Start,
}

/// Handle for sending through a reconnecting socket. Cheap to clone.
#[derive(Clone)]
pub struct WsHandle {
    sender: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl WsHandle {
    /// Send a text payload. Queued while disconnected; never fails.
    pub fn send(&self, text: impl Into<String>) {
        if self.sender.send(Command::Send(text.into())).is_err() {
            tracing::debug!("socket driver gone, dropping payload");
        }
    }

    /// Serialize and send a chat command.
    pub fn send_command(&self, command: &ClientCommand) {
        match command.to_json() {
            Ok(json) => {
                tracing::debug!("queueing {}", command.kind());
                self.send(json);
            }
            Err(e) => tracing::error!("Serialize failed: {}", e),
        }
    }

    /// Close the socket and stop reconnecting. Idempotent.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.sender.send(Command::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Drop the current connection (if any) and start a fresh connect cycle.
    pub fn reconnect(&self, code: u16, reason: &str) {
        let _ = self.sender.send(Command::Reconnect {
            code,
            reason: reason.to_string(),
        });
    }

    /// Open a socket created with `start_closed`. Does nothing if it is already running.
    pub fn start(&self) {
        let _ = self.sender.send(Command::Start);
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Spawn a reconnecting socket on the current tokio runtime.
///
/// The driver keeps running after [`WsHandle::close`] so the socket can be
/// reopened with [`WsHandle::reconnect`]; it exits once every handle is dropped.
pub fn connect(
    url: UrlProvider,
    connector: Arc<dyn Connector>,
    options: SocketOptions,
) -> (WsHandle, mpsc::UnboundedReceiver<SocketEvent>) {
    let (sender, commands) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

    let driver = driver::Driver::new(url, connector, options, commands, events_tx, state_tx);
    tokio::spawn(driver.run());

    (WsHandle { sender, state }, events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SocketOptions {
        SocketOptions::default()
            .with_min_reconnection_delay(Duration::from_millis(1000))
            .with_max_reconnection_delay(Duration::from_millis(10_000))
            .with_grow_factor(1.3)
    }

    #[test]
    fn first_attempt_has_no_delay() {
        let options = options();
        assert_eq!(options.delay_for_attempt(-1), Duration::ZERO);
        assert_eq!(options.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_then_caps() {
        let options = options();
        assert_eq!(options.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(options.delay_for_attempt(2), Duration::from_millis(1300));
        assert_eq!(options.delay_for_attempt(3), Duration::from_millis(1690));

        let mut previous = Duration::ZERO;
        for n in 1..40 {
            let delay = options.delay_for_attempt(n);
            assert!(delay >= previous, "delay must not shrink at attempt {n}");
            assert!(delay <= Duration::from_millis(10_000));
            previous = delay;
        }
        assert_eq!(options.delay_for_attempt(39), Duration::from_millis(10_000));
        assert_eq!(options.delay_for_attempt(i32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn default_base_delay_is_jittered_within_range() {
        for _ in 0..20 {
            let options = SocketOptions::default();
            assert!(options.min_reconnection_delay >= Duration::from_millis(1000));
            assert!(options.min_reconnection_delay < Duration::from_millis(5000));
        }
    }

    #[test]
    fn state_helpers() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_connecting());
        assert!(!ConnectionState::Failed { reason: "x".into() }.is_connecting());
    }
}
