//! The task that owns the physical connection.
//!
//! Everything runs on one task: commands from handles, frames from the live
//! transport, the in-flight connect attempt and the three timers (backoff
//! wait, connection timeout, minimum uptime) are multiplexed with
//! `tokio::select!`, so state is never touched concurrently.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};

use super::{Command, ConnectionState, SocketEvent, SocketOptions};
use crate::ws::room::UrlProvider;
use crate::ws::transport::{Connector, Frame, Transport, TransportError};

const NORMAL_CLOSURE: u16 = 1000;
const ABNORMAL_CLOSURE: u16 = 1006;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type Attempt = BoxFuture<'static, Result<Transport, TransportError>>;

pub(super) struct Driver {
    url: UrlProvider,
    connector: Arc<dyn Connector>,
    options: SocketOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SocketEvent>,
    state: watch::Sender<ConnectionState>,

    /// Attempts since the last connection that outlived `min_uptime`.
    retry_count: i32,
    should_reconnect: bool,
    /// Held from scheduling an attempt until it resolves.
    connect_lock: bool,
    queue: VecDeque<String>,
    live: Option<Transport>,
    attempt: Option<Attempt>,

    wait_until: Option<Instant>,
    connect_deadline: Option<Instant>,
    uptime_deadline: Option<Instant>,
}

impl Driver {
    pub(super) fn new(
        url: UrlProvider,
        connector: Arc<dyn Connector>,
        options: SocketOptions,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<SocketEvent>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            url,
            connector,
            options,
            commands,
            events,
            state,
            retry_count: -1,
            should_reconnect: false,
            connect_lock: false,
            queue: VecDeque::new(),
            live: None,
            attempt: None,
            wait_until: None,
            connect_deadline: None,
            uptime_deadline: None,
        }
    }

    pub(super) async fn run(mut self) {
        if !self.options.start_closed {
            self.should_reconnect = true;
            self.connect();
        }

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = wait(self.uptime_deadline) => self.accept_open(),
                frame = next_frame(&mut self.live) => self.handle_frame(frame).await,
                _ = wait(self.connect_deadline) => self.handle_timeout().await,
                outcome = poll_attempt(&mut self.attempt) => self.handle_attempt(outcome).await,
                _ = wait(self.wait_until) => self.begin_attempt(),
            }
        }

        self.close(NORMAL_CLOSURE, "").await;
        tracing::debug!("socket driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(text) => self.send(text).await,
            Command::Close { code, reason } => self.close(code, &reason).await,
            Command::Reconnect { code, reason } => self.reconnect(code, &reason).await,
            Command::Start => {
                if self.live.is_some() || self.attempt.is_some() || self.wait_until.is_some() {
                    tracing::debug!("start: socket already running");
                } else {
                    self.reconnect(NORMAL_CLOSURE, "").await;
                }
            }
        }
    }

    async fn send(&mut self, text: String) {
        if self.live.is_some() {
            self.write(Frame::Text(text)).await;
            return;
        }
        let has_room = self
            .options
            .max_enqueued_messages
            .map_or(true, |max| self.queue.len() < max);
        if has_room {
            self.queue.push_back(text);
            tracing::debug!("enqueued payload ({} waiting)", self.queue.len());
        } else {
            tracing::debug!("queue full, dropping payload");
        }
    }

    async fn write(&mut self, frame: Frame) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if let Err(e) = live.sink.send(frame).await {
            tracing::error!("Send failed: {}", e);
        }
    }

    /// Schedule the next connect attempt, honouring backoff and the retry limit.
    fn connect(&mut self) {
        if self.connect_lock || !self.should_reconnect {
            return;
        }
        if let Some(max) = self.options.max_retries {
            if i64::from(self.retry_count) >= i64::from(max) {
                tracing::warn!("giving up after {} reconnect attempts", self.retry_count);
                self.set_state(ConnectionState::Failed {
                    reason: format!("Max reconnect attempts ({max}) exceeded"),
                });
                return;
            }
        }

        self.connect_lock = true;
        self.retry_count += 1;
        let delay = self.options.delay_for_attempt(self.retry_count);
        tracing::debug!("connect attempt {} in {:?}", self.retry_count, delay);

        self.set_state(if self.retry_count == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting {
                attempt: self.retry_count as u32,
            }
        });
        self.wait_until = Some(Instant::now() + delay);
    }

    /// Backoff elapsed: resolve the URL and open a new transport.
    fn begin_attempt(&mut self) {
        self.wait_until = None;
        if !self.should_reconnect {
            self.connect_lock = false;
            return;
        }

        let url = self.url.clone();
        let connector = Arc::clone(&self.connector);
        self.attempt = Some(Box::pin(async move {
            let url = url.resolve().await;
            tracing::debug!("connecting to {}", url);
            connector.connect(&url).await
        }));
        self.connect_deadline = Some(Instant::now() + self.options.connection_timeout);
    }

    async fn handle_attempt(&mut self, outcome: Result<Transport, TransportError>) {
        self.attempt = None;
        self.connect_lock = false;
        self.connect_deadline = None;

        match outcome {
            Ok(transport) => {
                debug_assert!(self.live.is_none(), "two live transports");
                self.live = Some(transport);
                self.handle_open().await;
            }
            Err(e) => self.handle_error(e.to_string(), false).await,
        }
    }

    async fn handle_open(&mut self) {
        tracing::info!("socket open");
        self.uptime_deadline = Some(Instant::now() + self.options.min_uptime);

        while let Some(text) = self.queue.pop_front() {
            self.write(Frame::Text(text)).await;
        }

        self.set_state(ConnectionState::Connected);
        self.emit(SocketEvent::Open);
    }

    /// The connection stayed up long enough to count as healthy.
    fn accept_open(&mut self) {
        self.uptime_deadline = None;
        tracing::debug!("connection accepted");
        self.retry_count = 0;
    }

    async fn handle_timeout(&mut self) {
        self.connect_deadline = None;
        if self.attempt.take().is_some() {
            self.connect_lock = false;
        }
        self.handle_error("TIMEOUT".to_string(), true).await;
    }

    async fn handle_frame(&mut self, frame: Option<Result<Frame, TransportError>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => {
                tracing::trace!("received: {}", text);
                self.emit(SocketEvent::Message(text));
            }
            Some(Ok(Frame::Close { code, reason })) => {
                self.live = None;
                self.handle_close(code, reason, true);
            }
            None => {
                self.live = None;
                self.handle_close(ABNORMAL_CLOSURE, String::new(), false);
            }
            Some(Err(e)) => self.handle_error(e.to_string(), false).await,
        }
    }

    fn handle_close(&mut self, code: u16, reason: String, was_clean: bool) {
        tracing::info!("socket closed (code {})", code);
        self.clear_timeouts();
        self.set_state(ConnectionState::Disconnected);
        if self.should_reconnect {
            self.connect();
        }
        self.emit(SocketEvent::Close {
            code,
            reason,
            was_clean,
        });
    }

    async fn handle_error(&mut self, reason: String, timed_out: bool) {
        tracing::warn!("socket error: {}", reason);
        self.disconnect(NORMAL_CLOSURE, if timed_out { "timeout" } else { "" })
            .await;
        self.emit(SocketEvent::Error(reason));
        self.connect();
    }

    /// Tear down the live transport, if any, reporting it as closed.
    async fn disconnect(&mut self, code: u16, reason: &str) {
        self.clear_timeouts();
        let Some(mut live) = self.live.take() else {
            return;
        };
        shutdown(&mut live, code, reason).await;
        self.handle_close(code, reason.to_string(), true);
    }

    async fn close(&mut self, code: u16, reason: &str) {
        self.should_reconnect = false;
        self.clear_timeouts();
        self.wait_until = None;
        self.attempt = None;
        self.connect_lock = false;

        match self.live.take() {
            Some(mut live) => {
                shutdown(&mut live, code, reason).await;
                self.handle_close(code, reason.to_string(), true);
            }
            None => {
                tracing::debug!("close: no live connection");
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    async fn reconnect(&mut self, code: u16, reason: &str) {
        self.should_reconnect = true;
        self.retry_count = -1;
        self.wait_until = None;
        self.attempt = None;
        self.connect_lock = false;

        self.disconnect(code, reason).await;
        self.connect();
    }

    fn clear_timeouts(&mut self) {
        self.connect_deadline = None;
        self.uptime_deadline = None;
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: SocketEvent) {
        let _ = self.events.send(event);
    }
}

async fn shutdown(live: &mut Transport, code: u16, reason: &str) {
    let frame = Frame::Close {
        code,
        reason: reason.to_string(),
    };
    let closing = async {
        live.sink.send(frame).await?;
        live.sink.close().await
    };
    match timeout(CLOSE_GRACE, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("close handshake failed: {}", e),
        Err(_) => tracing::debug!("close handshake timed out"),
    }
}

async fn wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_frame(live: &mut Option<Transport>) -> Option<Result<Frame, TransportError>> {
    match live {
        Some(live) => live.stream.next().await,
        None => pending().await,
    }
}

async fn poll_attempt(attempt: &mut Option<Attempt>) -> Result<Transport, TransportError> {
    match attempt {
        Some(attempt) => attempt.await,
        None => pending().await,
    }
}
