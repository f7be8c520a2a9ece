//! The embeddable chat widget: one socket, one session, one actor task.
//!
//! [`init`] wires storage, uploader, socket and [`SessionManager`] together
//! and returns a [`ChatWidget`] handle. Commands go in over a channel, state
//! comes out as [`ChatState`] snapshots on a watch channel. Deferred messages
//! and uploads run as tasks owned by the actor and are aborted on close.

use std::sync::Arc;

use ticketdesk_shared::{BotConfig, CustomerProfile};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::{ConfigError, StorageKind, WidgetConfig};
use crate::session::{Deferred, Effect, SessionManager, UploadTicket};
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::stores::ChatState;
use crate::upload::{FileUpload, HttpUploader, UploadError, Uploader};
use crate::ws::{self, ConnectionState, Connector, RoomAddress, SocketEvent, TungsteniteConnector, WsHandle};

const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug)]
enum WidgetCommand {
    SendMessage(String),
    SendFile(FileUpload),
    RetryMessage(String),
    StartNewChat,
    EndCurrentChat,
    LoadSession(String),
    GetRecentChats,
    UpdateProfile(CustomerProfile),
    Close(oneshot::Sender<()>),
}

enum TaskOutput {
    Deferred { epoch: u64, action: Deferred },
    Upload {
        ticket: UploadTicket,
        result: Result<String, UploadError>,
    },
}

/// Handle to a running chat widget.
///
/// Dropping the handle shuts the widget down; [`ChatWidget::close`] does the
/// same and waits for it.
pub struct ChatWidget {
    commands: mpsc::UnboundedSender<WidgetCommand>,
    state: watch::Receiver<ChatState>,
    connection: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

/// Start a widget with the real transport, uploader and configured storage.
///
/// Must be called from within a tokio runtime.
pub fn init(config: WidgetConfig) -> Result<ChatWidget, ConfigError> {
    let storage: Arc<dyn Storage> = match config.storage {
        StorageKind::File => match FileStorage::new() {
            Some(storage) => Arc::new(storage),
            None => {
                tracing::warn!("No config directory, session will not be remembered");
                Arc::new(MemoryStorage::new())
            }
        },
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
    };
    let uploader = Arc::new(HttpUploader::new(config.upload_url.clone()));
    init_with(config, storage, Arc::new(TungsteniteConnector), uploader)
}

/// Start a widget with explicit collaborators.
pub fn init_with(
    config: WidgetConfig,
    storage: Arc<dyn Storage>,
    connector: Arc<dyn Connector>,
    uploader: Arc<dyn Uploader>,
) -> Result<ChatWidget, ConfigError> {
    let address = RoomAddress::resolve(&config.room())?;
    tracing::info!("chat widget for {} at {}", config.chatbot_id, address.base_url);

    let (socket, events) = ws::connect(address.url_provider, connector, config.socket.clone());
    let connection = socket.watch_state();

    let mut bot_config = BotConfig::default();
    if let Some(welcome) = config.welcome_message {
        bot_config.welcome_message = Some(welcome);
    }
    let mut manager = SessionManager::new(config.chatbot_id, storage, bot_config);
    manager.attach_socket(socket.clone());
    manager.mount();

    let (state_tx, state) = watch::channel(manager.state().clone());
    let (commands_tx, commands) = mpsc::unbounded_channel();

    let actor = Actor {
        manager,
        socket,
        uploader,
        commands,
        events,
        state: state_tx,
        tasks: JoinSet::new(),
    };
    let task = tokio::spawn(actor.run());

    Ok(ChatWidget {
        commands: commands_tx,
        state,
        connection,
        task,
    })
}

impl ChatWidget {
    pub fn send_message(&self, content: impl Into<String>) {
        self.command(WidgetCommand::SendMessage(content.into()));
    }

    pub fn send_file(&self, file: FileUpload) {
        self.command(WidgetCommand::SendFile(file));
    }

    pub fn retry_message(&self, id: impl Into<String>) {
        self.command(WidgetCommand::RetryMessage(id.into()));
    }

    pub fn start_new_chat(&self) {
        self.command(WidgetCommand::StartNewChat);
    }

    pub fn end_current_chat(&self) {
        self.command(WidgetCommand::EndCurrentChat);
    }

    pub fn load_session(&self, session_id: impl Into<String>) {
        self.command(WidgetCommand::LoadSession(session_id.into()));
    }

    pub fn get_recent_chats(&self) {
        self.command(WidgetCommand::GetRecentChats);
    }

    pub fn update_profile(&self, profile: CustomerProfile) {
        self.command(WidgetCommand::UpdateProfile(profile));
    }

    /// Subscribe to state snapshots.
    pub fn state(&self) -> watch::Receiver<ChatState> {
        self.state.clone()
    }

    /// The latest state snapshot.
    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    /// Cancel pending timers and uploads, close the socket and stop the actor.
    pub async fn close(self) {
        let (done_tx, done) = oneshot::channel();
        if self.commands.send(WidgetCommand::Close(done_tx)).is_ok() {
            let _ = done.await;
        }
        if let Err(e) = self.task.await {
            tracing::error!("widget task failed: {}", e);
        }
    }

    fn command(&self, command: WidgetCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("chat widget is closed");
        }
    }
}

struct Actor {
    manager: SessionManager<WsHandle>,
    socket: WsHandle,
    uploader: Arc<dyn Uploader>,
    commands: mpsc::UnboundedReceiver<WidgetCommand>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    state: watch::Sender<ChatState>,
    tasks: JoinSet<TaskOutput>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(WidgetCommand::Close(done)) => {
                        self.shutdown();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.manager.handle_socket_event(event),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(TaskOutput::Deferred { epoch, action }) => {
                        self.manager.apply_deferred(epoch, action);
                    }
                    Ok(TaskOutput::Upload { ticket, result }) => {
                        self.manager.complete_upload(ticket, result);
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => tracing::error!("widget task failed: {}", e),
                },
            }
            self.publish();
        }
        tracing::debug!("chat widget stopped");
    }

    fn handle_command(&mut self, command: WidgetCommand) {
        let result = match command {
            WidgetCommand::SendMessage(content) => self.manager.send_message(&content),
            WidgetCommand::SendFile(file) => self.manager.send_file(file).map(|e| vec![e]),
            WidgetCommand::RetryMessage(id) => self.manager.retry_message(&id).map(|()| Vec::new()),
            WidgetCommand::StartNewChat => self.manager.start_new_chat(),
            WidgetCommand::EndCurrentChat => self.manager.end_current_chat().map(|()| Vec::new()),
            WidgetCommand::LoadSession(id) => self.manager.load_session(&id).map(|()| Vec::new()),
            WidgetCommand::GetRecentChats => self.manager.get_recent_chats().map(|()| Vec::new()),
            WidgetCommand::UpdateProfile(profile) => {
                self.manager.update_profile(profile);
                Ok(Vec::new())
            }
            WidgetCommand::Close(_) => Ok(Vec::new()),
        };
        match result {
            Ok(effects) => self.run_effects(effects),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Schedule {
                    delay,
                    epoch,
                    action,
                } => {
                    self.tasks.spawn(async move {
                        tokio::time::sleep(delay).await;
                        TaskOutput::Deferred { epoch, action }
                    });
                }
                Effect::Upload(job) => {
                    let uploader = Arc::clone(&self.uploader);
                    self.tasks.spawn(async move {
                        let result = uploader.upload(job.request).await;
                        TaskOutput::Upload {
                            ticket: job.ticket,
                            result,
                        }
                    });
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.tasks.abort_all();
        self.manager.detach_socket();
        self.socket.close(CLOSE_NORMAL, "widget closed");
        self.publish();
    }

    fn publish(&self) {
        let latest = self.manager.state();
        self.state.send_if_modified(|current| {
            if current == latest {
                false
            } else {
                *current = latest.clone();
                true
            }
        });
    }
}
