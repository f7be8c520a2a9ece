//! ticketdesk-chat - terminal front-end for the chat widget.
//!
//! Reads lines from stdin and prints the transcript as it changes.
//! Configuration comes from `TICKETDESK_*` environment variables.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use ticketdesk_client::upload::mime_for_path;
use ticketdesk_client::{logging, widget, ChatState, ChatWidget, FileUpload, WidgetConfig};
use ticketdesk_shared::{CustomerProfile, Message, MessageStatus, Sender};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  <text>           send a message
  /retry <id>      resend a failed message
  /file <path>     upload a file
  /email <addr>    leave your email address
  /new             start a new chat
  /end             end the current chat
  /list            list recent chats
  /load <id>       switch to another chat
  /quit            exit";

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = WidgetConfig::from_env().context("loading configuration")?;
    let widget = widget::init(config).context("starting chat widget")?;
    let mut state = widget.state();
    let mut transcript = Transcript::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{HELP}");
    transcript.render(&state.borrow_and_update());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if !handle_line(&widget, line.trim()).await? {
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                transcript.render(&state.borrow_and_update());
            }
        }
    }

    widget.close().await;
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(widget: &ChatWidget, line: &str) -> Result<bool> {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{HELP}"),
        "/new" => widget.start_new_chat(),
        "/end" => widget.end_current_chat(),
        "/list" => widget.get_recent_chats(),
        "/load" if !arg.is_empty() => widget.load_session(arg),
        "/retry" if !arg.is_empty() => widget.retry_message(arg),
        "/email" if !arg.is_empty() => widget.update_profile(CustomerProfile::email(arg)),
        "/file" if !arg.is_empty() => match read_file(Path::new(arg)).await {
            Ok(file) => widget.send_file(file),
            Err(e) => eprintln!("{e:#}"),
        },
        _ if command.starts_with('/') => println!("{HELP}"),
        _ => widget.send_message(line),
    }
    Ok(true)
}

async fn read_file(path: &Path) -> Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let mime = mime_for_path(path).unwrap_or("application/octet-stream");
    Ok(FileUpload::new(name, mime, bytes))
}

/// Prints messages once, and again whenever they change.
#[derive(Default)]
struct Transcript {
    printed: HashMap<String, String>,
    sessions: usize,
}

impl Transcript {
    fn render(&mut self, state: &ChatState) {
        for msg in state.messages.iter() {
            let line = format_message(msg);
            if self.printed.get(&msg.id) != Some(&line) {
                println!("{line}");
                self.printed.insert(msg.id.clone(), line);
            }
        }
        if state.sessions.len() != self.sessions {
            self.sessions = state.sessions.len();
            println!("-- recent chats --");
            for session in &state.sessions {
                println!(
                    "  {} [{:?}] {}",
                    session.session_id,
                    session.state,
                    session.last_message.as_deref().unwrap_or("")
                );
            }
        }
    }
}

fn format_message(msg: &Message) -> String {
    let who = match msg.from {
        Sender::User => "you",
        Sender::Agent => "agent",
        Sender::Operator => "operator",
    };
    let body = match (&msg.file, msg.content.is_empty()) {
        (Some(file), true) => format!(
            "[file] {}",
            file.url.as_deref().or(file.name.as_deref()).unwrap_or("")
        ),
        _ => msg.content.clone(),
    };
    match msg.status {
        Some(MessageStatus::Failed) => format!("{who}: {body}  (failed, /retry {})", msg.id),
        Some(MessageStatus::Read) => format!("{who}: {body}  (read)"),
        _ => format!("{who}: {body}"),
    }
}
