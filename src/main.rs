#![deny(dead_code)]
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use log::{error, info, LevelFilter};

mod utils;

use chatapp::config::{get_config_dir, set_config_dir_override};
use chatapp::display::{format_chat_timestamp, presence_label};
use chatapp::{Backend, ChatClient, ChatConfig, Location, Message, MessageKind, ProfileUpdate};

/// Command line arguments for ChatApp
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ChatApp: a terminal front-end for the chat client, running against an in-process backend."
)]
struct Args {
    /// Directory holding config.json
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Append log lines to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, default_value = "warn")]
    log_level: String,
}

const HELP: &str = "\
Commands:
  register <email> <password> <display name>
  login <email> <password>
  logout
  whoami
  users [query]
  open <uid>                 start or resume a conversation
  send <text>                send to the open conversation
  location <lat> <lng>       share a location in the open conversation
  history                    show the open conversation
  chats                      list your conversations
  profile name|status <value>
  typing on|off
  token                      register this device for notifications
  quit";

/// The conversation the REPL is pointed at
struct OpenChat {
    id: String,
    counterpart_id: String,
}

fn render_message(message: &Message, me: &str) -> String {
    let who = if message.sender_id == me { "me" } else { message.sender_id.as_str() };
    let body = match (message.kind, message.location) {
        (MessageKind::Location, Some(at)) => format!("📍 {:.5}, {:.5}", at.latitude, at.longitude),
        _ => message.body.clone(),
    };
    let stamp = message.timestamp.with_timezone(&Local).format("%H:%M");
    if message.sender_id == me {
        format!("[{}] {}: {} ({})", stamp, who, body, message.status.as_str())
    } else {
        format!("[{}] {}: {}", stamp, who, body)
    }
}

async fn handle(client: &ChatClient, open: &mut Option<OpenChat>, line: &str) -> Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(false),
        "register" => {
            let mut parts = rest.splitn(3, ' ');
            let (email, password, name) = match (parts.next(), parts.next(), parts.next()) {
                (Some(e), Some(p), Some(n)) => (e, p, n),
                _ => return Err(anyhow!("usage: register <email> <password> <display name>")),
            };
            let user = client.register(email, password, name, None).await?;
            println!("Welcome, {} ({})", user.display_name, user.uid);
        }
        "login" => {
            let (email, password) = rest
                .split_once(' ')
                .ok_or_else(|| anyhow!("usage: login <email> <password>"))?;
            let user = client.authenticate(email, password.trim()).await?;
            println!("Signed in as {} ({})", user.display_name, user.uid);
        }
        "logout" => {
            client.deauthenticate().await?;
            *open = None;
            println!("Signed out");
        }
        "whoami" => match client.current_user() {
            Some(user) => println!("{} <{}> {}: {}", user.display_name, user.email, user.uid, user.status),
            None => println!("Not signed in"),
        },
        "users" => {
            let users = client.search_users(rest).await?;
            for user in users {
                let presence = client.presence_of(&user.uid).await?;
                println!(
                    "{}  {}  {}",
                    user.uid,
                    user.display_name,
                    presence_label(false, presence.as_ref(), Utc::now())
                );
            }
        }
        "open" => {
            if rest.is_empty() {
                return Err(anyhow!("usage: open <uid>"));
            }
            let id = client.conversation_with(rest).await?;
            let read = client.mark_read(&id).await?;
            println!("Opened {} ({} newly read)", id, read);
            *open = Some(OpenChat {
                id,
                counterpart_id: rest.to_string(),
            });
        }
        "send" => {
            let chat = open.as_ref().ok_or_else(|| anyhow!("open a conversation first"))?;
            let message = client.send_text(&chat.id, &chat.counterpart_id, rest).await?;
            println!("sent {}", message.id);
        }
        "location" => {
            let chat = open.as_ref().ok_or_else(|| anyhow!("open a conversation first"))?;
            let (lat, lng) = rest
                .split_once(' ')
                .ok_or_else(|| anyhow!("usage: location <lat> <lng>"))?;
            let location = Location {
                latitude: lat.parse().context("latitude")?,
                longitude: lng.trim().parse().context("longitude")?,
            };
            let message = client.send_location(&chat.id, &chat.counterpart_id, location).await?;
            println!("sent {}", message.id);
        }
        "history" => {
            let chat = open.as_ref().ok_or_else(|| anyhow!("open a conversation first"))?;
            let me = client.current_user().map(|u| u.uid).unwrap_or_default();
            for message in client.messages(&chat.id).await? {
                println!("{}", render_message(&message, &me));
            }
        }
        "chats" => {
            let now = Local::now();
            for summary in client.conversations().await? {
                let name = summary
                    .counterpart
                    .as_ref()
                    .map(|u| u.display_name.clone())
                    .unwrap_or_else(|| summary.counterpart_id.clone());
                let when = summary
                    .conversation
                    .last_message_time
                    .map(|t| format_chat_timestamp(&t.with_timezone(&Local), &now))
                    .unwrap_or_default();
                println!(
                    "{:<20} {:<30} {:>10} {}",
                    name,
                    summary.conversation.last_message.as_deref().unwrap_or(""),
                    when,
                    if summary.unread_count > 0 { format!("({})", summary.unread_count) } else { String::new() }
                );
            }
        }
        "profile" => {
            let (field, value) = rest
                .split_once(' ')
                .ok_or_else(|| anyhow!("usage: profile name|status <value>"))?;
            let update = match field {
                "name" => ProfileUpdate { display_name: Some(value.to_string()), ..ProfileUpdate::default() },
                "status" => ProfileUpdate { status: Some(value.to_string()), ..ProfileUpdate::default() },
                other => return Err(anyhow!("unknown profile field '{}'", other)),
            };
            let user = client.edit_profile(update).await?;
            println!("{}: {}", user.display_name, user.status);
        }
        "typing" => {
            let chat = open.as_ref().ok_or_else(|| anyhow!("open a conversation first"))?;
            client.set_typing(&chat.id, rest == "on").await?;
        }
        "token" => match client.enable_notifications().await? {
            Some(token) => println!("Registered device token {}", token),
            None => println!("Push token unavailable"),
        },
        "" => {}
        other => println!("Unknown command '{}', try 'help'", other),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level: LevelFilter = args
        .log_level
        .parse()
        .map_err(|_| anyhow!("invalid log level '{}'", args.log_level))?;
    let log_file = args.log_file.as_ref().and_then(|p| p.to_str());
    utils::setup_logging(log_file, level)?;
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    if let Some(dir) = &args.config_dir {
        set_config_dir_override(dir.clone());
        info!("Config directory overridden to: {}", dir.display());
    }
    let config = ChatConfig::load_from(&get_config_dir()?)?;

    let client = ChatClient::new(Backend::in_memory(), config);
    let _relay = client.notification_relay().start();
    let mut open = None;

    println!("{}", HELP);
    loop {
        let line = match tokio::task::spawn_blocking(utils::read_line).await?? {
            Some(line) => line,
            None => break,
        };
        match handle(&client, &mut open, &line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("{}: {:#}", line, e);
                eprintln!("Error: {:#}", e);
            }
        }
    }

    if client.is_signed_in() {
        client.deauthenticate().await?;
    }
    Ok(())
}
