//! LanceHub Chat CLI
//!
//! Interactive terminal client for LanceHub conversations. Lines typed at
//! the prompt are sent to the active conversation; `/` commands switch
//! conversations and list activity. Live events print as they arrive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lancehub_chat_client::{ChatController, ChatEvent, ClientConfig, StaticAuth, ThreadMessage};
use lancehub_chat_protocol::LinkState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lancehub-chat", version, about = "LanceHub conversation client")]
struct Cli {
    /// Bearer token for the LanceHub session
    #[arg(long)]
    token: String,

    /// Local user id matching the token
    #[arg(long)]
    user: i64,

    /// REST base URL (overrides the config file)
    #[arg(long)]
    api_base: Option<String>,

    /// Live WebSocket base URL (overrides the config file)
    #[arg(long)]
    live_base: Option<String>,

    /// Conversation to open at startup
    #[arg(long)]
    conversation: Option<i64>,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path).context("Failed to read configuration")?,
        None => ClientConfig::load().context("Failed to load configuration")?,
    };
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if let Some(live_base) = cli.live_base {
        config.live_base = Some(live_base);
    }

    info!("Starting LanceHub chat client");
    info!("API base: {}", config.api_base());
    info!("Live base: {}", config.live_base());

    let auth = Arc::new(StaticAuth::new(cli.token, cli.user));
    let controller =
        ChatController::new(&config, auth).context("Failed to create chat client")?;
    controller.start().await;
    let mut events = controller.subscribe().await;

    controller
        .refresh_conversations()
        .await
        .context("Failed to load conversations")?;
    render_conversations(&controller).await;

    match controller.ensure_active(cli.conversation).await? {
        Some(conversation_id) => {
            println!("-- conversation {conversation_id} --");
            render_thread(&controller).await;
        }
        None => println!("No conversations yet."),
    }
    print_help();

    let mut printed = controller.thread().await.len();
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        if !handle_input(&controller, line.trim(), &mut printed).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => handle_event(&controller, event, &mut printed).await,
                    None => break,
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn print_help() {
    println!("commands: /list  /open <id>  /quit — anything else is sent as a message");
}

/// Returns `false` when the user asked to quit
async fn handle_input(
    controller: &ChatController,
    line: &str,
    printed: &mut usize,
) -> Result<bool> {
    match line {
        "" => {}
        "/quit" | "/q" => return Ok(false),
        "/help" => print_help(),
        "/list" | "/l" => {
            if let Err(e) = controller.refresh_conversations().await {
                eprintln!("! {}", e.user_message());
            }
            render_conversations(controller).await;
        }
        command if command.starts_with("/open ") || command.starts_with("/o ") => {
            let id = command
                .split_whitespace()
                .nth(1)
                .and_then(|raw| raw.parse::<i64>().ok());
            match id {
                Some(conversation_id) => {
                    if let Err(e) = controller.switch_to(conversation_id).await {
                        eprintln!("! {}", e.user_message());
                        if e.is_fatal() {
                            return Ok(false);
                        }
                    } else {
                        println!("-- conversation {conversation_id} --");
                        render_thread(controller).await;
                        *printed = controller.thread().await.len();
                    }
                }
                None => eprintln!("! usage: /open <conversation id>"),
            }
        }
        command if command.starts_with('/') => {
            eprintln!("! unknown command: {command}");
        }
        text => {
            if let Err(e) = controller.send(text).await {
                eprintln!("! {}", e.user_message());
                if e.is_fatal() {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

async fn handle_event(controller: &ChatController, event: ChatEvent, printed: &mut usize) {
    match event {
        ChatEvent::ThreadUpdated { .. } => {
            let thread = controller.thread().await;
            if thread.len() < *printed {
                // The thread was replaced (switch or rollback); already rendered
                *printed = thread.len();
                return;
            }
            for entry in &thread[*printed..] {
                print_message(controller, entry).await;
            }
            *printed = thread.len();
        }
        ChatEvent::ConversationsUpdated => {}
        ChatEvent::ConnectionChanged { state } => match state {
            LinkState::Connected => println!("* live"),
            LinkState::Reconnecting => println!("* connection lost, retrying shortly"),
            LinkState::Disconnected => println!("* offline"),
            LinkState::Connecting => {}
        },
        ChatEvent::Error { message } => eprintln!("! {message}"),
    }
}

async fn render_conversations(controller: &ChatController) {
    let conversations = controller.conversations().await;
    if conversations.is_empty() {
        return;
    }
    println!("conversations:");
    for conversation in conversations {
        let counterpart = conversation.counterpart_of(controller.local_user());
        let name = controller
            .participant(counterpart)
            .await
            .map(|p| p.label().to_string())
            .unwrap_or_else(|_| "User".to_string());
        let preview = conversation
            .last_message
            .as_ref()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "(no messages)".to_string());
        let unread = if conversation.unread_count > 0 {
            format!(" [{}]", conversation.unread_count)
        } else {
            String::new()
        };
        println!("  {:>4}{}  {} — {}", conversation.id, unread, name, preview);
    }
}

async fn render_thread(controller: &ChatController) {
    for entry in controller.thread().await.iter() {
        print_message(controller, entry).await;
    }
}

async fn print_message(controller: &ChatController, entry: &ThreadMessage) {
    let sender = if entry.sender_id == controller.local_user() {
        "you".to_string()
    } else {
        controller
            .participant(entry.sender_id)
            .await
            .map(|p| p.label().to_string())
            .unwrap_or_else(|_| "User".to_string())
    };
    let state = if entry.is_pending() { " …" } else { "" };
    println!(
        "[{}] {}: {}{}",
        entry.created_at.format("%H:%M"),
        sender,
        entry.content,
        state
    );
}
