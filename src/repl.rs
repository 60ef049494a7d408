use anyhow::Result;
use crm_core::agent_loop::AgentLoop;
use crm_core::checkpoint::{validate_thread_id, CheckpointStore, FileCheckpointStore};
use crm_core::config::AppConfig;
use crm_core::conversation::ConversationService;
use crm_core::model::ChatModel;
use crm_core::stream::StreamEvent;
use crm_core::tool_registry::ToolRegistry;
use crm_core::types::Message;
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use std::sync::Arc;

const BANNER: &str = r#"
  ╔═══════════════════════════════════════════╗
  ║          HCP CRM assistant                ║
  ║   Describe a visit, get it logged         ║
  ╚═══════════════════════════════════════════╝

  Type your message and press Enter to chat.
  Commands:
    /new [id]       Start a new thread
    /thread <id>    Switch to a thread
    /threads        List stored threads
    /history        Show the current thread
    /tools          List available tools
    /config         Show current config
    /help           Show this help
    /exit           Quit
"#;

const PREVIEW_CHARS: usize = 200;

/// Run the interactive REPL. Each line is one turn on the active thread;
/// threads are checkpointed to disk so they can be resumed later.
pub async fn run(
    config: AppConfig,
    model: Arc<dyn ChatModel>,
    tool_registry: Arc<ToolRegistry>,
    thread_id: Option<String>,
) -> Result<()> {
    println!("{}", BANNER);
    println!(
        "  Model: {}  |  CRM: {}",
        config.model.model, config.crm.api_base
    );
    println!();

    let checkpoint_dir = config
        .checkpoint
        .dir
        .clone()
        .unwrap_or_else(|| AppConfig::data_dir().join("checkpoints"));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(checkpoint_dir)?);
    let agent = AgentLoop::new(model, tool_registry.clone(), &config.agent);
    let service = Arc::new(ConversationService::new(agent, checkpoints));

    let mut thread_id = match thread_id {
        Some(id) => {
            validate_thread_id(&id)?;
            id
        }
        None => new_thread_id(),
    };

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let history_path = AppConfig::data_dir().join("repl_history.txt");
    let mut rl = DefaultEditor::with_config(rl_config)?;
    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("\x1b[1;36m{}\x1b[0m \x1b[1;32m❯\x1b[0m ", thread_id);

        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                if input.starts_with('/') {
                    let handled =
                        handle_command(input, &mut thread_id, &service, &tool_registry, &config)
                            .await?;
                    if !handled {
                        break;
                    }
                    continue;
                }

                let mut rx = service.stream(thread_id.clone(), input);
                while let Some(event) = rx.recv().await {
                    print_event(&event);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}

fn new_thread_id() -> String {
    format!("chat-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"))
}

fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::Text { content } => {
            println!("\x1b[1;33massistant\x1b[0m: {}", content);
        }
        StreamEvent::ToolCallRequest { tool_calls } => {
            for call in tool_calls {
                println!("  \x1b[0;35m⚡ Calling tool: {}\x1b[0m", call.name);
            }
        }
        StreamEvent::ToolResult {
            tool_result,
            failure,
            ..
        } => {
            let status = if failure.is_some() {
                "\x1b[0;31m✗\x1b[0m"
            } else {
                "\x1b[0;32m✓\x1b[0m"
            };
            println!(
                "  {} {}",
                status,
                preview(tool_result, PREVIEW_CHARS).replace('\n', "\n    ")
            );
        }
        StreamEvent::Error { content, .. } => {
            println!("\x1b[0;31m{}\x1b[0m", content);
        }
        StreamEvent::Done => println!(),
    }
}

/// The first `max` characters of `text`, with an ellipsis when cut.
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Handle a slash command. Returns `true` to continue the loop, `false` to exit.
async fn handle_command(
    input: &str,
    thread_id: &mut String,
    service: &ConversationService,
    tool_registry: &ToolRegistry,
    config: &AppConfig,
) -> Result<bool> {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };

    match cmd {
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            return Ok(false);
        }
        "/new" | "/thread" => {
            let next = if arg.is_empty() {
                if cmd == "/thread" {
                    println!("Usage: /thread <id>");
                    return Ok(true);
                }
                new_thread_id()
            } else {
                arg.to_string()
            };
            match validate_thread_id(&next) {
                Ok(()) => {
                    println!("Switched to thread: {}", next);
                    *thread_id = next;
                }
                Err(e) => println!("\x1b[0;31m{}\x1b[0m", e),
            }
        }
        "/threads" | "/ls" => {
            let threads = service.checkpoints().threads().await?;
            if threads.is_empty() {
                println!("  No threads.");
            }
            for id in threads {
                let marker = if id == *thread_id { " ◀" } else { "" };
                println!("  {}{}", id, marker);
            }
        }
        "/history" => {
            let state = service.history(thread_id.as_str()).await?;
            if state.messages().is_empty() {
                println!("  (empty thread)");
            }
            for message in state.messages() {
                print_history_line(message);
            }
        }
        "/tools" => {
            let names = tool_registry.list_names();
            if names.is_empty() {
                println!("  No tools registered.");
            } else {
                println!("  Available tools ({}):", names.len());
                for name in names {
                    if let Ok(tool) = tool_registry.lookup(name) {
                        println!("    • {}: {}", name, tool.description());
                    }
                }
            }
        }
        "/config" => {
            let mut shown = config.clone();
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("********".into());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        "/help" | "/?" => {
            println!("  /new [id]       Start a new thread");
            println!("  /thread <id>    Switch to a thread");
            println!("  /threads        List stored threads");
            println!("  /history        Show the current thread");
            println!("  /tools          List available tools");
            println!("  /config         Show current config");
            println!("  /help           Show this help");
            println!("  /exit           Quit");
        }
        _ => {
            println!(
                "Unknown command: {}. Type /help for available commands.",
                cmd
            );
        }
    }

    Ok(true)
}

fn print_history_line(message: &Message) {
    match message {
        Message::User { content } => println!("  \x1b[1;32muser\x1b[0m: {}", content),
        Message::Assistant {
            content,
            tool_calls,
        } => {
            if !content.trim().is_empty() {
                println!("  \x1b[1;33massistant\x1b[0m: {}", content);
            }
            for call in tool_calls {
                println!("  \x1b[0;35m⚡ {}\x1b[0m {}", call.name, preview(&call.arguments, 80));
            }
        }
        Message::Tool(result) => {
            println!("    {}", preview(&result.content, 80).replace('\n', " "));
        }
    }
}
