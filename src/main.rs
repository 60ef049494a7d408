mod repl;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crm_core::config::AppConfig;
use crm_core::model::{ChatModel, OpenAiChatModel};
use crm_core::tool_registry::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "crm-agent",
    about = "Conversational assistant for logging HCP interactions into a CRM",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/hcp-crm/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the model name
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Override the model API base URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Override the CRM API base URL the logging tool posts to
    #[arg(long, global = true)]
    crm_base: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Thread id to create or resume
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Start the HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "hcp_crm=info,crm_core=info,crm_tools=info,crm_server=info,warn".into()
        }))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Some(model) = &cli.model {
        config.model.model = model.clone();
    }
    if let Some(api_base) = &cli.api_base {
        config.model.api_base = api_base.clone();
    }
    if let Some(crm_base) = &cli.crm_base {
        config.crm.api_base = crm_base.clone();
    }

    match cli.command.unwrap_or(Commands::Chat { thread: None }) {
        Commands::Config { action } => handle_config_command(action, &config)?,
        Commands::Serve { host, port } => {
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
            let (model, registry) = build_agent(&config)?;
            crm_server::serve(config, model, registry).await?;
        }
        Commands::Chat { thread } => {
            let (model, registry) = build_agent(&config)?;
            repl::run(config, model, registry, thread).await?;
        }
    }

    Ok(())
}

/// The chat model and tool registry shared by `chat` and `serve`.
fn build_agent(config: &AppConfig) -> Result<(Arc<dyn ChatModel>, Arc<ToolRegistry>)> {
    let mut registry = ToolRegistry::new();
    crm_tools::register_all(&mut registry, config)?;
    let registry = Arc::new(registry);

    if config.model.api_key.is_none() {
        tracing::warn!(
            "No API key configured (set {} or [model] api_key); hosted endpoints will reject model calls",
            config.model.api_key_env.as_deref().unwrap_or("GROQ_API_KEY")
        );
    }
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(config.model.clone())?);

    tracing::info!(
        "Loaded {} tools, model: {}, CRM endpoint: {}",
        registry.len(),
        config.model.model,
        config.crm.api_base,
    );
    Ok((model, registry))
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let mut shown = config.clone();
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("********".into());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                AppConfig::default().save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["crm-agent", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: Some(ConfigAction::Path)
            })
        ));

        let cli = Cli::try_parse_from(["crm-agent", "--crm-base", "http://crm", "serve", "--port", "9000"])
            .unwrap();
        assert_eq!(cli.crm_base.as_deref(), Some("http://crm"));
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9000), .. })));

        assert!(Cli::try_parse_from(["crm-agent"]).unwrap().command.is_none());
    }
}
