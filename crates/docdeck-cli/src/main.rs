use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use docdeck_client::{
    BackendClient, CanvasStore, ChatDriver, DriverEvent, DriverSettings, OutgoingMessage,
    SessionDirectory, TurnOutcome,
};
use docdeck_core::config::{Config, LoggingConfig};
use docdeck_core::types::UNTITLED;
use docdeck_stream::{MessageSegment, split_message};

#[derive(Parser)]
#[command(
    name = "docdeck",
    about = "Chat with the docdeck backend and manage the canvases it writes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// Id of an uploaded file to attach (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Also search the NAS index
        #[arg(long)]
        nas: bool,
    },

    /// Canvas library
    Canvases {
        #[command(subcommand)]
        action: CanvasAction,
    },

    /// Session management
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show configuration and backend reachability
    Status,
}

#[derive(Subcommand)]
enum CanvasAction {
    /// List saved canvases
    List {
        /// Only canvases of this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Delete a canvas
    Delete { id: String },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List chat sessions
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (secrets redacted)
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug".to_string()
        } else {
            logging
                .and_then(|l| l.level.clone())
                .unwrap_or_else(|| "info".to_string())
        };
        let mut filter = EnvFilter::new(level);
        for directive in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring log filter '{directive}': {e}"),
            }
        }
        filter
    });

    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

/// Render a finished assistant message with canvas blocks collapsed to cards.
fn render_message(content: &str) -> String {
    split_message(content)
        .into_iter()
        .map(|segment| match segment {
            MessageSegment::Markdown(text) => text,
            MessageSegment::Canvas(card) => format!(
                "[canvas: {} ({})]",
                card.title.as_deref().unwrap_or(UNTITLED),
                card.language
            ),
        })
        .collect()
}

/// Print assistant text as it grows. A rewrite that is not an extension of
/// what was already printed starts a new line.
async fn print_events(mut rx: mpsc::UnboundedReceiver<DriverEvent>) {
    let mut printed = String::new();
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            DriverEvent::MessageUpdated { content, .. } => {
                match content.strip_prefix(printed.as_str()) {
                    Some(delta) => {
                        let _ = write!(stdout, "{delta}");
                    }
                    None => {
                        let _ = write!(stdout, "\n{content}");
                    }
                }
                let _ = stdout.flush();
                printed = content;
            }
            DriverEvent::StatusChanged {
                status: Some(status),
            } => tracing::debug!(%status, "Status"),
            DriverEvent::SessionAdopted { session_id } => {
                tracing::info!(%session_id, "Session started");
            }
            DriverEvent::StreamEnded { .. } => {
                let _ = writeln!(stdout);
            }
            _ => {}
        }
    }
}

async fn run_chat(
    config: &Config,
    client: Arc<BackendClient>,
    outgoing: OutgoingMessage,
    session: Option<String>,
    model: Option<String>,
    nas: bool,
) -> anyhow::Result<()> {
    let settings = DriverSettings {
        model_id: model.unwrap_or_else(|| config.default_model()),
        use_nas: nas || config.use_nas(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let mut driver =
        ChatDriver::new(client.clone(), client.clone(), client, settings).with_events(tx);
    if let Some(session_id) = session {
        driver = driver.with_session(session_id);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });
    let printer = tokio::spawn(print_events(rx));

    let report = driver.send_message(outgoing, cancel).await?;
    // Closing the channel lets the printer drain and exit.
    drop(driver);
    let _ = printer.await;

    match report.outcome {
        TurnOutcome::Completed => {
            let rendered = render_message(&report.content);
            if rendered != report.content {
                println!("\n{rendered}");
            }
        }
        TurnOutcome::Aborted => eprintln!("Cancelled."),
        TurnOutcome::Failed => {
            if let Some(error) = &report.error {
                eprintln!("Request failed: {error}");
            }
        }
    }

    if let Some(canvas) = &report.persisted {
        println!("Canvas saved: {} ({})", canvas.title, canvas.id);
    }

    Ok(())
}

fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if let Some(backend) = shown.backend.as_mut() {
        if backend.access_token.is_some() {
            backend.access_token = Some("********".into());
        }
    }
    shown
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(config.logging.as_ref(), cli.verbose);

    let client = Arc::new(BackendClient::from_config(&config)?);

    match cli.command {
        Commands::Chat {
            message,
            session,
            model,
            files,
            nas,
        } => {
            let outgoing = OutgoingMessage::text(message).with_files(files);
            run_chat(&config, client, outgoing, session, model, nas).await?;
        }
        Commands::Canvases { action } => match action {
            CanvasAction::List { session } => {
                let canvases = match &session {
                    Some(id) => client.list_for_session(id).await?,
                    None => client.list().await?,
                };
                if canvases.is_empty() {
                    println!("No canvases.");
                }
                for canvas in canvases {
                    println!(
                        "{}\t{}\t{}\t{}",
                        canvas.id,
                        canvas.title,
                        canvas.language.as_deref().unwrap_or("-"),
                        canvas.updated_at.as_deref().unwrap_or("-"),
                    );
                }
            }
            CanvasAction::Delete { id } => {
                client.delete(&id).await?;
                println!("Deleted canvas {id}");
            }
        },
        Commands::Sessions { action } => match action {
            SessionAction::List => {
                let sessions = client.list_sessions().await?;
                if sessions.is_empty() {
                    println!("No sessions.");
                }
                for session in sessions {
                    println!("{}\t{}\t{}", session.id, session.title, session.updated_at);
                }
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&redacted(&config))?);
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
        Commands::Status => {
            println!("docdeck v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Backend: {}", config.base_url());
            println!("Default model: {}", config.default_model());
            println!(
                "Access token: {}",
                if config.access_token().is_some() {
                    "configured"
                } else {
                    "not set"
                }
            );
            match client.list_sessions().await {
                Ok(sessions) => println!("Status: reachable ({} sessions)", sessions.len()),
                Err(e) => println!("Status: unreachable ({e})"),
            }
        }
    }

    Ok(())
}
