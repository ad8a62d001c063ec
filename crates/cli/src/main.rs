use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wabot")]
#[command(about = "WhatsApp customer-service gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config and an empty customer directory).
    Init {
        /// Config file path (default: WABOT_CONFIG_PATH or ~/.wabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway: receives messaging webhooks and answers customers.
    Gateway {
        /// Config file path (default: WABOT_CONFIG_PATH or ~/.wabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the message validator on a webhook JSON file and print each event's verdict.
    ValidateEvent {
        /// File holding one webhook delivery (`{ "event", "data" }`)
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wabot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::ValidateEvent { file }) => {
            if let Err(e) = run_validate_event(&file) {
                log::error!("validate-event failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(wabot::config::default_config_path);
    let dir = wabot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = wabot::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    wabot::gateway::run_gateway(config, path).await
}

fn run_validate_event(file: &std::path::Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let envelope: wabot::channels::WebhookEnvelope = serde_json::from_str(&raw)
        .with_context(|| format!("parsing webhook envelope from {}", file.display()))?;
    if !envelope.is_message_event() {
        println!("event {:?} is not a message event; skipped", envelope.event);
        return Ok(());
    }
    let now = chrono::Utc::now().timestamp();
    for item in envelope.events() {
        let event = match item {
            Ok(event) => event,
            Err(bad) => {
                println!("{}: ignored (malformed: {})", bad.message_id, bad.error);
                continue;
            }
        };
        match wabot::validate::validate(&event, now) {
            Ok(msg) => println!(
                "{}: eligible phone={} text={:?}",
                msg.correlation_id, msg.phone, msg.text
            ),
            Err(rejection) => println!("{}: ignored ({})", event.message_id(), rejection.reason()),
        }
    }
    Ok(())
}
