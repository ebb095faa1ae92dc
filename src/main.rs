use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use turnstile::agent::{Agent, AgentPool, EchoAgent};
use turnstile::config::{Config, LogFormat};
use turnstile::error::{AgentError, ConfigError};
use turnstile::events::EventHub;
use turnstile::gateway::{self, GatewayState, auth::AuthState};
use turnstile::tools::builtin::default_catalog;
use turnstile::turn::{ConfirmationWorkflow, RemoteCalls, RouterDeps, TurnDeps, TurnProcessor};

#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about = "Gated tool-calling turns for conversational agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve {
        /// Address to bind
        #[arg(long, env = "GATEWAY_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, env = "GATEWAY_PORT")]
        port: Option<u16>,
    },

    /// Print the built-in tools and exit
    Tools,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("turnstile=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    init_tracing(config.log_format);

    let catalog = Arc::new(default_catalog()?);

    let (host, port) = match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Tools => {
            for schema in catalog.registry().schemas() {
                println!("{:<14} {:?}  {}", schema.name, catalog.classify(&schema.name), schema.description);
            }
            return Ok(());
        }
        Command::Serve { host, port } => (host, port),
    };
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if !config.gateway.has_tokens() {
        return Err(ConfigError::MissingRequired {
            key: "GATEWAY_TOKENS".to_string(),
        }
        .into());
    }

    let store = Arc::new(turnstile::store::InMemoryStore::new());
    let factory = |conversation_id: Uuid| -> Result<Arc<dyn Agent>, AgentError> {
        tracing::debug!(conversation_id = %conversation_id, "Starting echo agent");
        Ok(Arc::new(EchoAgent))
    };
    let remote_calls = Arc::new(RemoteCalls::new("remote_calls"));
    let confirmations = Arc::new(ConfirmationWorkflow::new(
        Arc::clone(&catalog),
        config.turn.pending_timeout,
    ));
    let processor = Arc::new(TurnProcessor::new(TurnDeps {
        agents: Arc::new(AgentPool::new(Arc::new(factory))),
        catalog,
        router: RouterDeps {
            store,
            remote_calls: Arc::clone(&remote_calls),
            confirmations: Arc::clone(&confirmations),
            pending_timeout: config.turn.pending_timeout,
        },
    }));

    let state = GatewayState {
        processor,
        hub: Arc::new(EventHub::with_limits(
            config.gateway.event_buffer,
            config.gateway.max_subscribers,
        )),
        auth: AuthState::new(config.gateway.tokens.clone()),
    };

    tracing::info!(
        tokens = config.gateway.tokens.len(),
        pending_timeout_secs = config.turn.pending_timeout.as_secs(),
        "Starting turnstile gateway"
    );
    // Open subscriptions would hold a graceful shutdown forever, so stop on
    // the signal directly.
    let addr = config.gateway.bind_addr();
    tokio::select! {
        result = gateway::serve(state, &addr) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
    }

    let cancelled = remote_calls.shutdown().await + confirmations.shutdown().await;
    tracing::info!(cancelled, "Gateway stopped");
    Ok(())
}
