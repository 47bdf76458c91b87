use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use conduit::{
    adapters::{HttpClientAdapter, HttpClientSource, HttpHandler},
    config::{GatewayConfig, ServerConfigValidator, load_config},
    core::{ClientDirectory, GatewayService},
    metrics,
    ports::{client_source::ClientSource, http_client::HttpClient},
    tracing_setup,
    utils::GracefulShutdown,
};
use tower_http::trace::TraceLayer;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "conduit.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "conduit.yaml")]
        config: String,
    },
    /// Write an example configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "conduit.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "conduit.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    let metrics_handle =
        metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration: {e}"))?;
    let config = Arc::new(config);

    let refresh_interval = config
        .clients
        .refresh_interval()
        .context("Invalid clients.refresh_interval")?;
    let source: Arc<dyn ClientSource> = Arc::new(HttpClientSource::from_config(&config)?);
    let directory = Arc::new(ClientDirectory::new(source, refresh_interval));
    directory
        .start()
        .await
        .context("Client directory could not be loaded, refusing to start")?;

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create upstream HTTP client")?);
    let gateway = Arc::new(GatewayService::new(
        Arc::clone(&config),
        Arc::clone(&directory),
        http_client,
    )?);

    let sweeper = {
        let cache = Arc::clone(gateway.cache());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired cache entries");
                }
            }
        })
    };

    let app = HttpHandler::new(gateway, metrics_handle)
        .router()
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(
        "Conduit gateway listening on {} (prefix {})",
        addr,
        config.api_prefix
    );

    let graceful_shutdown = GracefulShutdown::new();
    {
        let graceful_shutdown = graceful_shutdown.clone();
        tokio::spawn(async move { graceful_shutdown.run_signal_handler().await });
    }

    let server_result = {
        let graceful_shutdown = graceful_shutdown.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let reason = graceful_shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}", reason);
        })
        .await
        .context("Server error")
    };

    sweeper.abort();
    directory.stop();
    tracing::info!("Graceful shutdown completed");

    server_result
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            print_summary(&config);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all targets start with http:// or https://");
            println!("   • Route contexts must start with '/'");
            println!("   • Durations use humantime units (e.g. 30s, 5m)");
            println!("   • Secured routes need security.jwt_secret or JWT_SECRET_ACCESS_TOKEN");
            std::process::exit(1);
        }
    }
}

fn print_summary(config: &GatewayConfig) {
    let secured = config.routes.iter().filter(|r| r.security.is_some()).count();
    let internal = config.routes.iter().filter(|r| r.internal).count();

    println!("✅ Configuration validation: OK");
    println!();
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr);
    println!("   • API Prefix: {}", config.api_prefix);
    println!(
        "   • Routes: {} ({} secured, {} internal)",
        config.routes.len(),
        secured,
        internal
    );
    println!(
        "   • Client Directory: route '{}' path '{}' every {}",
        config.clients.directory_route, config.clients.path, config.clients.refresh_interval
    );
    println!();
    println!("🎉 Configuration is valid and ready to use!");
}

/// Write an example configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Conduit API gateway configuration

listen_addr: "0.0.0.0:3000"
api_prefix: "/api/v1"

clients:
  refresh_interval: "5m"
  directory_route: "auth-clients-service"
  path: "/clients"

security:
  # Prefer the JWT_SECRET_ACCESS_TOKEN environment variable
  jwt_secret: ""
  client_claim: "user_id"

upstream:
  default_timeout_ms: 5000

# Routes are matched in declaration order; the first match wins.
routes:
  - name: "auth-clients-service"
    context: ["/clients", "/clients/:id"]
    methods: ["GET", "POST", "PUT", "DELETE"]
    target: "http://localhost:4000"
    internal: true

  - name: "users"
    context: ["/users", "/users/:id"]
    methods: ["GET", "POST", "PUT", "DELETE"]
    target: "http://localhost:4001"
    path_rewrite:
      - ["^/users", "/api/v1/users"]
    security:
      scope: "users"
    limits:
      by: client
      requests: 100
      period: "1m"
    cache:
      ttl: "30s"

  - name: "auth"
    context: ["/auth/register"]
    methods: ["POST"]
    target: "http://localhost:4000"
    timeout: 10000
    on_access_refresh_clients: true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created example configuration at: {config_path}");
    println!("   Run 'conduit serve --config {config_path}' to start the gateway");
    Ok(())
}
