use clap::{Parser, Subcommand};
use foodgram_backend::db::{schema, services as db_services};
use foodgram_backend::server::config::ServerConfig;
use foodgram_backend::web::create_axum_router;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create missing tables and exit
    InitDb,
    /// Load ingredients from a `name,unit` CSV file
    LoadIngredients { csv: PathBuf },
    /// Create the default tags
    LoadTags,
    /// Load ingredients and default tags
    LoadAll { csv: PathBuf },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false) // No ANSI colors in file
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sea_orm=warn` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn connect(config: &ServerConfig) -> Result<DatabaseConnection, BoxError> {
    let mut opt = ConnectOptions::new(config.database_url.to_owned());
    opt.max_connections(config.db_max_connections).sqlx_logging(false);

    let db_pool = Database::connect(opt).await?;
    schema::create_schema(&db_pool).await?;
    Ok(db_pool)
}

async fn load_ingredients(db_pool: &DatabaseConnection, csv: &Path) -> Result<(), BoxError> {
    let file = std::fs::File::open(csv)
        .map_err(|e| format!("Failed to open ingredient file {}: {e}", csv.display()))?;
    let report = db_services::load_ingredients_csv(db_pool, file).await?;
    info!(file = %csv.display(), %report, "Ingredient import finished.");
    Ok(())
}

async fn load_tags(db_pool: &DatabaseConnection) -> Result<(), BoxError> {
    let report = db_services::load_default_tags(db_pool).await?;
    info!(%report, "Tag import finished.");
    Ok(())
}

async fn serve(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Result<(), BoxError> {
    let addr: SocketAddr = config.listen_addr.parse()?;
    tokio::fs::create_dir_all(&config.media_dir).await?;

    let app = create_axum_router(db_pool, config.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, media_dir = %config.media_dir, "HTTP server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal.");
            }
            info!("Shutdown signal received.");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    // --- Server Config Setup ---
    let server_config = Arc::new(ServerConfig::load(args.config.as_deref())?);

    init_logging(&server_config.log_dir); // Initialize logging first
    info!("Starting server, version: {}", env!("CARGO_PKG_VERSION"));

    // --- Database Pool Setup ---
    let db_pool = match connect(&server_config).await {
        Ok(db_pool) => db_pool,
        Err(e) => {
            error!(error = %e, "Failed to prepare the database.");
            return Err(e);
        }
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db_pool, server_config).await,
        Command::InitDb => Ok(()),
        Command::LoadIngredients { csv } => load_ingredients(&db_pool, &csv).await,
        Command::LoadTags => load_tags(&db_pool).await,
        Command::LoadAll { csv } => {
            load_ingredients(&db_pool, &csv).await?;
            load_tags(&db_pool).await
        }
    }
}
