use clap::{Parser, Subcommand};
use sale_backend::config::Config;
use sale_backend::db::DatabaseManager;
use sale_backend::schema::ENTITIES;
use sale_backend::{constants, logging, metrics, server};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sale_backend")]
#[command(about = "Point-of-sale REST backend with a broadcast chat channel")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = constants::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations and serve the REST and chat endpoints
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply pending database migrations and exit
    Migrate,
    /// Print the registered REST collections
    Entities,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    let _guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            metrics::init_metrics(&config.metrics);
            if let Err(e) = server::start_server(&config).await {
                error!("Server failed: {}", e);
                return Err(e);
            }
        }
        Commands::Migrate => {
            let db = DatabaseManager::open(&config.database.path)?;
            db.run_migrations()?;
            info!("Database at {} is up to date", config.database.path);
        }
        Commands::Entities => {
            for entity in ENTITIES {
                println!("{:<16} {}", entity.name, constants::collection_path(entity.name));
            }
        }
    }
    Ok(())
}
