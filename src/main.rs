use tracing::{error, info};

use filedepot::web::WebServer;
use filedepot::{Config, Database};

#[tokio::main]
async fn main() {
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = filedepot::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        filedepot::logging::init_console_only(&config.logging.level);
    }

    info!("filedepot - file upload and download service");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {}", config.database.path, e);
            std::process::exit(1);
        }
    };

    let server = match WebServer::new(&config, db) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialize web server: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Server configured on {}:{}",
        config.web.host, config.web.port
    );

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
