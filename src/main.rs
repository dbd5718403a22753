use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use pro_discovery::config::Settings;
use pro_discovery::core::{ServiceCatalog, ServiceMatcher};
use pro_discovery::routes::{self, discovery::AppState};
use pro_discovery::services::{BackendCollections, CachedBackend, RestBackend, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting discovery service...");

    let catalog = match &settings.discovery.catalog_path {
        Some(path) => match ServiceCatalog::from_toml_file(path) {
            Ok(catalog) => {
                info!("Loaded {} services from {}", catalog.len(), path);
                catalog
            }
            Err(e) => {
                error!("Failed to load service catalog from {}: {}", path, e);
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()));
            }
        },
        None => {
            let catalog = ServiceCatalog::builtin();
            info!("Using built-in service catalog ({} services)", catalog.len());
            catalog
        }
    };
    let catalog = Arc::new(catalog);

    let collections = BackendCollections {
        professionals: settings.collection.professionals,
        connection_requests: settings.collection.connection_requests,
        connections: settings.collection.connections,
    };

    let rest = RestBackend::new(
        settings.backend.endpoint,
        settings.backend.api_key,
        settings.backend.project_id,
        settings.backend.database_id,
        collections,
        Duration::from_secs(settings.backend.timeout_secs),
    )
    .map_err(|e| {
        error!("Failed to create backend client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let discovery = &settings.discovery;
    let backend = Arc::new(CachedBackend::new(
        rest,
        discovery.detail_cache_size,
        discovery.detail_cache_ttl_secs,
    ));

    info!(
        "Backend client initialized (detail cache: {} entries, TTL: {}s)",
        discovery.detail_cache_size, discovery.detail_cache_ttl_secs
    );

    let sessions = Arc::new(SessionStore::new(
        catalog.clone(),
        discovery.max_sessions,
        discovery.session_idle_secs,
        chrono::Duration::seconds(discovery.location_ttl_secs as i64),
    ));

    let app_state = AppState {
        backend,
        sessions,
        matcher: ServiceMatcher::new(catalog),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
