//! Anime Tracker API Server
//!
//! Main entry point for the anime watch tracker service.

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use anime_tracker::availability::{AvailabilityCache, AvailabilityProber, AvailabilityService};
use anime_tracker::config::Config;
use anime_tracker::coordinator::SaveCoordinator;
use anime_tracker::export::Exporter;
use anime_tracker::fetcher::{FetcherConfig, PageFetcher};
use anime_tracker::routes::{configure_routes, ApiDoc, AppState};
use anime_tracker::store::{Database, EpisodeStore, KeyValueStore, MemoryStore, Quota};

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Storage health check endpoint
async fn store_health_check(data: web::Data<AppState>) -> impl Responder {
    let backend = if data.config.database_url.is_some() {
        "postgres"
    } else {
        "memory"
    };

    match data.coordinator.episodes().health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "store": backend,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
        Err(e) => {
            error!("Store health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "store": backend,
                "error": e.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }))
        }
    }
}

fn io_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

/// Synced and local namespaces for the configured backend
async fn open_stores(
    config: &Config,
) -> std::io::Result<(Arc<dyn KeyValueStore>, Arc<dyn KeyValueStore>)> {
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db = Database::new(url).await.map_err(io_error)?;

            info!("Running database migrations...");
            db.run_migrations().await.map_err(io_error)?;

            info!("Database connected and migrations complete");
            let sync: Arc<dyn KeyValueStore> = Arc::new(db.namespace("sync"));
            let local: Arc<dyn KeyValueStore> = Arc::new(db.namespace("local"));
            Ok((sync, local))
        }
        None => {
            warn!("DATABASE_URL not set, keeping data in memory");
            let sync: Arc<dyn KeyValueStore> =
                Arc::new(MemoryStore::with_quota("sync", Quota::sync()));
            let local: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new("local"));
            Ok((sync, local))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let bind_address = format!("{}:{}", config.host, config.port);

    let fetcher = Arc::new(PageFetcher::new(FetcherConfig::default()).map_err(io_error)?);
    let (sync, local) = open_stores(&config).await?;

    let episodes = EpisodeStore::new(sync);
    let availability = AvailabilityService::new(
        AvailabilityProber::new(fetcher.clone()),
        AvailabilityCache::new(local, config.availability_ttl),
        episodes.clone(),
    );
    let coordinator = Arc::new(
        SaveCoordinator::new(episodes, availability, fetcher)
            .with_exporter(config.export_dir.clone().map(Exporter::new))
            .with_dedupe_window(config.dedupe_window),
    );

    let period = config.revalidate_interval;
    if period.is_zero() {
        warn!("Background re-validation disabled");
    } else {
        let revalidator = coordinator.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match revalidator.revalidate_all(false).await {
                    Ok(reports) => {
                        info!("Background re-validation checked {} series", reports.len())
                    }
                    Err(e) => error!("Background re-validation failed: {}", e),
                }
            }
        });
    }

    let app_state = web::Data::new(AppState {
        coordinator,
        config: config.clone(),
    });

    info!("Starting Anime Tracker API server on {}", bind_address);

    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/health", web::get().to(health_check))
            .route("/health/store", web::get().to(store_health_check))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
