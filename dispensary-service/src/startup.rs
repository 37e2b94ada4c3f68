//! Application startup and lifecycle management.

use crate::config::DispensaryConfig;
use crate::handlers::{self, dispenses, medicines};
use crate::services::metrics::http_metrics_middleware;
use crate::services::{
    init_metrics, Database, DispenseRepository, Dispensary, InMemoryDispenses, InMemoryInventory,
    MedicineCatalog, StockLedger,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DispensaryConfig,
    pub dispensary: Arc<Dispensary>,
    pub medicines: Arc<dyn MedicineCatalog>,
}

/// The three collaborators a dispensary runs on.
pub struct Stores {
    pub dispenses: Arc<dyn DispenseRepository>,
    pub stock: Arc<dyn StockLedger>,
    pub medicines: Arc<dyn MedicineCatalog>,
}

impl Stores {
    pub fn in_memory(bill_prefix: &str) -> Self {
        let inventory = Arc::new(InMemoryInventory::new());
        Self {
            dispenses: Arc::new(InMemoryDispenses::new(bill_prefix)),
            stock: inventory.clone(),
            medicines: inventory,
        }
    }

    pub fn postgres(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            dispenses: db.clone(),
            stock: db.clone(),
            medicines: db,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/dispensary/dispenses",
            post(dispenses::create_dispense).get(dispenses::list_dispenses),
        )
        .route(
            "/dispensary/dispenses/:id",
            get(dispenses::get_dispense).put(dispenses::update_dispense),
        )
        .route(
            "/dispensary/dispenses/:id/cancel",
            post(dispenses::cancel_dispense),
        )
        .route("/dispensary/dispenses/:id/pay", post(dispenses::record_payment))
        .route("/dispensary/dispenses/:id/bill", post(dispenses::issue_bill))
        .route("/dispensary/stats", get(dispenses::dispense_stats))
        .route(
            "/medicines",
            get(medicines::list_medicines).post(medicines::create_medicine),
        )
        .route(
            "/medicines/:id",
            get(medicines::get_medicine).put(medicines::update_medicine),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    ///
    /// Without a database URL the service runs on in-memory stores.
    pub async fn build(config: DispensaryConfig) -> Result<Self, AppError> {
        let stores = match &config.database {
            Some(database) => {
                let db = Database::new(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?
                .with_bill_prefix(config.billing.bill_number_prefix.clone());

                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;

                Stores::postgres(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set - using in-memory stores");
                Stores::in_memory(&config.billing.bill_number_prefix)
            }
        };

        Self::build_with_stores(config, stores).await
    }

    /// Build the application over caller-supplied stores.
    pub async fn build_with_stores(
        config: DispensaryConfig,
        stores: Stores,
    ) -> Result<Self, AppError> {
        init_metrics();

        let dispensary = Arc::new(Dispensary::new(stores.dispenses, stores.stock));
        let state = AppState {
            config: config.clone(),
            dispensary,
            medicines: stores.medicines,
        };

        let http_addr = config.common.bind_address();
        let http_listener = TcpListener::bind(&http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Dispensary service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        tracing::info!(
            service = "dispensary-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
