mod config;
mod routes;
mod sink;
mod soap;
mod token;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use mde_pki::CaIdentity;

pub use config::ServerConfig;
pub use sink::{CertificateRecord, CertificateSink, DirectorySink, LogSink};
pub use token::TokenAuthority;

/// Enrollment requests carry a single CSR, so this is generous.
const BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub ca: Arc<CaIdentity>,
    pub tokens: Arc<TokenAuthority>,
    pub sink: Arc<dyn CertificateSink>,
}

/// Build the HTTP routes served to the Windows enrollment client.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/EnrollmentServer/Authenticate.svc",
            get(routes::authenticate),
        )
        .route("/EnrollmentServer/ToS", get(routes::terms_of_service))
        .route(
            "/EnrollmentServer/Discovery.svc",
            get(routes::discovery_probe).post(routes::discovery),
        )
        .route("/EnrollmentServer/Policy.svc", post(routes::policy))
        .route("/EnrollmentServer/Enrollment.svc", post(routes::enrollment))
        .route("/ManagementServer/Manage.svc", post(routes::manage))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
