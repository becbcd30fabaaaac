use axum::{
    extract::State,
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tracing::{error, info};

use crate::bot::IdentityProvider;
use crate::error::ServerError;
use crate::models::{HealthResponse, StatusResponse, UptimeBreakdown, UptimeResponse};
use crate::utils::{format_uptime_localized, round2};

/// Read-only state shared by every request.
#[derive(Clone)]
pub struct HealthServer {
    service_name: Arc<str>,
    start_time: DateTime<Utc>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

/// A server that has bound its port and is serving in the background.
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl HealthServer {
    pub fn new(
        service_name: impl Into<String>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let service_name: String = service_name.into();
        Self {
            service_name: service_name.into(),
            start_time: Utc::now(),
            identity,
        }
    }

    fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(health))
            .route("/health", get(health))
            .route("/status", get(bot_status))
            .route("/uptime", get(uptime))
            .layer(cors())
            .with_state(self.clone())
    }

    /// Binds `0.0.0.0:port` and serves until `shutdown` resolves.
    ///
    /// Bind errors are returned to the caller; nothing is retried.
    pub async fn start<F>(&self, port: u16, shutdown: F) -> Result<RunningServer, ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            error!("Error starting health check server: {}", source);
            ServerError::Bind { addr, source }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!("Health check server started on port {}", local_addr.port());
        info!("Health check available at: http://localhost:{}/health", local_addr.port());

        let app = self.router();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        });

        Ok(RunningServer { local_addr, task })
    }
}

/// Any origin, header and method, with credentials. Origins, headers and
/// methods are mirrored and exposed headers listed, because wildcards are
/// rejected alongside credentials.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_credentials(true)
        .expose_headers(ExposeHeaders::list([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::DATE,
        ]))
}

async fn health(State(server): State<HealthServer>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: server.service_name.to_string(),
        timestamp: Utc::now(),
        uptime_seconds: server.uptime_seconds(),
    })
}

async fn bot_status(State(server): State<HealthServer>) -> (StatusCode, Json<StatusResponse>) {
    let Some(identity) = &server.identity else {
        return (
            StatusCode::OK,
            Json(StatusResponse::NotInitialized { timestamp: Utc::now() }),
        );
    };

    match identity.get_me().await {
        Ok(me) => (
            StatusCode::OK,
            Json(StatusResponse::Running {
                bot_username: me.username,
                bot_id: me.id,
                bot_name: me.first_name,
                timestamp: Utc::now(),
            }),
        ),
        Err(e) => {
            error!("Error getting bot status: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse::Error {
                    error: e.to_string(),
                    timestamp: Utc::now(),
                }),
            )
        }
    }
}

async fn uptime(State(server): State<HealthServer>) -> Json<UptimeResponse> {
    let seconds = server.uptime_seconds();
    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    Json(UptimeResponse {
        start_time: server.start_time,
        current_time: Utc::now(),
        uptime: UptimeBreakdown {
            seconds: round2(seconds),
            minutes: round2(minutes),
            hours: round2(hours),
            days: round2(days),
            formatted: format_uptime_localized(seconds),
        },
    })
}
