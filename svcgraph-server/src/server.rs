use std::future::IntoFuture;

use axum::Router;
use axum::http::{HeaderValue, StatusCode, header};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use crate::ServerError;
use crate::constants;
use crate::endpoints;
use crate::middlewares::{self, CatchPanicLayer};
use crate::service::ServiceState;

/// Build the axum application with all routes and middleware.
pub fn make_app(service: ServiceState) -> Router {
    // Layers added first are called first for requests and last for responses.
    let middleware = ServiceBuilder::new()
        .layer(axum::middleware::from_fn(middlewares::metrics))
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(constants::SERVER),
        ))
        .layer(middlewares::trace_http_layer())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            service.config().request_timeout(),
        ))
        .layer(RequestDecompressionLayer::new());

    endpoints::routes(service.config())
        .layer(middleware)
        .with_state(service)
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            svcgraph_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to listen for SIGINT"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                svcgraph_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => svcgraph_log::info!("SIGINT received, shutting down"),
        _ = terminate => svcgraph_log::info!("SIGTERM received, shutting down"),
    }
}

/// Serves HTTP requests until a shutdown signal arrives.
///
/// After the signal, readiness checks fail and the listener stops accepting connections.
/// In-flight requests get the configured shutdown timeout to complete before the server stops
/// regardless.
pub async fn serve(service: ServiceState) -> Result<(), ServerError> {
    let addr = service.config().listen_addr();
    let shutdown_timeout = service.config().shutdown_timeout();

    let listener = TcpListener::bind(addr)
        .await
        .map_err(ServerError::BindFailed)?;
    svcgraph_log::info!("spawning http server");
    svcgraph_log::info!("  listening on http://{addr}/");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut graceful_rx = shutdown_rx.clone();

    let state = service.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        state.begin_shutdown();
        shutdown_tx.send_replace(true);
    });

    let server = axum::serve(listener, make_app(service))
        .with_graceful_shutdown(async move {
            let _ = graceful_rx.wait_for(|stopping| *stopping).await;
        })
        .into_future();

    let deadline = async move {
        let _ = shutdown_rx.wait_for(|stopping| *stopping).await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => result.map_err(ServerError::BindFailed)?,
        _ = deadline => {
            svcgraph_log::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "shutdown timeout reached, dropping in-flight requests"
            );
        }
    }

    svcgraph_log::info!("http server stopped");
    Ok(())
}
