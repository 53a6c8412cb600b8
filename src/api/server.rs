use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::{handlers, rate_limit, sse};
use crate::app::AppState;
use crate::core::config::PostboardConfig;
use crate::core::error::{PostboardError, Result};


pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/events", get(sse::events))
        .route("/api/login", post(handlers::login))
        .route("/api/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/api/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/api/posts", get(handlers::list_posts).post(handlers::create_post))
        .route(
            "/api/posts/{id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route("/api/undo", post(handlers::undo))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::limit_by_ip,
        ))
        .with_state(state)
}

/// Serves until `shutdown` resolves. Live event streams are closed first so
/// the graceful shutdown is not held open by them.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::clone(&state));
    let hub = Arc::clone(state.service.hub());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = hub.close_all();
            info!("Closed {} live event streams", closed);
        })
        .await
        .map_err(|e| PostboardError::Transport(e.to_string()))
}

/// Loads state, serves on the configured address until Ctrl-C, then tears down.
pub async fn run(config: PostboardConfig) -> Result<()> {
    let addr = config.bind_addr();
    let state = AppState::init(config)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let served = serve(listener, Arc::clone(&state), shutdown_signal()).await;
    state.teardown();
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
