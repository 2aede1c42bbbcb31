//! Session manager: accepts subscriber connections and spawns sessions

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::{context::AppContext, errors::AisLiveError, session};

/// Router with the subscriber WebSocket endpoint mounted at `path`
pub fn router(ctx: AppContext, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .with_state(ctx)
}

/// Serve subscribers on `listener` until the listener fails
pub async fn serve(listener: TcpListener, ctx: AppContext, path: &str) -> Result<(), AisLiveError> {
    info!("Subscriber endpoint listening on ws://{}{}", listener.local_addr()?, path);

    axum::serve(
        listener,
        router(ctx, path).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(ctx): State<AppContext>,
) -> Response {
    ws.on_upgrade(move |socket| session::run(socket, ctx, peer))
}
