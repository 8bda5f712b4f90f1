use anyhow::Result;
use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    Json, Router,
};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::session::{registry::SessionRegistry, Session};
use crate::world::service::WorldHandle;

/* ------------------------------- serve() -------------------------------- */

pub async fn serve(cfg: Config, world: WorldHandle, sessions: SessionRegistry) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.http_host, cfg.http_port).parse()?;

    // Socket tuning (nodelay, keepalive, reuseaddr)
    let listener = tuned_listener(addr)?;

    info!("HTTP/WS listening on http://{addr}");

    let app = router(world, sessions);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/* ------------------------------- router() ------------------------------- */

fn router(world: WorldHandle, sessions: SessionRegistry) -> Router {
    let max_inflight: usize = num_cpus::get().max(1) * 1024;

    // Build middleware stack with HandleErrorLayer for fallible services
    let middleware = tower::ServiceBuilder::new()
        // Trace layer (outermost) - must be last to avoid Default bound issues
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
            ),
        )
        // CORS layer
        .layer(tower_http::cors::CorsLayer::permissive())
        // Handle errors from fallible middleware BEFORE applying them
        .layer(axum::error_handling::HandleErrorLayer::new(
            |err: tower::BoxError| async move {
                if err.is::<tower::timeout::error::Elapsed>() {
                    (axum::http::StatusCode::REQUEST_TIMEOUT, "request timed out")
                } else if err.is::<tower::load_shed::error::Overloaded>() {
                    (axum::http::StatusCode::SERVICE_UNAVAILABLE, "service overloaded")
                } else {
                    tracing::warn!(error = %err, "middleware error");
                    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                }
            },
        ))
        // Fallible middleware layers (innermost)
        .timeout(Duration::from_secs(10))
        .concurrency_limit(max_inflight)
        .load_shed()
        // Request body limit (after fallible layers so it doesn't need Default)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(1024 * 1024));

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/stats", axum::routing::get(stats))
        .route("/map", axum::routing::get(ws_upgrade))
        .with_state((world, sessions))
        .layer(middleware)
}

/* ------------------------------- Handlers ------------------------------- */

async fn health() -> impl IntoResponse {
    "OK"
}

async fn stats(
    State((world, sessions)): State<(WorldHandle, SessionRegistry)>,
) -> impl IntoResponse {
    match world.stats().await {
        Ok(world_stats) => Json(serde_json::json!({
            "world": world_stats,
            "sessions": sessions.stats(),
            "active": sessions.snapshot(),
        }))
        .into_response(),
        Err(err) => {
            error!(error = %err, "stats query failed");
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "world unavailable",
            )
                .into_response()
        }
    }
}

/* ---------------------------- WebSocket path ---------------------------- */

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State((world, sessions)): State<(WorldHandle, SessionRegistry)>,
) -> impl IntoResponse {
    debug!(remote = %remote, "WebSocket upgrade request received");

    // Set sizes to defend allocations; tune to your needs
    ws.max_message_size(1 << 20) // 1 MiB per message
        .max_frame_size(1 << 20)
        .on_upgrade(move |socket| ws_loop(socket, world, sessions, remote))
}

async fn ws_loop(
    mut socket: WebSocket,
    world: WorldHandle,
    sessions: SessionRegistry,
    remote: SocketAddr,
) {
    let id = sessions.register(Some(remote.to_string()));
    let mut session = Session::new(id.clone(), world);

    let mut message_count = 0u64;
    'session: while let Some(result) = socket.next().await {
        match result {
            Ok(msg) => {
                message_count += 1;
                match msg {
                    Message::Text(text) => {
                        debug!(
                            session = %id,
                            message_num = message_count,
                            text_len = text.len(),
                            preview = %text.chars().take(50).collect::<String>(),
                            "Received text message"
                        );

                        let frames = match session.handle_text(text.as_str()).await {
                            Ok(frames) => frames,
                            Err(e) => {
                                error!(session = %id, error = %e, "Failed to encode response");
                                break 'session;
                            }
                        };
                        for frame in frames {
                            if let Err(e) = socket.send(Message::Text(frame.into())).await {
                                warn!(session = %id, error = %e, "Failed to send frame, closing");
                                break 'session;
                            }
                        }
                    }
                    Message::Binary(bytes) => {
                        debug!(
                            session = %id,
                            message_num = message_count,
                            bytes_len = bytes.len(),
                            "Ignoring binary message"
                        );
                    }
                    Message::Ping(p) => {
                        if let Err(e) = socket.send(Message::Pong(p)).await {
                            error!(session = %id, error = %e, "Failed to send Pong response");
                            break;
                        }
                    }
                    Message::Close(frame) => {
                        let close_info = frame.as_ref().map(|f| (f.code, f.reason.to_string()));
                        info!(
                            session = %id,
                            close_code = ?close_info.as_ref().map(|(code, _)| code),
                            messages_exchanged = message_count,
                            "WebSocket connection closed by client"
                        );
                        break;
                    }
                    _ => {
                        debug!(session = %id, "Received other WebSocket message type");
                    }
                }
            }
            Err(e) => {
                error!(
                    session = %id,
                    error = %e,
                    messages_exchanged = message_count,
                    "WebSocket error, closing connection"
                );
                break;
            }
        }
    }

    sessions.unregister(&id);
}

/* ----------------------------- Socket tuning ---------------------------- */

fn tuned_listener(addr: SocketAddr) -> Result<TcpListener> {
    use socket2::{Domain, Protocol, Socket, Type};
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Reuseaddr to speed restarts & readiness flips
    socket.set_reuse_address(true)?;
    // Keep connections alive (helps load balancers too)
    socket.set_keepalive(true)?;
    // Linux/Unix keepalive intervals (best effort)
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use socket2::TcpKeepalive;
        let ka = TcpKeepalive::new()
            .with_time(Duration::from_secs(30))
            .with_interval(Duration::from_secs(10));
        let _ = socket.set_tcp_keepalive(&ka);
    }

    // Bind + listen
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    // Convert to Tokio listener
    let std_listener = std::net::TcpListener::from(socket);
    std_listener.set_nonblocking(true)?;
    // Note: TCP_NODELAY is set per-connection by hyper/axum automatically
    Ok(TcpListener::from_std(std_listener)?)
}

/* ----------------------------- Shutdown hook ---------------------------- */

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
