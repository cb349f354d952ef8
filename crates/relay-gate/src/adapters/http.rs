//! HTTP surface for the gate.
//!
//! One route: `POST /v1/events` carrying the JSON envelope. The caller
//! address is the connected socket peer; forwarded headers are honored
//! only when that peer is a configured trusted proxy, so a direct caller
//! cannot forge an allowlisted address. A body-supplied address is never
//! trusted. Responses map the typed rejection to a status code plus the
//! coarse public message.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, VerificationResult};
use crate::pipeline::Pipeline;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The verification pipeline
    pub pipeline: Arc<Pipeline>,
    /// Proxy ranges whose forwarded headers are trusted
    pub trusted_proxies: Arc<Vec<IpNet>>,
}

/// Build the gate router.
pub fn router(
    pipeline: Arc<Pipeline>,
    max_body_bytes: usize,
    trusted_proxies: Vec<IpNet>,
) -> Router {
    Router::new()
        .route("/v1/events", post(handle_event))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            pipeline,
            trusted_proxies: Arc::new(trusted_proxies),
        })
}

/// Bind `addr` and serve the gate until the future is dropped.
///
/// # Errors
///
/// Returns the bind or accept-loop I/O error.
pub async fn serve(
    addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    max_body_bytes: usize,
    trusted_proxies: Vec<IpNet>,
) -> std::io::Result<()> {
    let app = router(pipeline, max_body_bytes, trusted_proxies)
        .into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Gate listening");
    axum::serve(listener, app).await
}

async fn handle_event(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let source_ip = extract_client_ip(&headers, connect_info, &state.trusted_proxies);

    let envelope = match SecureEnvelope::decode(&body, source_ip) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(%source_ip, error = %e, "Envelope failed shape validation");
            return reject_response(&RejectReason::from(e));
        }
    };

    match state.pipeline.verify(&envelope) {
        VerificationResult::Accepted { payload } => accept_response(&payload),
        VerificationResult::Rejected { reason, .. } => reject_response(&reason),
    }
}

/// Resolve the caller address.
///
/// The socket peer is authoritative. Forwarded headers override it only
/// when the peer sits inside the trusted proxy set; everyone else gets
/// their own address no matter what headers they send.
fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    trusted_proxies: &[IpNet],
) -> IpAddr {
    let Some(ConnectInfo(addr)) = connect_info else {
        // No transport peer: a direct in-process call.
        return IpAddr::from([127, 0, 0, 1]);
    };
    let peer = addr.ip();

    if !trusted_proxies.iter().any(|net| net.contains(&peer)) {
        return peer;
    }

    // X-Forwarded-For carries the original client first.
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(real_ip_str) = real_ip.to_str() {
            if let Ok(ip) = real_ip_str.parse::<IpAddr>() {
                return ip;
            }
        }
    }

    // Trusted proxy sent no usable client header.
    peer
}

fn accept_response(payload: &[u8]) -> Response {
    let body = serde_json::json!({
        "status": "accepted",
        "payload": String::from_utf8_lossy(payload),
    });
    (StatusCode::OK, Json(body)).into_response()
}

fn reject_response(reason: &RejectReason) -> Response {
    let status =
        StatusCode::from_u16(reason.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "status": "rejected",
        "error": reason.public_message(),
    });

    let mut response = (status, Json(body)).into_response();
    if let RejectReason::RateLimited { retry_after_ms } = reason {
        // Whole seconds, rounded up.
        let secs = retry_after_ms.div_ceil(1000).max(1);
        if let Ok(value) = secs.to_string().parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}
