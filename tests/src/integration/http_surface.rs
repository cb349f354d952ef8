//! Status mapping over the HTTP adapter: the wire contract a caller sees.

#[cfg(test)]
mod tests {
    use crate::support;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use ipnet::IpNet;
    use relay_gate::adapters::http;
    use relay_gate::Pipeline;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PAYLOAD: &[u8] = br#"{"event":"subscription_activated","amount":999}"#;

    fn app() -> Router {
        let pipeline = Arc::new(Pipeline::new(&support::test_config()).unwrap());
        http::router(pipeline, 256 * 1024, Vec::new())
    }

    fn app_behind_proxy(proxy_range: &str) -> Router {
        let pipeline = Arc::new(Pipeline::new(&support::test_config()).unwrap());
        let proxies: Vec<IpNet> = vec![proxy_range.parse().unwrap()];
        http::router(pipeline, 256 * 1024, proxies)
    }

    fn request_from(source_ip: &str, body: Vec<u8>) -> Request<Body> {
        let addr: SocketAddr = format!("{source_ip}:40000").parse().unwrap();
        Request::builder()
            .method("POST")
            .uri("/v1/events")
            .header(header::CONTENT_TYPE, "application/json")
            .extension(ConnectInfo(addr))
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_envelope_returns_200_with_payload() {
        let app = app();
        let envelope = support::valid_envelope(PAYLOAD);
        let response = app
            .oneshot(request_from("10.0.0.1", envelope.encode()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "accepted");
        assert_eq!(
            json["payload"],
            String::from_utf8_lossy(PAYLOAD).as_ref()
        );
    }

    #[tokio::test]
    async fn test_malformed_body_returns_400() {
        let response = app()
            .oneshot(request_from("10.0.0.1", b"not json at all".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "malformed envelope");
    }

    #[tokio::test]
    async fn test_off_allowlist_address_returns_403() {
        let envelope = support::valid_envelope(PAYLOAD);
        let response = app()
            .oneshot(request_from("203.0.113.5", envelope.encode()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_forged_forwarded_header_cannot_bypass_allowlist() {
        let envelope = support::valid_envelope(PAYLOAD);
        // Direct caller from outside the allowlist claims an allowlisted
        // address via headers. No trusted proxies are configured, so the
        // socket peer wins and the request is still forbidden.
        let mut request = request_from("203.0.113.5", envelope.encode());
        request
            .headers_mut()
            .insert("x-forwarded-for", "10.0.0.1".parse().unwrap());
        request
            .headers_mut()
            .insert("x-real-ip", "10.0.0.1".parse().unwrap());

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_trusted_proxy_forwarded_header_is_honored() {
        let envelope = support::valid_envelope(PAYLOAD);
        // Same forwarded header, but the peer is the configured proxy.
        let mut request = request_from("198.51.100.1", envelope.encode());
        request
            .headers_mut()
            .insert("x-forwarded-for", "10.0.0.1".parse().unwrap());

        let response = app_behind_proxy("198.51.100.1/32")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_secret_returns_coarse_401() {
        let mut envelope = support::valid_envelope(PAYLOAD);
        envelope.api_key_secret = "wrong-secret".into();
        let response = app()
            .oneshot(request_from("10.0.0.1", envelope.encode()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        // Coarse message only; no hint which layer failed.
        assert_eq!(json["error"], "verification failed");
    }

    #[tokio::test]
    async fn test_replay_returns_409() {
        let app = app();
        let envelope = support::valid_envelope(PAYLOAD);

        let first = app
            .clone()
            .oneshot(request_from("10.0.0.1", envelope.encode()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(request_from("10.0.0.1", envelope.encode()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let json = body_json(second).await;
        assert_eq!(json["error"], "duplicate request");
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429_with_retry_after() {
        let mut config = support::test_config();
        config.rate_limit.requests_per_minute = 60;
        config.rate_limit.burst_size = 1;
        let pipeline = Arc::new(Pipeline::new(&config).unwrap());
        let app = http::router(pipeline, 256 * 1024, Vec::new());

        let first = app
            .clone()
            .oneshot(request_from(
                "10.0.0.1",
                support::valid_envelope(PAYLOAD).encode(),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(request_from(
                "10.0.0.1",
                support::valid_envelope(PAYLOAD).encode(),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after = second
            .headers()
            .get(header::RETRY_AFTER)
            .expect("Retry-After header")
            .to_str()
            .unwrap()
            .parse::<u64>()
            .unwrap();
        assert!(retry_after >= 1);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_returns_coarse_401() {
        let envelope = support::valid_envelope(PAYLOAD);
        let mut tampered = envelope.clone();
        tampered.ciphertext[0] ^= 0x01;
        let key = relay_crypto::SigningKey::from_bytes(&support::SIGNING_KEY).unwrap();
        tampered.signature = relay_crypto::sign(&key, &tampered.canonical_bytes());

        let response = app()
            .oneshot(request_from("10.0.0.1", tampered.encode()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "verification failed");
    }
}
