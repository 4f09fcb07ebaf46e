//! HTTPS Dispatch Module
//!
//! Serves the encrypt/decrypt API over TLS using the same credential bundle
//! that keys the RSA-OAEP services. When no key material resolved at
//! startup the listener falls back to plain HTTP and both endpoints answer
//! 503 per request; the process never exits over missing credentials.
//!
//! Every failure renders as a JSON body with an `error` field and the
//! status code of its class: 400 for input validation, 405 for a non-POST
//! method on an API route, 503 while credentials are unavailable, 500 for
//! engine failures.

use crate::configs::AppConfig;
use crate::encryption::{self, CryptoError};
use crate::key_material::CredentialState;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

struct AppState {
    credentials: CredentialState,
}

#[derive(Deserialize)]
struct EncryptRequest {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    original_data: String,
    encrypted_data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest {
    #[serde(default)]
    encrypted_data: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptResponse {
    encrypted_data: String,
    decrypted_data: String,
}

/// Request-boundary failure, rendered as `{"error": ...}` JSON
enum ServiceError {
    InputValidation(String),
    MethodNotAllowed,
    Unavailable,
    CryptoFailure(String),
}

impl From<CryptoError> for ServiceError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyUnavailable => ServiceError::Unavailable,
            CryptoError::InputEmpty
            | CryptoError::InputTooLarge { .. }
            | CryptoError::MalformedInput(_) => ServiceError::InputValidation(err.to_string()),
            CryptoError::CryptoFailure(reason) => ServiceError::CryptoFailure(reason),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServiceError::InputValidation(message) => (StatusCode::BAD_REQUEST, message),
            ServiceError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_string(),
            ),
            ServiceError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Key material unavailable".to_string(),
            ),
            ServiceError::CryptoFailure(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html("<h1>Hello, Secure World!</h1><p>Your connection is encrypted.</p>")
}

async fn method_not_allowed() -> ServiceError {
    ServiceError::MethodNotAllowed
}

async fn encrypt_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EncryptRequest>, JsonRejection>,
) -> Result<Json<EncryptResponse>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::InputValidation(e.body_text()))?;

    let data = request
        .data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| {
            ServiceError::InputValidation("Please provide data in the JSON body.".to_string())
        })?;

    let encrypted = encryption::encrypt_data(&state.credentials, data.as_bytes())?;

    Ok(Json(EncryptResponse {
        original_data: data,
        encrypted_data: encrypted,
    }))
}

async fn decrypt_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DecryptRequest>, JsonRejection>,
) -> Result<Json<DecryptResponse>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::InputValidation(e.body_text()))?;

    let encrypted = request
        .encrypted_data
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ServiceError::InputValidation(
                "Please provide encryptedData in the JSON body.".to_string(),
            )
        })?;

    let decrypted = encryption::decrypt_data(&state.credentials, &encrypted)?;

    // The response is JSON; bytes that are not UTF-8 cannot be returned
    // without mangling them
    let decrypted = String::from_utf8(decrypted).map_err(|_| {
        ServiceError::CryptoFailure("decrypted data is not valid UTF-8".to_string())
    })?;

    Ok(Json(DecryptResponse {
        encrypted_data: encrypted,
        decrypted_data: decrypted,
    }))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            "/encrypt",
            post(encrypt_handler).fallback(method_not_allowed),
        )
        .route(
            "/decrypt",
            post(decrypt_handler).fallback(method_not_allowed),
        )
        .with_state(state)
}

/// Run the HTTP(S) server until shutdown
///
/// Serves over TLS with the credential bundle's chain and key when
/// credentials resolved; otherwise binds plain HTTP so the per-request 503
/// guard stays observable.
pub fn start_webserver(config: AppConfig, credentials: CredentialState) -> Result<()> {
    let state = Arc::new(AppState {
        credentials: credentials.clone(),
    });
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(async move {
        let app = build_router(state);
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("Invalid listen address")?;

        match credentials.bundle() {
            Some(bundle) => {
                let tls_config =
                    RustlsConfig::from_pem(bundle.tls_chain_pem(), bundle.tls_private_key_pem())
                        .await
                        .context("Failed to build TLS config from credential bundle")?;

                info!(%addr, "HTTPS server listening");
                axum_server::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service())
                    .await
                    .context("Server error")?;
            }
            None => {
                warn!(%addr, "no key material resolved; serving plain HTTP, API endpoints will return 503");
                axum_server::bind(addr)
                    .serve(app.into_make_service())
                    .await
                    .context("Server error")?;
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_ca::RsaCaBuilder;
    use crate::generate_server_cert::RsaServerCertBuilder;
    use crate::key_material::{CredentialBundle, RawKeyMaterial};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn router_with(credentials: CredentialState) -> Router {
        build_router(Arc::new(AppState { credentials }))
    }

    fn ready_state() -> CredentialState {
        let (ca_key, ca_cert) = RsaCaBuilder::new()
            .subject_common_name("Test Root CA".to_string())
            .organization("Test Org".to_string())
            .locality("Toronto".to_string())
            .state("Ontario".to_string())
            .country("CA".to_string())
            .build()
            .unwrap();
        let (server_key, server_cert) = RsaServerCertBuilder::new(ca_key, ca_cert)
            .subject_common_name("localhost".to_string())
            .build()
            .unwrap();

        let bundle = CredentialBundle::from_raw(RawKeyMaterial {
            private_key_pem: server_key.private_key_to_pem_pkcs8().unwrap(),
            certificate_pem: server_cert.to_pem().unwrap(),
            ca_certificate_pem: None,
        })
        .unwrap();
        CredentialState::Ready(Arc::new(bundle))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt_round_trip() {
        let state = ready_state();

        let response = router_with(state.clone())
            .oneshot(post_json("/encrypt", r#"{"data":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let encrypt_body = body_json(response).await;
        assert_eq!(encrypt_body["originalData"], "hello");
        let encrypted = encrypt_body["encryptedData"].as_str().unwrap().to_string();

        let response = router_with(state)
            .oneshot(post_json(
                "/decrypt",
                &serde_json::json!({ "encryptedData": encrypted }).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let decrypt_body = body_json(response).await;
        assert_eq!(decrypt_body["decryptedData"], "hello");
        assert_eq!(decrypt_body["encryptedData"], encrypted);
    }

    #[tokio::test]
    async fn test_unavailable_endpoints_return_503() {
        let response = router_with(CredentialState::Unavailable)
            .oneshot(post_json("/encrypt", r#"{"data":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(response).await["error"].is_string());

        let response = router_with(CredentialState::Unavailable)
            .oneshot(post_json("/decrypt", r#"{"encryptedData":"aGVsbG8="}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_missing_fields_return_400() {
        let response = router_with(ready_state())
            .oneshot(post_json("/encrypt", r#"{}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());

        let response = router_with(ready_state())
            .oneshot(post_json("/decrypt", r#"{"encryptedData":""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_base64_returns_400() {
        let response = router_with(ready_state())
            .oneshot(post_json("/decrypt", r#"{"encryptedData":"@@nope@@"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_post_returns_405() {
        let response = router_with(ready_state())
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/encrypt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_index_serves_greeting() {
        let response = router_with(CredentialState::Unavailable)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
