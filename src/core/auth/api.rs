//! Auth API endpoints
//!
//! Thin HTTP adapter over [`AuthService`]:
//! - POST /api/v1/register - Register a new user
//! - POST /api/v1/login - Login and get tokens
//! - POST /api/v1/refresh - Rotate the refresh token
//! - POST /api/v1/logout - Revoke a refresh token
//! - POST /api/v1/logout-all - Revoke every session of the bearer
//! - GET /api/v1/me - Claims of the bearer access token
//! - GET /health - Liveness probe
//!
//! Every `/api/v1` route passes through the rate limiter first.

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::auth::error::AuthError;
use crate::core::auth::service::{
    AuthService, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, TokenPair,
};
use crate::core::db::models::Role;
use crate::core::ratelimit::client::ClientIdentity;
use crate::core::ratelimit::limiter::ClientRateLimiter;
use crate::core::ratelimit::middleware::admission;

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ApiError::new(self.code(), self.to_string());
        let mut response = (self.status(), Json(body)).into_response();

        if let AuthError::TooManyRequests { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    /// Username or email
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

/// Create the auth API router. Auth routes are admitted through `limiter`;
/// the health probe is not.
pub fn auth_api_router(state: AuthApiState, limiter: Arc<ClientRateLimiter>) -> Router {
    let state = Arc::new(state);

    let auth_routes = Router::new()
        .route("/api/v1/register", post(register_handler))
        .route("/api/v1/login", post(login_handler))
        .route("/api/v1/refresh", post(refresh_handler))
        .route("/api/v1/logout", post(logout_handler))
        .route("/api/v1/logout-all", post(logout_all_handler))
        .route("/api/v1/me", get(me_handler))
        .route_layer(middleware::from_fn_with_state(limiter, admission))
        .with_state(state);

    Router::new()
        .route("/health", get(health_handler))
        .merge(auth_routes)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// POST /api/v1/register
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let user_id = state.auth_service.register(request).await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

/// POST /api/v1/login
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    Extension(client): Extension<ClientIdentity>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, AuthError> {
    let response = state
        .auth_service
        .login(LoginRequest {
            login: body.login,
            password: body.password,
            user_agent: user_agent(&headers).unwrap_or_default(),
            client_addr: client.to_string(),
        })
        .await?;

    Ok(Json(response))
}

/// POST /api/v1/refresh
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    Extension(client): Extension<ClientIdentity>,
    headers: HeaderMap,
    Json(body): Json<RefreshBody>,
) -> Result<Json<TokenPair>, AuthError> {
    tracing::debug!("Token refresh request");

    let tokens = state
        .auth_service
        .refresh(RefreshRequest {
            refresh_token: body.refresh_token,
            user_agent: user_agent(&headers),
            client_addr: Some(client.to_string()),
        })
        .await?;

    Ok(Json(tokens))
}

/// POST /api/v1/logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<LogoutResponse>, AuthError> {
    state.auth_service.logout(&body.refresh_token).await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// POST /api/v1/logout-all
async fn logout_all_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<LogoutAllResponse>, AuthError> {
    let token = extract_bearer_token(&headers)?;
    let claims = state.auth_service.authenticate(&token)?;

    let revoked = state.auth_service.logout_all(claims.user_id).await?;

    Ok(Json(LogoutAllResponse { revoked }))
}

/// GET /api/v1/me
async fn me_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, AuthError> {
    let token = extract_bearer_token(&headers)?;
    let claims = state.auth_service.authenticate(&token)?;

    Ok(Json(MeResponse {
        user_id: claims.user_id,
        role: claims.role,
    }))
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::TokenRequired)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::TokenRequired);
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::{JwtConfig, JwtService};
    use crate::core::auth::opaque::OpaqueTokenManager;
    use crate::core::auth::password::PasswordHasher;
    use crate::core::db::memory::{MemorySessionStore, MemoryUserStore};
    use crate::core::db::store::UserStore;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Duration;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        users: Arc<MemoryUserStore>,
    }

    fn create_test_app(requests: u32) -> TestApp {
        let users = Arc::new(MemoryUserStore::new());
        let jwt = JwtService::new(JwtConfig::new("test_secret_key_for_testing_only_32bytes!"))
            .unwrap();
        let auth_service = AuthService::new(
            users.clone(),
            Arc::new(MemorySessionStore::new()),
            jwt,
            PasswordHasher::new(4),
            OpaqueTokenManager::default(),
            Duration::hours(24),
        )
        .unwrap();
        let limiter =
            Arc::new(ClientRateLimiter::new(requests, std::time::Duration::from_secs(60)).unwrap());

        TestApp {
            router: auth_api_router(AuthApiState { auth_service }, limiter),
            users,
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "api-test/1.0")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    async fn register_and_verify(app: &TestApp) -> Uuid {
        let (status, _, body) = send(
            app,
            post_json(
                "/api/v1/register",
                json!({
                    "username": "alice",
                    "email": "alice@example.com",
                    "password": "Password123",
                    "first_name": "Alice",
                    "last_name": "Liddell"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let user_id: Uuid = body["user_id"].as_str().unwrap().parse().unwrap();
        let mut user = app.users.get_user_by_id(user_id).await.unwrap().unwrap();
        user.verify().unwrap();
        app.users.update_user(&user).await.unwrap();

        user_id
    }

    async fn login(app: &TestApp) -> Value {
        let (status, _, body) = send(
            app,
            post_json(
                "/api/v1/login",
                json!({ "login": "alice", "password": "Password123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    // ========================================================================
    // Bearer Extraction Tests
    // ========================================================================

    #[test]
    fn test_extract_bearer_token_valid() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer my_token_123"),
        );

        let token = extract_bearer_token(&headers).unwrap();
        assert_eq!(token, "my_token_123");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let result = extract_bearer_token(&HeaderMap::new());
        assert!(matches!(result, Err(AuthError::TokenRequired)));
    }

    #[test]
    fn test_extract_bearer_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic base64credentials"),
        );

        let result = extract_bearer_token(&headers);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_extract_bearer_token_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  "));

        let result = extract_bearer_token(&headers);
        assert!(matches!(result, Err(AuthError::TokenRequired)));
    }

    #[test]
    fn test_api_error_serialization() {
        let error = ApiError::new("ERROR_CODE", "Something went wrong");
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["error"]["code"], "ERROR_CODE");
        assert_eq!(json["error"]["message"], "Something went wrong");
    }

    // ========================================================================
    // Router Tests
    // ========================================================================

    #[tokio::test]
    async fn test_health() {
        let app = create_test_app(10);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_refresh_logout_flow() {
        let app = create_test_app(100);
        let user_id = register_and_verify(&app).await;

        let login = login(&app).await;
        assert_eq!(login["user_id"], user_id.to_string());
        assert_eq!(login["token_type"], "Bearer");
        let access = login["access_token"].as_str().unwrap();
        let refresh = login["refresh_token"].as_str().unwrap();

        let (status, _, me) = send(&app, get_with_bearer("/api/v1/me", access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user_id"], user_id.to_string());
        assert_eq!(me["role"], "user");

        let (status, _, rotated) = send(
            &app,
            post_json("/api/v1/refresh", json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let new_refresh = rotated["refresh_token"].as_str().unwrap();
        assert_ne!(new_refresh, refresh);

        let (status, _, body) = send(
            &app,
            post_json("/api/v1/refresh", json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");

        let (status, _, _) = send(
            &app,
            post_json("/api/v1/logout", json!({ "refresh_token": new_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(
            &app,
            post_json("/api/v1/logout", json!({ "refresh_token": new_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_login_failure_body() {
        let app = create_test_app(100);
        register_and_verify(&app).await;

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/v1/login",
                json!({ "login": "alice", "password": "nope-nope" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let app = create_test_app(100);
        register_and_verify(&app).await;

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/v1/register",
                json!({
                    "username": "Alice",
                    "email": "someone@example.com",
                    "password": "Password123",
                    "first_name": "A",
                    "last_name": "L"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "USERNAME_TAKEN");
    }

    #[tokio::test]
    async fn test_logout_all_requires_bearer() {
        let app = create_test_app(100);
        register_and_verify(&app).await;
        let login = login(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/logout-all")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "TOKEN_REQUIRED");

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/logout-all")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", login["access_token"].as_str().unwrap()),
            )
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revoked"], 1);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_retry_after() {
        let app = create_test_app(2);

        for _ in 0..2 {
            let (status, _, _) = send(
                &app,
                post_json("/api/v1/logout", json!({ "refresh_token": "unknown" })),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        let (status, headers, body) = send(
            &app,
            post_json("/api/v1/logout", json!({ "refresh_token": "unknown" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers[header::RETRY_AFTER], "60");
        assert_eq!(body["error"]["code"], "TOO_MANY_REQUESTS");

        // Health is never limited
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_is_per_client() {
        let app = create_test_app(1);

        let request = |ip: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/api/v1/logout")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", ip)
                .body(Body::from(r#"{"refresh_token":"unknown"}"#))
                .unwrap()
        };

        let (status, _, _) = send(&app, request("198.51.100.1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&app, request("198.51.100.1")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let (status, _, _) = send(&app, request("198.51.100.2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
