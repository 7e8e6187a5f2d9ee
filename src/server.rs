//! Axum router construction and share-link serving.
//!
//! The [`app`] function wires the API and health endpoints to their
//! handlers and installs the share-link handler as the router fallback, so
//! literal routes always win over link paths.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::TryStreamExt;
use garde::Validate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use utoipa::{OpenApi, ToSchema};

use crate::errors::{generate_request_id, ErrorBody, ShareError};
use crate::link::{self, LinkError};
use crate::metrics::{
    metrics_handler, metrics_middleware, record_share_request, SHARES_CREATED_TOTAL,
    SHARES_REVOKED_TOTAL,
};
use crate::share::ShareRequest;
use crate::AppState;

/// `Cache-Control` sent with shared object bytes.
const SHARED_OBJECT_CACHE_CONTROL: &str = "public, max-age=3600";

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the s3share API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "s3share API",
        version = "0.1.0",
        description = "Time-limited share links for objects in an S3 bucket"
    ),
    paths(health_check, readiness_check, create_share, revoke_share),
    components(schemas(
        CreateShareRequest,
        CreateShareResponse,
        RevokeShareRequest,
        StatusBody,
        ErrorBody
    )),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Shares", description = "Mint and revoke share links"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`].
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let observability = state.config.observability.clone();
    let request_timeout = Duration::from_secs(state.config.server.request_timeout);

    let mut router = Router::new()
        .route("/health", json_errors(get(health_check)))
        .route("/ready", json_errors(get(readiness_check)))
        .route(
            "/api/shares",
            json_errors(post(create_share).delete(revoke_share)),
        );
    if observability.metrics {
        router = router.route("/metrics", json_errors(get(metrics_handler)));
    }
    if observability.openapi {
        router = router.route("/openapi.json", json_errors(get(openapi_json)));
    }

    router
        // Everything else is treated as a share link.
        .fallback(serve_shared_object)
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn_with_state(
            request_timeout,
            request_timeout_middleware,
        ))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outermost (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

/// Answer unsupported methods on a literal route with the JSON error body.
fn json_errors(route: MethodRouter<Arc<AppState>>) -> MethodRouter<Arc<AppState>> {
    route.fallback(method_not_allowed)
}

async fn method_not_allowed() -> ShareError {
    ShareError::MethodNotAllowed
}

// -- Request timeout middleware ----------------------------------------------

/// Fails with 408 when the handler has not produced a response in time.
///
/// Only the response head is bounded; a body that is already streaming
/// keeps going.
async fn request_timeout_middleware(
    State(limit): State<Duration>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%method, %path, ?limit, "request timed out");
            ShareError::RequestTimeout.into_response()
        }
    }
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `Date`, and `Server` to every response.
async fn common_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert(header::DATE, value);
    }
    headers.insert(header::SERVER, HeaderValue::from_static("s3share"));

    response
}

// -- Health check ------------------------------------------------------------

/// `{"status": ...}` body for the health endpoints.
#[derive(Debug, Serialize, ToSchema)]
struct StatusBody {
    status: String,
}

/// `GET /health` -- liveness.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Process is up", body = StatusBody)
    )
)]
async fn health_check() -> Json<StatusBody> {
    Json(StatusBody {
        status: "healthy".to_string(),
    })
}

/// `GET /ready` -- readiness.  No dependency checks.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    operation_id = "ReadinessCheck",
    responses(
        (status = 200, description = "Ready to serve", body = StatusBody)
    )
)]
async fn readiness_check() -> Json<StatusBody> {
    Json(StatusBody {
        status: "ready".to_string(),
    })
}

/// `GET /openapi.json`
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Share API ---------------------------------------------------------------

/// Body of `POST /api/shares`.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateShareRequest {
    /// Object path relative to the bucket (and prefix).
    #[serde(default)]
    #[garde(length(max = 1024))]
    pub s3_path: String,

    /// Secret the link will carry.
    #[serde(default)]
    #[garde(length(max = 256))]
    pub secret: String,

    /// Expiry time (RFC 3339).  Defaults to now plus the configured TTL.
    #[serde(default)]
    #[garde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response of `POST /api/shares`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateShareResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry at the time of minting.
    pub max_age_seconds: i64,
}

/// Body of `DELETE /api/shares`.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct RevokeShareRequest {
    #[serde(default)]
    #[garde(length(max = 1024))]
    pub s3_path: String,
}

/// Decode a JSON body and run its `garde` rules.
fn parse_body<T>(body: &Bytes) -> Result<T, ShareError>
where
    T: serde::de::DeserializeOwned + Validate,
    T::Context: Default,
{
    let parsed: T = serde_json::from_slice(body).map_err(|e| ShareError::InvalidRequest {
        message: format!("invalid request body: {e}"),
    })?;
    parsed.validate().map_err(|e| ShareError::InvalidRequest {
        message: e.to_string(),
    })?;
    Ok(parsed)
}

fn required(field: &str, value: &str) -> Result<(), ShareError> {
    if value.is_empty() {
        return Err(ShareError::InvalidRequest {
            message: format!("{field} is required"),
        });
    }
    Ok(())
}

/// `POST /api/shares` -- mint a share link.
#[utoipa::path(
    post,
    path = "/api/shares",
    tag = "Shares",
    operation_id = "CreateShare",
    request_body = CreateShareRequest,
    responses(
        (status = 200, description = "Share created", body = CreateShareResponse),
        (status = 400, description = "Invalid path, expiry, or body", body = ErrorBody),
        (status = 404, description = "Object not found", body = ErrorBody),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
async fn create_share(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CreateShareResponse>, ShareError> {
    let req: CreateShareRequest = parse_body(&body)?;
    required("s3_path", &req.s3_path)?;
    required("secret", &req.secret)?;

    let expires_at = req.expires_at.unwrap_or_else(|| {
        state.shares.now() + TimeDelta::hours(i64::from(state.config.share.default_ttl_hours))
    });

    let share = state
        .shares
        .create_share(&ShareRequest {
            object_path: req.s3_path,
            secret: req.secret,
            expires_at,
        })
        .await?;
    counter!(SHARES_CREATED_TOTAL).increment(1);

    Ok(Json(CreateShareResponse {
        url: share.url,
        expires_at: share.expires_at,
        max_age_seconds: i64::try_from(share.max_age.as_secs()).unwrap_or(i64::MAX),
    }))
}

/// `DELETE /api/shares` -- revoke the share for a path.
#[utoipa::path(
    delete,
    path = "/api/shares",
    tag = "Shares",
    operation_id = "RevokeShare",
    request_body = RevokeShareRequest,
    responses(
        (status = 204, description = "Share revoked"),
        (status = 400, description = "Invalid path or body", body = ErrorBody),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
async fn revoke_share(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ShareError> {
    let req: RevokeShareRequest = parse_body(&body)?;
    required("s3_path", &req.s3_path)?;

    state.shares.revoke_share(&req.s3_path).await?;
    counter!(SHARES_REVOKED_TOTAL).increment(1);
    Ok(StatusCode::NO_CONTENT)
}

// -- Share links -------------------------------------------------------------

/// Router fallback: serve `/{yy}/{mm}/{dd}/{secret}/{path...}`.
async fn serve_shared_object(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> Response {
    let path = uri.path();
    if path == "/api" || path.starts_with("/api/") {
        return ShareError::NotFound {
            path: path.to_string(),
        }
        .into_response();
    }

    let result = shared_object_response(&state, &method, path).await;
    record_share_request(match &result {
        Ok(_) => "served",
        Err(e) => e.code(),
    });
    result.into_response()
}

async fn shared_object_response(
    state: &AppState,
    method: &Method,
    path: &str,
) -> Result<Response, ShareError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ShareError::MethodNotAllowed);
    }

    let link = link::parse_path(path).map_err(|e| match e {
        LinkError::TooFewSegments => ShareError::NotFound {
            path: path.to_string(),
        },
        LinkError::InvalidDate(date) => {
            debug!(date = %date, "unparsable link date");
            ShareError::InvalidRequest {
                message: "invalid date format".to_string(),
            }
        }
        LinkError::InvalidEncoding => ShareError::InvalidRequest {
            message: "invalid link encoding".to_string(),
        },
    })?;

    // Expiry comes from the date in the URL, not the cache TTL.
    if link.is_expired_at(state.shares.now()) {
        debug!(path = %link.object_path, expires_at = %link.expires_at, "link expired");
        return Err(ShareError::Expired);
    }

    state
        .shares
        .validate_share(&link.object_path, &link.secret)
        .await?;

    if method == Method::HEAD {
        let meta = state.shares.object_metadata(&link.object_path).await?;
        return object_response(&meta.content_type, meta.size, Body::empty());
    }

    let reader = state.shares.get_object(&link.object_path).await?;
    let content_type = reader.content_type().to_string();
    let size = reader.size();
    let object_path = link.object_path;
    let stream = reader.into_stream().inspect_err(move |e| {
        warn!(path = %object_path, error = %e, "object stream failed mid-response");
    });
    object_response(&content_type, size, Body::from_stream(stream))
}

/// `Content-Length` is only sent when the store reported a size.
fn object_response(
    content_type: &str,
    size: Option<u64>,
    body: Body,
) -> Result<Response, ShareError> {
    let content_type = HeaderValue::from_str(content_type).unwrap_or_else(|_| {
        HeaderValue::from_static(crate::storage::backend::DEFAULT_CONTENT_TYPE)
    });
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, SHARED_OBJECT_CACHE_CONTROL);
    if let Some(size) = size {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }
    builder
        .body(body)
        .map_err(|e| ShareError::ObjectFetchFailed(e.into()))
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemorySecretCache;
    use crate::clock::FixedClock;
    use crate::config::Config;
    use crate::share::{ShareConfig, ShareService};
    use crate::storage::backend::{ObjectMetadata, ObjectReader, ObjectStore, StorageResult};
    use crate::storage::memory::MemoryObjectStore;
    use axum::http::HeaderMap;
    use chrono::TimeZone;
    use futures::stream::{self, StreamExt};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::future::Future;
    use std::pin::Pin;
    use tower::ServiceExt;

    const BASE: &str = "https://share.example.com";
    const PHOTO: &[u8] = b"\xff\xd8\xff\xe0 fake jpeg";

    struct TestApp {
        router: Router,
        clock: Arc<FixedClock>,
        store: Arc<MemoryObjectStore>,
    }

    /// Backend misbehaviour layered over the in-memory store.
    #[derive(Clone, Copy)]
    enum Quirk {
        /// Sizes are not reported.
        UnknownSize,
        /// The body fails after its first chunk.
        FailsMidBody,
        /// `head_object` never answers.
        Stalls,
    }

    struct QuirkyStore {
        inner: Arc<MemoryObjectStore>,
        quirk: Quirk,
    }

    impl ObjectStore for QuirkyStore {
        fn head_object(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectMetadata>> + Send + '_>> {
            let key = key.to_string();
            Box::pin(async move {
                if let Quirk::Stalls = self.quirk {
                    std::future::pending::<()>().await;
                }
                let mut meta = self.inner.head_object(&key).await?;
                if let Quirk::UnknownSize = self.quirk {
                    meta.size = None;
                }
                Ok(meta)
            })
        }

        fn get_object(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = StorageResult<ObjectReader>> + Send + '_>> {
            let key = key.to_string();
            Box::pin(async move {
                let reader = self.inner.get_object(&key).await?;
                let content_type = reader.content_type().to_string();
                let size = reader.size();
                Ok(match self.quirk {
                    Quirk::UnknownSize => {
                        ObjectReader::new(content_type, None, reader.into_stream())
                    }
                    Quirk::FailsMidBody => {
                        let failure = stream::once(async {
                            Err(std::io::Error::other("connection reset by peer"))
                        });
                        let body = reader.into_stream().take(1).chain(failure).boxed();
                        ObjectReader::new(content_type, size, body)
                    }
                    Quirk::Stalls => reader,
                })
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 13, 10, 0, 0).unwrap()
    }

    async fn test_app() -> TestApp {
        test_app_with(None).await
    }

    async fn test_app_with(quirk: Option<Quirk>) -> TestApp {
        let clock = Arc::new(FixedClock::new(now()));
        let store = Arc::new(MemoryObjectStore::new());
        store
            .insert("images/photo.jpg", "image/jpeg", Bytes::from_static(PHOTO))
            .await;
        let backend: Arc<dyn ObjectStore> = match quirk {
            Some(quirk) => Arc::new(QuirkyStore {
                inner: store.clone(),
                quirk,
            }),
            None => store.clone(),
        };
        let cache = Arc::new(MemorySecretCache::new(clock.clone()));

        let mut config = Config::default();
        config.server.base_url = BASE.to_string();
        config.storage.backend = "memory".to_string();
        config.cache.backend = "memory".to_string();

        let shares = ShareService::new(
            backend,
            cache,
            clock.clone(),
            ShareConfig::from_config(&config),
        );
        let state = Arc::new(AppState { config, shares });
        TestApp {
            router: app(state),
            clock,
            store,
        }
    }

    async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn as_json(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    async fn mint(app: &TestApp, path: &str, secret: &str, expires_at: DateTime<Utc>) -> String {
        let (status, _, body) = send(
            app,
            json_req(
                Method::POST,
                "/api/shares",
                json!({"s3_path": path, "secret": secret, "expires_at": expires_at}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body:?}");
        let url = as_json(&body)["url"].as_str().unwrap().to_string();
        url.strip_prefix(BASE).unwrap().to_string()
    }

    // -- Health ---------------------------------------------------------------

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = test_app().await;
        let (status, _, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({"status": "healthy"}));

        let (status, _, body) = send(&app, get_req("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({"status": "ready"}));
    }

    #[tokio::test]
    async fn test_common_headers() {
        let app = test_app().await;
        let (_, headers, _) = send(&app, get_req("/health")).await;
        assert_eq!(headers.get("x-request-id").unwrap().len(), 16);
        assert_eq!(headers.get("server").unwrap(), "s3share");
        assert!(headers.contains_key("date"));
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = test_app().await;
        let (status, _, body) = send(&app, get_req("/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        let doc = as_json(&body);
        assert!(doc["paths"]["/api/shares"]["post"].is_object());
        assert!(doc["paths"]["/api/shares"]["delete"].is_object());
        assert!(doc["paths"]["/health"]["get"].is_object());
    }

    // -- End to end -----------------------------------------------------------

    #[tokio::test]
    async fn test_share_lifecycle() {
        let app = test_app().await;
        let expires_at = now() + TimeDelta::hours(24);

        let (status, _, body) = send(
            &app,
            json_req(
                Method::POST,
                "/api/shares",
                json!({"s3_path": "images/photo.jpg", "secret": "abc123", "expires_at": expires_at}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let created = as_json(&body);
        assert_eq!(
            created["url"],
            "https://share.example.com/25/09/14/abc123/images/photo.jpg"
        );
        assert_eq!(created["expires_at"], "2025-09-14T10:00:00Z");
        assert_eq!(created["max_age_seconds"], 86400);

        // Fresh link serves the bytes.
        let (status, headers, body) =
            send(&app, get_req("/25/09/14/abc123/images/photo.jpg")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], PHOTO);
        assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
        assert_eq!(
            headers.get("content-length").unwrap(),
            &PHOTO.len().to_string()
        );
        assert_eq!(
            headers.get("cache-control").unwrap(),
            "public, max-age=3600"
        );

        // Tampered secret.
        let (status, _, body) = send(&app, get_req("/25/09/14/abc124/images/photo.jpg")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            as_json(&body),
            json!({"error": "unauthorized", "code": 401, "message": "unauthorized"})
        );

        // After the window.
        app.clock.advance(TimeDelta::hours(25));
        let (status, _, body) = send(&app, get_req("/25/09/14/abc123/images/photo.jpg")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(as_json(&body)["error"], "expired");

        assert_eq!(app.store.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_expiry_uses_url_date() {
        let app = test_app().await;
        let path = mint(&app, "images/photo.jpg", "s", now() + TimeDelta::days(2)).await;
        assert!(path.starts_with("/25/09/15/"));

        // Still valid at midnight of the embedded date.
        app.clock
            .set(Utc.with_ymd_and_hms(2025, 9, 15, 0, 0, 0).unwrap());
        let (status, _, _) = send(&app, get_req(&path)).await;
        assert_eq!(status, StatusCode::OK);

        // One second later the URL date has passed even though the cache
        // entry is still live.
        app.clock.advance(TimeDelta::seconds(1));
        let (status, _, _) = send(&app, get_req(&path)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_expired_link_is_forbidden_before_secret_check() {
        let app = test_app().await;
        let (status, _, _) = send(&app, get_req("/25/09/12/wrong/images/photo.jpg")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_overwritten_share_rejects_old_secret() {
        let app = test_app().await;
        let expires_at = now() + TimeDelta::hours(24);
        let old = mint(&app, "images/photo.jpg", "s1", expires_at).await;
        let new = mint(&app, "images/photo.jpg", "s2", expires_at).await;

        let (status, _, _) = send(&app, get_req(&old)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = send(&app, get_req(&new)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_head_link() {
        let app = test_app().await;
        let path = mint(&app, "images/photo.jpg", "s", now() + TimeDelta::days(1)).await;
        let req = Request::builder()
            .method(Method::HEAD)
            .uri(&path)
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(
            headers.get("content-length").unwrap(),
            &PHOTO.len().to_string()
        );
        assert_eq!(app.store.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_link_to_removed_object_is_not_found() {
        let app = test_app().await;
        let path = mint(&app, "images/photo.jpg", "s", now() + TimeDelta::days(1)).await;
        app.store.remove("images/photo.jpg").await;
        let (status, _, body) = send(&app, get_req(&path)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(as_json(&body)["code"], 404);
    }

    #[tokio::test]
    async fn test_escaped_secret_and_path() {
        let app = test_app().await;
        app.store
            .insert("my photos/cat?.jpg", "image/jpeg", Bytes::from_static(b"cat"))
            .await;
        let path = mint(&app, "my photos/cat?.jpg", "a b#c", now() + TimeDelta::days(1)).await;
        assert_eq!(path, "/25/09/14/a%20b%23c/my%20photos/cat%3F.jpg");
        let (status, _, body) = send(&app, get_req(&path)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"cat");
    }

    // -- Link errors ----------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_routes_are_not_found() {
        let app = test_app().await;
        for uri in ["/no/such/route", "/", "/favicon.ico", "/api/v1/shares/x/y", "/api"] {
            let (status, _, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(as_json(&body)["error"], "not_found");
        }
    }

    #[tokio::test]
    async fn test_bad_link_date_is_bad_request() {
        let app = test_app().await;
        for uri in ["/24/13/01/s/a.jpg", "/2025/09/13/s/a.jpg", "/aa/bb/cc/s/a.jpg"] {
            let (status, _, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(as_json(&body)["message"], "invalid date format");
        }
    }

    #[tokio::test]
    async fn test_link_with_traversal_is_bad_request() {
        let app = test_app().await;
        let (status, _, body) = send(&app, get_req("/25/09/14/s/images/%2E%2E/secret.txt")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(as_json(&body)["error"], "invalid_path");
    }

    #[tokio::test]
    async fn test_link_methods() {
        let app = test_app().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/25/09/14/s/images/photo.jpg")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(as_json(&body)["error"], "method_not_allowed");
    }

    #[tokio::test]
    async fn test_wrong_method_on_api_route_is_json() {
        let app = test_app().await;
        let (status, headers, body) = send(&app, get_req("/api/shares")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(
            as_json(&body),
            json!({"error": "method_not_allowed", "code": 405, "message": "method not allowed"})
        );

        let (status, _, body) =
            send(&app, json_req(Method::PUT, "/health", json!({}))).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(as_json(&body)["code"], 405);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_request_times_out_with_json_body() {
        let app = test_app_with(Some(Quirk::Stalls)).await;
        let (status, headers, body) = send(
            &app,
            json_req(
                Method::POST,
                "/api/shares",
                json!({"s3_path": "images/photo.jpg", "secret": "s"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            as_json(&body),
            json!({"error": "request_timeout", "code": 408, "message": "request timed out"})
        );
        assert!(headers.contains_key("x-request-id"));
    }

    // -- CreateShare errors ---------------------------------------------------

    #[tokio::test]
    async fn test_create_share_default_expiry() {
        let app = test_app().await;
        let (status, _, body) = send(
            &app,
            json_req(
                Method::POST,
                "/api/shares",
                json!({"s3_path": "images/photo.jpg", "secret": "abc123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let created = as_json(&body);
        assert_eq!(created["expires_at"], "2025-09-14T10:00:00Z");
        assert_eq!(created["max_age_seconds"], 86400);
    }

    #[tokio::test]
    async fn test_create_share_required_fields() {
        let app = test_app().await;
        let cases = [
            (json!({"secret": "s"}), "s3_path is required"),
            (json!({"s3_path": "images/photo.jpg"}), "secret is required"),
            (json!({"s3_path": "", "secret": "s"}), "s3_path is required"),
        ];
        for (body, message) in cases {
            let (status, _, resp) = send(&app, json_req(Method::POST, "/api/shares", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let resp = as_json(&resp);
            assert_eq!(resp["error"], "invalid_request");
            assert_eq!(resp["message"], message);
        }
    }

    #[tokio::test]
    async fn test_create_share_malformed_body() {
        let app = test_app().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/shares")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(as_json(&body)["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_create_share_oversized_secret() {
        let app = test_app().await;
        let (status, _, _) = send(
            &app,
            json_req(
                Method::POST,
                "/api/shares",
                json!({"s3_path": "images/photo.jpg", "secret": "x".repeat(257)}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_share_rejections() {
        let app = test_app().await;
        let cases = [
            (
                json!({"s3_path": "../etc/passwd", "secret": "s"}),
                StatusCode::BAD_REQUEST,
                "invalid_path",
            ),
            (
                json!({"s3_path": "images/missing.jpg", "secret": "s"}),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                json!({"s3_path": "images/photo.jpg", "secret": "s", "expires_at": now() - TimeDelta::hours(1)}),
                StatusCode::BAD_REQUEST,
                "invalid_expiry",
            ),
            (
                json!({"s3_path": "images/photo.jpg", "secret": "s", "expires_at": now() + TimeDelta::days(365)}),
                StatusCode::BAD_REQUEST,
                "invalid_expiry",
            ),
        ];
        for (body, expected_status, expected_code) in cases {
            let (status, _, resp) = send(&app, json_req(Method::POST, "/api/shares", body)).await;
            assert_eq!(status, expected_status);
            assert_eq!(as_json(&resp)["error"], expected_code);
        }
    }

    // -- RevokeShare ----------------------------------------------------------

    #[tokio::test]
    async fn test_revoke_share() {
        let app = test_app().await;
        let path = mint(&app, "images/photo.jpg", "s", now() + TimeDelta::days(1)).await;

        let (status, _, body) = send(
            &app,
            json_req(
                Method::DELETE,
                "/api/shares",
                json!({"s3_path": "images/photo.jpg"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, _, _) = send(&app, get_req(&path)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_revoke_share_requires_path() {
        let app = test_app().await;
        let (status, _, body) =
            send(&app, json_req(Method::DELETE, "/api/shares", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(as_json(&body)["message"], "s3_path is required");
    }

    #[tokio::test]
    async fn test_create_share_rejects_dot_segment_secret() {
        let app = test_app().await;
        for secret in [".", ".."] {
            let (status, _, body) = send(
                &app,
                json_req(
                    Method::POST,
                    "/api/shares",
                    json!({
                        "s3_path": "images/photo.jpg",
                        "secret": secret,
                        "expires_at": now() + TimeDelta::days(1),
                    }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{secret}");
            assert_eq!(as_json(&body)["error"], "invalid_request");
        }
    }

    #[tokio::test]
    async fn test_unknown_size_omits_content_length() {
        let app = test_app_with(Some(Quirk::UnknownSize)).await;
        let path = mint(&app, "images/photo.jpg", "s", now() + TimeDelta::days(1)).await;

        let (status, headers, body) = send(&app, get_req(&path)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(&body[..], PHOTO);

        let head = Request::builder()
            .method(Method::HEAD)
            .uri(&path)
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, head).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn test_reader_released_when_body_dropped_mid_stream() {
        let app = test_app().await;
        let clip = Bytes::from(vec![7u8; 300 * 1024]);
        app.store.insert("videos/clip.mp4", "video/mp4", clip).await;
        let path = mint(&app, "videos/clip.mp4", "s", now() + TimeDelta::days(1)).await;

        let resp = app.router.clone().oneshot(get_req(&path)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let mut body = resp.into_body();
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(first.len(), 64 * 1024);
        assert_eq!(app.store.open_readers(), 1);

        drop(body);
        assert_eq!(app.store.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_reader_released_when_body_fails_mid_stream() {
        let app = test_app_with(Some(Quirk::FailsMidBody)).await;
        let clip = Bytes::from(vec![7u8; 300 * 1024]);
        app.store.insert("videos/clip.mp4", "video/mp4", clip).await;
        let path = mint(&app, "videos/clip.mp4", "s", now() + TimeDelta::days(1)).await;

        let resp = app.router.clone().oneshot(get_req(&path)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_LENGTH).unwrap(), "307200");
        assert!(resp.into_body().collect().await.is_err());
        assert_eq!(app.store.open_readers(), 0);
    }

    #[tokio::test]
    async fn test_readers_released_on_every_path() {
        let app = test_app().await;
        let path = mint(&app, "images/photo.jpg", "s", now() + TimeDelta::days(1)).await;
        send(&app, get_req(&path)).await;
        send(&app, get_req("/25/09/14/wrong/images/photo.jpg")).await;
        send(&app, get_req("/25/09/12/s/images/photo.jpg")).await;
        assert_eq!(app.store.open_readers(), 0);
    }
}
