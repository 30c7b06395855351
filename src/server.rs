//! HTTP boundary.
//!
//! A thin axum layer in front of the [`Pipeline`]: it parses the multipart
//! form, turns it into a [`ResizeRequest`], runs the pipeline on tokio's
//! blocking pool under a wall-time bound, and maps errors to statuses.
//!
//! ## Routes
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /upload` | multipart form: `image` file part, optional `width` / `height` |
//! | `GET /health` | liveness check, always `200 ok` |
//!
//! ## Status codes
//!
//! | Outcome | Status |
//! |---|---|
//! | stored (or already stored) | 201 `{"path": "media/<fingerprint>.<ext>"}` |
//! | malformed form, bad dimensions | 400 |
//! | body, source size, frame count or animation pixel budget over the limit | 413 |
//! | media type other than JPEG / PNG / GIF | 415 |
//! | bytes do not decode as the declared format | 422 |
//! | encode or storage failure | 500 |
//! | resize exceeded `server.request_timeout_secs` | 504 |
//!
//! Errors are returned as `{"error": "..."}`.

use crate::config::ServiceConfig;
use crate::imaging::ImageBackend;
use crate::pipeline::{Pipeline, PipelineError, Resolved};
use crate::types::{DeclaredFormat, ResizeRequest, UploadResponse};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Name of the multipart file part.
const IMAGE_FIELD: &str = "image";

/// Source name used when the file part carries no filename.
const FALLBACK_SOURCE_NAME: &str = "upload";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("resize timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Pipeline(err) => match err {
                PipelineError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                PipelineError::InvalidDimensions(_) => StatusCode::BAD_REQUEST,
                PipelineError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                PipelineError::Encode(_) | PipelineError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn from_multipart(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Width and height used when the form omits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadDefaults {
    pub width: u32,
    pub height: u32,
}

/// The file part of an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Raw multipart fields, before validation.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub image: Option<UploadedFile>,
    pub width: Option<String>,
    pub height: Option<String>,
}

impl UploadForm {
    /// Drain a multipart stream. Unknown fields are skipped.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(ApiError::from_multipart)?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                IMAGE_FIELD => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
                    form.image = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                "width" => form.width = Some(field.text().await.map_err(ApiError::from_multipart)?),
                "height" => {
                    form.height = Some(field.text().await.map_err(ApiError::from_multipart)?)
                }
                _ => {}
            }
        }
        Ok(form)
    }

    /// Validate the form and build the pipeline request.
    ///
    /// The declared format comes from the part's `Content-Type`; when the
    /// client sent none, the filename extension decides.
    pub fn into_request(self, defaults: UploadDefaults) -> Result<ResizeRequest, ApiError> {
        let image = self
            .image
            .ok_or_else(|| ApiError::BadRequest(format!("missing '{IMAGE_FIELD}' file part")))?;
        if image.bytes.is_empty() {
            return Err(ApiError::BadRequest("uploaded image is empty".into()));
        }

        let source_name = image
            .file_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_SOURCE_NAME.to_string());

        let format = match image.content_type.as_deref() {
            Some(media_type) => DeclaredFormat::from_media_type(media_type),
            None => DeclaredFormat::from_path(Path::new(&source_name)),
        }
        .map_err(PipelineError::from)?;

        Ok(ResizeRequest {
            source_name,
            width: parse_dimension("width", self.width.as_deref(), defaults.width)?,
            height: parse_dimension("height", self.height.as_deref(), defaults.height)?,
            format,
            content: image.bytes,
        })
    }
}

/// Parse an optional decimal form field; absent or blank means `default`.
fn parse_dimension(field: &str, raw: Option<&str>, default: u32) -> Result<u32, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| {
            ApiError::BadRequest(format!(
                "{field} must be a non-negative integer, got '{value}'"
            ))
        }),
    }
}

/// Shared state handed to every handler.
pub struct AppState<B: ImageBackend> {
    pipeline: Arc<Pipeline<B>>,
    defaults: UploadDefaults,
    timeout: Duration,
    max_upload_bytes: usize,
}

impl<B: ImageBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            defaults: self.defaults,
            timeout: self.timeout,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl<B: ImageBackend> AppState<B> {
    pub fn new(pipeline: Pipeline<B>, config: &ServiceConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            defaults: UploadDefaults {
                width: config.images.default_width,
                height: config.images.default_height,
            },
            timeout: config.server.request_timeout(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }

    pub fn pipeline(&self) -> &Pipeline<B> {
        &self.pipeline
    }
}

/// Build the application router.
pub fn router<B>(state: AppState<B>) -> Router
where
    B: ImageBackend + Send + 'static,
{
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload::<B>))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn upload<B>(
    State(state): State<AppState<B>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError>
where
    B: ImageBackend + Send + 'static,
{
    let form = UploadForm::read(multipart).await?;
    let request = form.into_request(state.defaults)?;
    let resolved = run_pipeline(&state, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path: resolved.path,
        }),
    ))
}

/// Run one request on the blocking pool, bounded by the request timeout.
///
/// A timed-out resize keeps running in the background; its output only
/// becomes visible through the store's atomic rename.
pub async fn run_pipeline<B>(
    state: &AppState<B>,
    request: ResizeRequest,
) -> Result<Resolved, ApiError>
where
    B: ImageBackend + Send + 'static,
{
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || pipeline.handle(&request));

    match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(join_err)) => Err(ApiError::Internal(join_err.to_string())),
        Err(_) => Err(ApiError::Timeout(state.timeout)),
    }
}

/// Bind and serve until Ctrl-C.
pub async fn serve<B>(state: AppState<B>, bind: &str) -> std::io::Result<()>
where
    B: ImageBackend + Send + 'static,
{
    let listener = TcpListener::bind(bind).await?;
    info!(
        addr = %listener.local_addr()?,
        storage = %state.pipeline.store().root().display(),
        "listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MediaStore;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{AnimatedParams, BackendError, StaticParams};
    use crate::pipeline::PipelineSettings;
    use axum::body::Body;
    use axum::http::{Request, header};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const DEFAULTS: UploadDefaults = UploadDefaults {
        width: 100,
        height: 0,
    };

    fn form(file_name: Option<&str>, content_type: Option<&str>) -> UploadForm {
        UploadForm {
            image: Some(UploadedFile {
                file_name: file_name.map(str::to_string),
                content_type: content_type.map(str::to_string),
                bytes: b"bytes".to_vec(),
            }),
            width: None,
            height: None,
        }
    }

    fn state<B: ImageBackend>(tmp: &TempDir, backend: B, timeout: Duration) -> AppState<B> {
        let store = MediaStore::open(tmp.path().join("media")).unwrap();
        let pipeline = Pipeline::new(store, backend, PipelineSettings::default());
        let mut state = AppState::new(pipeline, &ServiceConfig::default());
        state.timeout = timeout;
        state
    }

    fn request(name: &str) -> ResizeRequest {
        ResizeRequest {
            source_name: name.to_string(),
            width: 100,
            height: 0,
            format: DeclaredFormat::Jpeg,
            content: b"bytes".to_vec(),
        }
    }

    // =========================================================================
    // Form parsing
    // =========================================================================

    #[test]
    fn form_defaults_dimensions() {
        let req = form(Some("cat.jpg"), Some("image/jpeg"))
            .into_request(DEFAULTS)
            .unwrap();
        assert_eq!(req.source_name, "cat.jpg");
        assert_eq!((req.width, req.height), (100, 0));
        assert_eq!(req.format, DeclaredFormat::Jpeg);
        assert_eq!(req.content, b"bytes");
    }

    #[test]
    fn form_parses_explicit_dimensions() {
        let mut f = form(Some("cat.png"), Some("image/png"));
        f.width = Some(" 320 ".into());
        f.height = Some("240".into());
        let req = f.into_request(DEFAULTS).unwrap();
        assert_eq!((req.width, req.height), (320, 240));
    }

    #[test]
    fn blank_dimension_uses_default() {
        let mut f = form(Some("cat.png"), Some("image/png"));
        f.width = Some("".into());
        let req = f.into_request(DEFAULTS).unwrap();
        assert_eq!(req.width, 100);
    }

    #[test]
    fn negative_dimension_is_bad_request() {
        let mut f = form(Some("cat.png"), Some("image/png"));
        f.height = Some("-5".into());
        let err = f.into_request(DEFAULTS).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn missing_image_is_bad_request() {
        let err = UploadForm::default().into_request(DEFAULTS).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_image_is_bad_request() {
        let mut f = form(Some("cat.png"), Some("image/png"));
        if let Some(image) = f.image.as_mut() {
            image.bytes.clear();
        }
        let err = f.into_request(DEFAULTS).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_media_type_is_415() {
        let err = form(Some("cat.webp"), Some("image/webp"))
            .into_request(DEFAULTS)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn missing_content_type_falls_back_to_extension() {
        let req = form(Some("spin.GIF"), None)
            .into_request(DEFAULTS)
            .unwrap();
        assert_eq!(req.format, DeclaredFormat::Gif);

        let err = form(None, None).into_request(DEFAULTS).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn declared_type_wins_over_extension() {
        let req = form(Some("cat.gif"), Some("image/png"))
            .into_request(DEFAULTS)
            .unwrap();
        assert_eq!(req.format, DeclaredFormat::Png);
    }

    #[test]
    fn missing_file_name_uses_fallback() {
        let req = form(None, Some("image/jpeg"))
            .into_request(DEFAULTS)
            .unwrap();
        assert_eq!(req.source_name, FALLBACK_SOURCE_NAME);
    }

    // =========================================================================
    // Status mapping
    // =========================================================================

    #[test]
    fn pipeline_errors_map_to_statuses() {
        let cases = [
            (
                PipelineError::InvalidDimensions("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (PipelineError::Decode("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PipelineError::TooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (
                PipelineError::Encode("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn timeout_response_is_504() {
        let response = ApiError::Timeout(Duration::from_secs(30)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn error_response_has_json_body() {
        let response = ApiError::from(PipelineError::Decode("bad bytes".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Decode failed: bad bytes");
    }

    #[test]
    fn upload_response_serializes_path() {
        let json = serde_json::to_string(&UploadResponse {
            path: "media/abc.jpg".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"path":"media/abc.jpg"}"#);
    }

    // =========================================================================
    // Pipeline execution
    // =========================================================================

    #[tokio::test]
    async fn run_pipeline_returns_stored_path() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, MockBackend::new(), Duration::from_secs(5));

        let resolved = run_pipeline(&state, request("cat.jpg")).await.unwrap();

        assert!(resolved.path.starts_with("media/"));
        assert!(resolved.file.is_file());
        assert_eq!(state.pipeline().store().stats().misses(), 1);
    }

    #[tokio::test]
    async fn run_pipeline_surfaces_decode_errors() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, MockBackend::failing_decode("nope"), Duration::from_secs(5));

        let err = run_pipeline(&state, request("cat.jpg")).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    struct SlowBackend;

    impl ImageBackend for SlowBackend {
        fn resize_static(&self, _: &[u8], _: &StaticParams) -> Result<Vec<u8>, BackendError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(b"late".to_vec())
        }

        fn resize_animated(&self, _: &[u8], _: &AnimatedParams) -> Result<Vec<u8>, BackendError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(b"late".to_vec())
        }
    }

    #[tokio::test]
    async fn run_pipeline_times_out() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, SlowBackend, Duration::from_millis(20));

        let err = run_pipeline(&state, request("cat.jpg")).await.unwrap_err();

        assert!(matches!(err, ApiError::Timeout(_)));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    // =========================================================================
    // Routes
    // =========================================================================

    const BOUNDARY: &str = "resizer-test-boundary";

    /// One multipart part: `(field name, file name, content type, data)`.
    type Part<'a> = (&'a str, Option<&'a str>, Option<&'a str>, &'a [u8]);

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, content_type, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{name}\"");
            if let Some(file_name) = file_name {
                disposition.push_str(&format!("; filename=\"{file_name}\""));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            if let Some(content_type) = content_type {
                body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn upload_route_returns_created_path() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, MockBackend::new(), Duration::from_secs(5));
        let app = router(state.clone());

        let (status, json) = send(
            app,
            upload_request(&[
                ("image", Some("cat.jpg"), Some("image/jpeg"), b"jpeg bytes"),
                ("width", None, None, b"50"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let path = json["path"].as_str().unwrap();
        assert!(path.starts_with("media/") && path.ends_with(".jpg"), "{path}");
        assert_eq!(state.pipeline().store().stats().misses(), 1);
    }

    #[tokio::test]
    async fn upload_route_rejects_unsupported_media_type() {
        let tmp = TempDir::new().unwrap();
        let app = router(state(&tmp, MockBackend::new(), Duration::from_secs(5)));

        let (status, json) = send(
            app,
            upload_request(&[("image", Some("cat.webp"), Some("image/webp"), b"webp bytes")]),
        )
        .await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(json["error"].as_str().unwrap().contains("image/webp"));
    }

    #[tokio::test]
    async fn upload_route_enforces_body_limit() {
        let tmp = TempDir::new().unwrap();
        let mut state = state(&tmp, MockBackend::new(), Duration::from_secs(5));
        state.max_upload_bytes = 256;
        let app = router(state.clone());

        let big = vec![0xAB; 4096];
        let (status, json) = send(
            app,
            upload_request(&[("image", Some("cat.png"), Some("image/png"), &big)]),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json["error"].is_string());
        assert_eq!(state.pipeline().store().stats().misses(), 0);
    }

    #[tokio::test]
    async fn upload_route_requires_image_part() {
        let tmp = TempDir::new().unwrap();
        let app = router(state(&tmp, MockBackend::new(), Duration::from_secs(5)));

        let (status, json) = send(app, upload_request(&[("width", None, None, b"50")])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("image"));
    }

    #[tokio::test]
    async fn health_route_answers_ok() {
        let tmp = TempDir::new().unwrap();
        let app = router(state(&tmp, MockBackend::new(), Duration::from_secs(1)));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ok");
    }
}
