//! HTTP surface: routing, request validation, and error-to-status mapping.

use crate::app::App;
use crate::models::{
    parse_attachments, Config, ErrorBody, GenerationRequest, ImageResponse,
};
use crate::{Error, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Upper bound on request bodies, attachments included.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_METHODS: &str = "GET,OPTIONS,PATCH,DELETE,POST,PUT";
pub const ALLOWED_HEADERS: &str = "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, Content-Length, Content-MD5, Content-Type, Date, X-Api-Version";

const CONFIG_ERROR_MESSAGE: &str =
    "API key configuration error. Please set GEMINI_API_KEY in the server environment.";

#[derive(Clone)]
pub struct AppState {
    app: Option<Arc<App>>,
    expose_error_details: bool,
}

impl AppState {
    /// `app` is `None` when no credential is configured; generation requests
    /// then answer with a configuration error.
    pub fn new(app: Option<App>, expose_error_details: bool) -> Self {
        Self {
            app: app.map(Arc::new),
            expose_error_details,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let app = match App::from_config(config) {
            Ok(app) => Some(app),
            Err(e) => {
                warn!("{}; generation requests will fail until it is set", e);
                None
            }
        };
        Self::new(app, !config.production)
    }

    fn app(&self) -> Result<&App> {
        self.app.as_deref().ok_or_else(|| {
            error!("GEMINI_API_KEY is not set in environment variables");
            Error::Config("GEMINI_API_KEY is not set".to_string())
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/generate-images", generation_route(post(generate_images_handler)))
        .route("/generate-prompts", generation_route(post(generate_prompts_handler)));

    Router::new()
        .route("/health", get(health_handler))
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn generation_route(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route
        .options(preflight_handler)
        .fallback(method_not_allowed_handler)
}

fn cors_layer() -> CorsLayer {
    let headers: Vec<HeaderName> = ALLOWED_HEADERS
        .split(',')
        .filter_map(|name| HeaderName::try_from(name.trim().to_ascii_lowercase()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::OPTIONS,
            Method::PATCH,
            Method::DELETE,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers(headers)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "configured": state.app.is_some(),
    }))
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed_handler(method: Method) -> Response {
    warn!("Rejected {} request", method);
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody::new("Method not allowed")),
    )
        .into_response()
}

async fn generate_images_handler(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let span = info_span!("generate_images", request_id = %Uuid::new_v4());

    async move {
        info!("Image generation API called");
        let bytes = match body {
            Ok(bytes) => bytes,
            Err(rejection) => return body_rejection_response(rejection),
        };

        match generate_images(&state, &bytes).await {
            Ok(image) => {
                info!("Image generation succeeded ({:?})", image.kind);
                (StatusCode::OK, Json(image)).into_response()
            }
            Err(e) => ApiError::new(Operation::GenerateImages, e, state.expose_error_details)
                .into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn generate_images(state: &AppState, bytes: &[u8]) -> Result<ImageResponse> {
    let body = parse_json_body(bytes)?;
    let request = GenerationRequest::from_json(&body)?;
    let app = state.app()?;
    let generated = app.generate_image(&request).await?;
    Ok(generated.into())
}

async fn generate_prompts_handler(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let span = info_span!("generate_prompts", request_id = %Uuid::new_v4());

    async move {
        info!("Prompt suggestion API called");
        let bytes = match body {
            Ok(bytes) => bytes,
            Err(rejection) => return body_rejection_response(rejection),
        };
        info!("Request body size: {} bytes", bytes.len());

        match generate_prompts(&state, &bytes).await {
            Ok(suggestions) => (StatusCode::OK, Json(suggestions)).into_response(),
            Err(e) => ApiError::new(Operation::GeneratePrompts, e, state.expose_error_details)
                .into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn generate_prompts(state: &AppState, bytes: &[u8]) -> Result<Vec<String>> {
    let body = parse_json_body(bytes)?;
    let attachments = parse_attachments(&body)?;
    info!("Number of files: {}", attachments.len());
    let app = state.app()?;
    app.suggest_prompts(&attachments).await
}

fn parse_json_body(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| {
        warn!("Request body is not valid JSON: {}", e);
        Error::Validation("Invalid JSON body".to_string())
    })
}

fn body_rejection_response(rejection: BytesRejection) -> Response {
    let status = rejection.status();
    warn!("Rejected request body ({}): {}", status, rejection.body_text());

    let body = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorBody::new("Request body too large")
    } else {
        ErrorBody::new("Failed to read request body").with_details(rejection.body_text())
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GenerateImages,
    GeneratePrompts,
}

impl Operation {
    fn failure_label(&self) -> &'static str {
        match self {
            Operation::GenerateImages => "Failed to generate image",
            Operation::GeneratePrompts => "Failed to generate prompts",
        }
    }
}

/// Maps a pipeline [`Error`] onto the status and JSON body the caller sees.
#[derive(Debug)]
pub struct ApiError {
    operation: Operation,
    error: Error,
    expose_details: bool,
}

impl ApiError {
    pub fn new(operation: Operation, error: Error, expose_details: bool) -> Self {
        Self {
            operation,
            error,
            expose_details,
        }
    }

    pub fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        let label = self.operation.failure_label();

        match &self.error {
            Error::Validation(message) => (StatusCode::BAD_REQUEST, ErrorBody::new(message.clone())),
            Error::InvalidFile { index, reason } => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("Invalid file entry").with_details(format!("files[{}] {}", index, reason)),
            ),
            Error::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(CONFIG_ERROR_MESSAGE),
            ),
            Error::Upstream { status: 429, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody::new("Rate limit exceeded").with_details(
                    "The model API rate limit was reached. Wait a moment and try again.",
                ),
            ),
            Error::Upstream { status, body }
                if *status == 401 || *status == 403 || body.contains("API key") =>
            {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("API key error")
                        .with_details("Check that GEMINI_API_KEY is set to a valid key"),
                )
            }
            Error::Upstream { status, .. } if (500..600).contains(status) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(label).with_details(
                    "The model service is temporarily unavailable. Try again shortly.",
                ),
            ),
            Error::Upstream { status: 400, body } if body.to_ascii_lowercase().contains("modalit") => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(label)
                    .with_details("The configured model does not support the requested output modality"),
            ),
            Error::ModalityMismatch | Error::EmptyResponse(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(label).with_details(self.error.to_string()),
            ),
            Error::InvalidResponseFormat(detail) => {
                let body = ErrorBody::new("Invalid response format from AI");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    if self.expose_details {
                        body.with_details(detail.clone())
                    } else {
                        body
                    },
                )
            }
            Error::InvalidSuggestions => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("AI did not return valid suggestions"),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(label).with_details(if self.expose_details {
                    other.to_string()
                } else {
                    "Unexpected error occurred".to_string()
                }),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        if status.is_server_error() {
            error!("{:?} failed with {}: {}", self.operation, status, self.error);
        } else {
            warn!("{:?} rejected with {}: {}", self.operation, status, self.error);
        }

        (status, Json(body)).into_response()
    }
}
