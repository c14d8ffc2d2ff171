//! HTTP request handlers for the cog-glui tile API.
//!
//! # Endpoints
//!
//! - `GET /tiles/{z}/{x}/{y}.{format}?color=<expr>` - Serve a tile
//! - `GET /index.html` - Map preview
//! - `GET /playground.html` - Map preview with color controls
//!
//! Anything else is a 404.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
    Json,
};
use http::{header, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::TileError;
use crate::raster::RasterSource;
use crate::tile::{TileFormat, TileRequest, TileService};

use super::templates::{render_index, render_playground, PageParams};

/// Cache-Control sent with every tile.
pub const TILE_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to handlers via Axum's State extractor.
pub struct AppState<R: RasterSource> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<R>>,

    /// Parameters of the preview pages
    pub page: Arc<PageParams>,
}

impl<R: RasterSource> AppState<R> {
    pub fn new(tile_service: TileService<R>, page: PageParams) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            page: Arc::new(page),
        }
    }
}

impl<R: RasterSource> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            page: Arc::clone(&self.page),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/{z}/{x}/{filename}` where filename is `{y}.{format}`.
/// Segments are kept as strings so that non-numeric coordinates fall through
/// to a 404 instead of an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub z: String,
    pub x: String,
    pub filename: String,
}

/// A tile path split into coordinates and the requested extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePath<'a> {
    pub z: u8,
    pub x: u32,
    pub y: u32,
    pub extension: &'a str,
}

impl TilePathParams {
    /// Parse the coordinates and extension, `None` if the path is not a tile.
    pub fn parse(&self) -> Option<TilePath<'_>> {
        let (y, extension) = self.filename.split_once('.')?;
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(TilePath {
            z: parse_coordinate(&self.z)?,
            x: parse_coordinate(&self.x)?,
            y: parse_coordinate(y)?,
            extension,
        })
    }
}

/// Digits only: no sign, no whitespace.
fn parse_coordinate<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Query parameters for tile requests.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// Color operations, e.g. `gamma b 1.8, sigmoidal rgb 10 0.15`
    #[serde(default)]
    pub color: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_format")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 5xx are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            TileError::InvalidFormat { .. } => (StatusCode::BAD_REQUEST, "invalid_format"),
            TileError::InvalidColorExpression(_) => {
                (StatusCode::BAD_REQUEST, "invalid_color_expression")
            }
            TileError::Raster(_) => (StatusCode::INTERNAL_SERVER_ERROR, "raster_error"),
            TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
            TileError::Worker { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "worker_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Uniform 404 for anything that is not a route.
fn not_found(path: &str) -> Response {
    debug!(path = path, "No route");
    let status = StatusCode::NOT_FOUND;
    let body = ErrorResponse::with_status("not_found", format!("No route for {path}"), status);
    (status, Json(body)).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{z}/{x}/{y}.{format}`
///
/// # Query Parameters
///
/// - `color`: color operation chain applied before encoding
///
/// # Response
///
/// - `200 OK`: encoded tile, `Content-Type: image/{format}` echoing the extension
/// - `400 Bad Request`: unknown format or invalid color expression
/// - `404 Not Found`: tile outside the raster, or non-numeric coordinates
/// - `500 Internal Server Error`: read or encode failure
pub async fn tile_handler<R: RasterSource>(
    State(state): State<AppState<R>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<TileQueryParams>,
    uri: Uri,
) -> Response {
    let Some(tile) = params.parse() else {
        return not_found(uri.path());
    };

    let format = match TileFormat::from_extension(tile.extension) {
        Ok(format) => format,
        Err(e) => return e.into_response(),
    };

    let mut request = TileRequest::new(tile.z, tile.x, tile.y, format);
    if let Some(color) = query.color.filter(|c| !c.trim().is_empty()) {
        request = request.with_color(color);
    }

    match state.tile_service.get_tile(request).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, format!("image/{}", tile.extension)),
                (header::CACHE_CONTROL, TILE_CACHE_CONTROL.to_string()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
                (header::ACCESS_CONTROL_ALLOW_METHODS, "GET".to_string()),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /index.html`
pub async fn index_handler<R: RasterSource>(State(state): State<AppState<R>>) -> Html<String> {
    Html(render_index(&state.page))
}

/// `GET /playground.html`
pub async fn playground_handler<R: RasterSource>(
    State(state): State<AppState<R>>,
) -> Html<String> {
    Html(render_playground(&state.page))
}

/// Fallback for every unmatched path.
pub async fn fallback_handler(uri: Uri) -> Response {
    not_found(uri.path())
}

// =============================================================================
// Tests
// =============================================================================
