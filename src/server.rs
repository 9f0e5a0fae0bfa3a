//! HTTP surface: free-text and file translation, teaching new terms and the
//! live glossary count.

use crate::direction::Direction;
use crate::document::{translate_document, DocumentKind, PackageLimitError};
use crate::glossary::GlossaryEntry;
use crate::llm::TextGenerator;
use crate::translator::Translator;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct AppState<G> {
    pub translator: Translator<G>,
    /// Required `X-API-Key` value for glossary edits, if any
    pub api_key: Option<String>,
    /// Body limit for `/translate/file`
    pub max_upload_bytes: usize,
}

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translation: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub format: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Deserialize)]
pub struct TeachRequest {
    pub english: String,
    pub lao: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeachResponse {
    pub added: bool,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GlossaryResponse {
    pub count: usize,
    pub entries: Vec<GlossaryEntry>,
}

/// Handler error carrying the status to answer with
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Request failed: {:#}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

pub fn router<G: TextGenerator + 'static>(state: Arc<AppState<G>>) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    Router::new()
        .route("/health", get(health))
        .route("/glossary", get(list_glossary::<G>).post(teach_term::<G>))
        .route("/glossary/count", get(glossary_count::<G>))
        .route("/translate", post(translate_text::<G>))
        .route("/translate/file", post(translate_file::<G>).layer(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_glossary<G: TextGenerator>(
    State(state): State<Arc<AppState<G>>>,
) -> Result<Json<GlossaryResponse>, ApiError> {
    let entries = state.translator.store().list_all()?;
    Ok(Json(GlossaryResponse {
        count: entries.len(),
        entries,
    }))
}

async fn glossary_count<G: TextGenerator>(
    State(state): State<Arc<AppState<G>>>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.translator.store().count()?;
    Ok(Json(CountResponse { count }))
}

async fn teach_term<G: TextGenerator>(
    State(state): State<Arc<AppState<G>>>,
    headers: HeaderMap,
    Json(request): Json<TeachRequest>,
) -> Result<(StatusCode, Json<TeachResponse>), ApiError> {
    if let Some(expected) = &state.api_key {
        if !api_key_matches(&headers, expected) {
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid or missing API key"));
        }
    }

    if request.english.trim().is_empty() || request.lao.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Both the English term and the Lao translation are required",
        ));
    }

    let store = state.translator.store();
    let added = store.insert(&request.english, &request.lao)?;
    let count = store.count()?;

    if added {
        info!("Learned term '{}' → '{}'", request.english.trim(), request.lao.trim());
    }

    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(TeachResponse { added, count })))
}

async fn translate_text<G: TextGenerator>(
    State(state): State<Arc<AppState<G>>>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let translation = state
        .translator
        .translate_for_display(&request.text, request.direction)
        .await?;
    Ok(Json(TranslateResponse { translation }))
}

async fn translate_file<G: TextGenerator>(
    State(state): State<Arc<AppState<G>>>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let kind: DocumentKind = query
        .format
        .parse()
        .map_err(|e: anyhow::Error| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    if body.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Empty document"));
    }

    let translated = translate_document(&state.translator, &body, kind, query.direction)
        .await
        .map_err(document_error)?;

    let report = translated.report;
    let headers = [
        (header::CONTENT_TYPE, kind.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"translated.{}\"", kind.extension()),
        ),
        (
            header::HeaderName::from_static("x-translated-runs"),
            report.translated.to_string(),
        ),
        (
            header::HeaderName::from_static("x-failed-runs"),
            report.failed.to_string(),
        ),
    ];
    Ok((headers, translated.bytes).into_response())
}

/// Map a document failure to a status. Broken or oversized uploads are the
/// caller's fault; anything else (storage) is ours.
fn document_error(e: anyhow::Error) -> ApiError {
    let status = if e.chain().any(|c| c.is::<PackageLimitError>()) {
        StatusCode::PAYLOAD_TOO_LARGE
    } else if e.chain().any(|c| {
        c.is::<zip::result::ZipError>()
            || c.is::<quick_xml::Error>()
            || c.is::<quick_xml::escape::EscapeError>()
    }) {
        StatusCode::BAD_REQUEST
    } else {
        return ApiError::from(e);
    };
    ApiError::new(status, format!("{:#}", e))
}

/// Check the `X-API-Key` header against the configured key in constant time.
/// A missing or non-ASCII header never matches.
fn api_key_matches(headers: &HeaderMap, expected: &str) -> bool {
    let Some(provided) = headers.get(API_KEY_HEADER) else {
        return false;
    };
    // Slices of different length compare unequal
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
