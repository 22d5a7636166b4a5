//! HTTP surface for the job gateway.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /v2/text_extractions/online` – Admit extraction of an online source. Body:
//!   `{ "extractor": "web", "path": "https://…", "mode": "single", "from_date": "…" }`.
//! - `POST /v2/text_extractions/file` – Admit extraction of an uploaded file. Multipart with a
//!   `file` part and a `params` part holding `{ "extractor": "pdf", "name": "…" }`.
//! - `GET /v2/status/:id` – Poll a job by correlation id.
//! - `GET /metrics` – Observe admission and completion counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Submissions answer `201 created` when a new job started and `202 accepted` when an
//! identical job was already in flight; both carry the correlation id to poll. Status polls
//! answer `200` with the payload, `202` while pending, `404` for unknown ids, and `500` with
//! the error message for failed jobs. Every rejection, including malformed bodies refused by
//! the extractors, answers with the same `{ status: "failure", error, data: null }` envelope.

use crate::extraction::{
    ExtractionMode, FileExtractor, FileSource, OnlineExtractor, OnlineSource, parse_date,
};
use crate::jobs::{Admission, CorrelationId, JobStatus, Outcome};
use crate::metrics::MetricsSnapshot;
use crate::service::JobsApi;
use crate::store::StoreError;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// Largest accepted multipart upload.
const UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the job API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: JobsApi + 'static,
{
    Router::new()
        .route("/v2/text_extractions/online", post(submit_online::<S>))
        .route(
            "/v2/text_extractions/file",
            post(submit_file::<S>).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/v2/status/:id", get(get_status::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Admission state reported by submission endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitState {
    /// A new job started.
    Created,
    /// An identical job was already in flight; its id is returned.
    Accepted,
}

/// Response body for submission endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Whether a new job started.
    pub status: SubmitState,
    /// Identifier to poll at `/v2/status/:id`.
    pub correlation_id: String,
}

/// Result marker in status and error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    /// Job finished and produced `data`.
    Success,
    /// Job still running.
    Pending,
    /// Job failed, is unknown, or the request could not be served; see `error`.
    Failure,
}

/// Envelope returned by the status endpoint and by every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBody {
    /// Result marker.
    pub status: StatusState,
    /// Error message for failures.
    pub error: Option<String>,
    /// Job payload for successes.
    pub data: Option<Value>,
}

impl StatusBody {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: StatusState::Failure,
            error: Some(message.into()),
            data: None,
        }
    }
}

/// Map an admission decision to its HTTP response.
pub fn submit_response(admission: Admission) -> (StatusCode, Json<SubmitResponse>) {
    let (code, status, id) = match admission {
        Admission::Created(id) => (StatusCode::CREATED, SubmitState::Created, id),
        Admission::Accepted(id) => (StatusCode::ACCEPTED, SubmitState::Accepted, id),
    };
    (
        code,
        Json(SubmitResponse {
            status,
            correlation_id: id.to_string(),
        }),
    )
}

/// Map a registry status to its HTTP response.
pub fn status_response(status: JobStatus) -> (StatusCode, Json<StatusBody>) {
    match status {
        JobStatus::Done(Outcome::Success(payload)) => (
            StatusCode::OK,
            Json(StatusBody {
                status: StatusState::Success,
                error: None,
                data: Some(payload),
            }),
        ),
        JobStatus::Done(Outcome::Failure(message)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusBody::failure(message)),
        ),
        JobStatus::Pending => (
            StatusCode::ACCEPTED,
            Json(StatusBody {
                status: StatusState::Pending,
                error: None,
                data: None,
            }),
        ),
        JobStatus::NotFound => (StatusCode::NOT_FOUND, Json(StatusBody::failure("Not found"))),
    }
}

/// Request body for `POST /v2/text_extractions/online`.
#[derive(Deserialize)]
struct OnlineRequest {
    /// Source kind (defaults to `web`).
    #[serde(default)]
    extractor: OnlineExtractor,
    /// Absolute `http(s)` URL of the source.
    path: String,
    /// Page grouping (defaults to `single`).
    #[serde(default)]
    mode: ExtractionMode,
    /// Optional lower bound on content dates.
    #[serde(default)]
    from_date: Option<String>,
}

/// JSON carried in the `params` part of `POST /v2/text_extractions/file`.
#[derive(Deserialize)]
struct FileParams {
    /// File kind (defaults to `docx`).
    #[serde(default)]
    extractor: FileExtractor,
    /// Document name used for dedup and chunk labels.
    name: String,
}

/// Admit extraction of an online source.
async fn submit_online<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<OnlineRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError>
where
    S: JobsApi,
{
    let Json(request) = request?;
    let url = parse_source_url(&request.path)?;
    let from_date = request
        .from_date
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(|err| AppError::InvalidRequest(format!("Invalid from_date: {err}")))?;
    let source = OnlineSource {
        extractor: request.extractor,
        url,
        mode: request.mode,
        from_date,
    };
    let admission = service.submit_online(source).await?;
    tracing::info!(
        correlation_id = %admission.id(),
        created = admission.is_new(),
        "Online extraction request handled"
    );
    Ok(submit_response(admission))
}

/// Admit extraction of an uploaded file.
///
/// The upload is spooled to a temporary file before admission; the job (or the service, for
/// duplicates) removes it.
async fn submit_file<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError>
where
    S: JobsApi,
{
    let mut multipart = multipart?;
    let mut params: Option<FileParams> = None;
    let mut contents: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("params") => {
                let raw = field.text().await?;
                let parsed = serde_json::from_str(&raw)
                    .map_err(|err| AppError::InvalidRequest(format!("Invalid params: {err}")))?;
                params = Some(parsed);
            }
            Some("file") => contents = Some(field.bytes().await?),
            _ => {}
        }
    }

    let params = params.ok_or_else(|| AppError::InvalidRequest("Missing params part".into()))?;
    let contents = contents.ok_or_else(|| AppError::InvalidRequest("Missing file part".into()))?;
    if params.name.trim().is_empty() {
        return Err(AppError::InvalidRequest("Document name must not be empty".into()));
    }

    let path = std::env::temp_dir().join(format!("jobgate-upload-{}", Uuid::new_v4()));
    tokio::fs::write(&path, &contents)
        .await
        .map_err(AppError::Spool)?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "Spooled upload");

    let source = FileSource {
        extractor: params.extractor,
        name: params.name,
        path,
    };
    let admission = service.submit_file(source).await?;
    tracing::info!(
        correlation_id = %admission.id(),
        created = admission.is_new(),
        "File extraction request handled"
    );
    Ok(submit_response(admission))
}

/// Report pending, success, failure, or not-found for a correlation id.
async fn get_status<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<StatusBody>), AppError>
where
    S: JobsApi,
{
    let status = service.status(&CorrelationId::new(id)).await?;
    Ok(status_response(status))
}

/// Return a snapshot of admission and completion counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: JobsApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        in_flight: snapshot.in_flight(),
        snapshot,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    snapshot: MetricsSnapshot,
    in_flight: u64,
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "submit_online",
                method: "POST",
                path: "/v2/text_extractions/online",
                description: "Start text extraction for an online source. Returns 201 { \"status\": \"created\", \"correlation_id\": … } or 202 with the in-flight id for duplicates.",
                request_example: Some(json!({
                    "extractor": "web",
                    "path": "https://example.org/article",
                    "mode": "single"
                })),
            },
            CommandDescriptor {
                name: "submit_file",
                method: "POST",
                path: "/v2/text_extractions/file",
                description: "Start text extraction for an uploaded file (multipart: `file` bytes plus `params` JSON). Duplicates of an in-flight document return 202.",
                request_example: Some(json!({
                    "params": { "extractor": "pdf", "name": "doc1" }
                })),
            },
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/v2/status/:id",
                description: "Poll a job: 200 with data when done, 202 while pending, 404 when unknown or evicted, 500 with the error when the job failed.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return admission and completion counters.",
                request_example: None,
            },
        ],
    })
}

fn parse_source_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| AppError::InvalidRequest(format!("Invalid source URL: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AppError::InvalidRequest(format!(
            "Unsupported URL scheme: {scheme}"
        ))),
    }
}

enum AppError {
    Store(StoreError),
    Rejected(StatusCode, String),
    InvalidRequest(String),
    Multipart(MultipartError),
    Spool(std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            Self::Store(err) => {
                tracing::error!(error = %err, "Job store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            Self::Rejected(code, message) => (code, message),
            Self::InvalidRequest(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            Self::Multipart(err) => (err.status(), err.body_text()),
            Self::Spool(err) => {
                tracing::error!(error = %err, "Failed to spool upload");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to store upload: {err}"),
                )
            }
        };
        (code, Json(StatusBody::failure(message))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(inner: StoreError) -> Self {
        Self::Store(inner)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
