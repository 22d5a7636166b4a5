//! HTTP client for a running gateway, used by the `jobctl` binary.

use crate::api::{StatusBody, StatusState, SubmitResponse, SubmitState};
use crate::extraction::{ExtractionMode, FileExtractor, OnlineExtractor};
use crate::jobs::{Admission, CorrelationId, JobStatus, Outcome};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors returned while talking to the gateway.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL failed to parse.
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Local upload could not be read.
    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    /// Gateway responded with a status outside the documented set.
    #[error("Unexpected gateway response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the gateway.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The job is unknown to the gateway, or its result was evicted.
    #[error("Job {0} not found")]
    NotFound(CorrelationId),
    /// The job did not finish within the allotted time.
    #[error("Job {id} still pending after {waited:?}")]
    Timeout {
        /// Job being waited on.
        id: CorrelationId,
        /// Time spent polling.
        waited: Duration,
    },
}

/// Thin typed wrapper over the gateway's HTTP surface.
pub struct JobClient {
    client: Client,
    base_url: String,
}

impl JobClient {
    /// Create a client for the gateway at `base_url` (for example `http://localhost:4100`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(base_url).map_err(ClientError::InvalidUrl)?;
        let client = Client::builder().user_agent("jobctl/0.2").build()?;
        Ok(Self { client, base_url })
    }

    /// Submit an online source for extraction.
    pub async fn submit_online(
        &self,
        extractor: OnlineExtractor,
        url: &str,
        mode: ExtractionMode,
        from_date: Option<&str>,
    ) -> Result<Admission, ClientError> {
        let body = json!({
            "extractor": extractor,
            "path": url,
            "mode": mode,
            "from_date": from_date,
        });
        let response = self
            .client
            .post(self.endpoint("/v2/text_extractions/online"))
            .json(&body)
            .send()
            .await?;
        read_admission(response).await
    }

    /// Upload a local file for extraction under the document name `name`.
    pub async fn submit_file(
        &self,
        extractor: FileExtractor,
        name: &str,
        path: &Path,
    ) -> Result<Admission, ClientError> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let params = json!({ "extractor": extractor, "name": name });
        let form = Form::new()
            .text("params", params.to_string())
            .part("file", Part::bytes(contents).file_name(file_name));
        let response = self
            .client
            .post(self.endpoint("/v2/text_extractions/file"))
            .multipart(form)
            .send()
            .await?;
        read_admission(response).await
    }

    /// Fetch the current state of a job.
    pub async fn status(&self, id: &CorrelationId) -> Result<JobStatus, ClientError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/v2/status/{id}")))
            .send()
            .await?;
        let status = response.status();
        match status {
            StatusCode::OK
            | StatusCode::ACCEPTED
            | StatusCode::NOT_FOUND
            | StatusCode::INTERNAL_SERVER_ERROR => {
                let text = response.text().await?;
                let body: StatusBody = serde_json::from_str(&text)
                    .map_err(|_| ClientError::UnexpectedStatus { status, body: text })?;
                Ok(job_status(status, body))
            }
            _ => Err(unexpected(response).await),
        }
    }

    /// Poll until the job finishes, returning its outcome.
    pub async fn wait_for_completion(
        &self,
        id: &CorrelationId,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Outcome, ClientError> {
        let started = tokio::time::Instant::now();
        loop {
            match self.status(id).await? {
                JobStatus::Done(outcome) => return Ok(outcome),
                JobStatus::NotFound => return Err(ClientError::NotFound(id.clone())),
                JobStatus::Pending => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(ClientError::Timeout {
                            id: id.clone(),
                            waited,
                        });
                    }
                    tracing::debug!(correlation_id = %id, "Job pending; polling again");
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

async fn read_admission(response: Response) -> Result<Admission, ClientError> {
    if !matches!(response.status(), StatusCode::CREATED | StatusCode::ACCEPTED) {
        return Err(unexpected(response).await);
    }
    let body: SubmitResponse = response.json().await?;
    let id = CorrelationId::new(body.correlation_id);
    Ok(match body.status {
        SubmitState::Created => Admission::Created(id),
        SubmitState::Accepted => Admission::Accepted(id),
    })
}

fn job_status(code: StatusCode, body: StatusBody) -> JobStatus {
    match (code, body.status) {
        (StatusCode::NOT_FOUND, _) => JobStatus::NotFound,
        (_, StatusState::Pending) => JobStatus::Pending,
        (_, StatusState::Success) => {
            JobStatus::Done(Outcome::Success(body.data.unwrap_or_default()))
        }
        (_, StatusState::Failure) => {
            JobStatus::Done(Outcome::Failure(body.error.unwrap_or_default()))
        }
    }
}

async fn unexpected(response: Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ClientError::UnexpectedStatus { status, body }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use serde_json::json;

    #[tokio::test]
    async fn submit_online_reads_created_and_accepted() {
        let server = MockServer::start_async().await;
        let created = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/text_extractions/online")
                    .json_body_partial(r#"{"path":"https://x","extractor":"web"}"#);
                then.status(201)
                    .json_body(json!({ "status": "created", "correlation_id": "u1" }));
            })
            .await;

        let client = JobClient::new(&server.base_url()).unwrap();
        let admission = client
            .submit_online(OnlineExtractor::Web, "https://x", ExtractionMode::Single, None)
            .await
            .unwrap();

        created.assert_async().await;
        assert_eq!(admission, Admission::Created(CorrelationId::new("u1")));
    }

    #[tokio::test]
    async fn submit_file_uploads_multipart() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/text_extractions/file")
                    .body_contains("name=\"params\"")
                    .body_contains(r#""name":"doc1""#)
                    .body_contains("hello upload");
                then.status(202)
                    .json_body(json!({ "status": "accepted", "correlation_id": "u7" }));
            })
            .await;

        let path = std::env::temp_dir().join(format!("jobctl-{}.pdf", uuid::Uuid::new_v4()));
        std::fs::write(&path, "hello upload").unwrap();

        let client = JobClient::new(&server.base_url()).unwrap();
        let admission = client
            .submit_file(FileExtractor::Pdf, "doc1", &path)
            .await
            .unwrap();
        std::fs::remove_file(&path).ok();

        mock.assert_async().await;
        assert_eq!(admission, Admission::Accepted(CorrelationId::new("u7")));
    }

    #[tokio::test]
    async fn status_maps_documented_codes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/status/done");
                then.status(200)
                    .json_body(json!({ "status": "success", "error": null, "data": [1, 2] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/status/broken");
                then.status(500)
                    .json_body(json!({ "status": "failure", "error": "boom", "data": null }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/status/gone");
                then.status(404)
                    .json_body(json!({ "status": "failure", "error": "Not found", "data": null }));
            })
            .await;

        let client = JobClient::new(&server.base_url()).unwrap();
        assert_eq!(
            client.status(&CorrelationId::new("done")).await.unwrap(),
            JobStatus::Done(Outcome::Success(json!([1, 2])))
        );
        assert_eq!(
            client.status(&CorrelationId::new("broken")).await.unwrap(),
            JobStatus::Done(Outcome::Failure("boom".into()))
        );
        assert_eq!(
            client.status(&CorrelationId::new("gone")).await.unwrap(),
            JobStatus::NotFound
        );
    }

    #[tokio::test]
    async fn unavailable_gateway_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/status/u1");
                then.status(503).body("store down");
            })
            .await;

        let client = JobClient::new(&server.base_url()).unwrap();
        let err = client.status(&CorrelationId::new("u1")).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedStatus { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn wait_times_out_while_pending() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/status/slow");
                then.status(202)
                    .json_body(json!({ "status": "pending", "error": null, "data": null }));
            })
            .await;

        let client = JobClient::new(&server.base_url()).unwrap();
        let err = client
            .wait_for_completion(
                &CorrelationId::new("slow"),
                Duration::from_millis(50),
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = JobClient::new("http://localhost:4100/").unwrap();
        assert_eq!(
            client.endpoint("/v2/status/u1"),
            "http://localhost:4100/v2/status/u1"
        );
        assert!(JobClient::new("not a url").is_err());
    }
}
