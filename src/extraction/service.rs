//! Extraction backends executed inside background jobs.

use super::chunking::chunk_text;
use super::types::{
    ChunkRecord, ExtractionError, FileExtractor, FileSource, OnlineExtractor, OnlineSource,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Unit of work behind every extraction job.
///
/// Implementations may block on network or disk for as long as they need; they only ever run
/// inside the job runner, never on the request path.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract chunks from an online source.
    async fn extract_online(&self, source: OnlineSource) -> Result<Value, ExtractionError>;

    /// Extract chunks from a spooled upload, deleting the spooled file afterwards.
    async fn extract_file(&self, source: FileSource) -> Result<Value, ExtractionError>;
}

/// Plain-text extractor: fetches or reads the source and splits it into token-bounded chunks.
pub struct TextExtractor {
    client: Client,
    chunk_size: usize,
}

impl TextExtractor {
    /// Build an extractor producing chunks of at most `chunk_size` tokens.
    pub fn new(chunk_size: usize) -> Result<Self, ExtractionError> {
        let client = Client::builder().user_agent("jobgate/0.2").build()?;
        Ok(Self { client, chunk_size })
    }

    fn records(&self, text: &str, source: &str) -> Result<Value, ExtractionError> {
        let records: Vec<ChunkRecord> = chunk_text(text, self.chunk_size)?
            .into_iter()
            .enumerate()
            .map(|(index, content)| ChunkRecord::new(index, content, source))
            .collect();
        tracing::debug!(source, chunks = records.len(), "Chunked extracted text");
        Ok(serde_json::to_value(records)?)
    }

    async fn read_upload(&self, source: &FileSource) -> Result<String, ExtractionError> {
        if matches!(source.extractor, FileExtractor::Xlsx) {
            return Err(ExtractionError::Unsupported(source.extractor.to_string()));
        }
        let bytes = tokio::fs::read(&source.path).await?;
        String::from_utf8(bytes).map_err(|_| ExtractionError::NotText {
            name: source.source_label(),
        })
    }
}

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract_online(&self, source: OnlineSource) -> Result<Value, ExtractionError> {
        if source.extractor != OnlineExtractor::Web {
            return Err(ExtractionError::Unsupported(source.extractor.to_string()));
        }
        tracing::info!(url = %source.url, mode = ?source.mode, "Fetching online source");
        let body = self
            .client
            .get(source.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        self.records(&body, source.url.as_str())
    }

    async fn extract_file(&self, source: FileSource) -> Result<Value, ExtractionError> {
        let text = self.read_upload(&source).await;
        if let Err(err) = tokio::fs::remove_file(&source.path).await {
            tracing::warn!(path = %source.path.display(), error = %err, "Failed to remove spooled upload");
        } else {
            tracing::debug!(path = %source.path.display(), "Removed spooled upload");
        }
        self.records(&text?, &source.source_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::ExtractionMode;
    use httpmock::{Method::GET, MockServer};
    use reqwest::Url;
    use serde_json::json;
    use std::path::PathBuf;

    fn spool(contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("jobgate-test-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).expect("write spooled file");
        path
    }

    #[tokio::test]
    async fn file_extraction_chunks_and_removes_upload() {
        let extractor = TextExtractor::new(2).unwrap();
        let path = spool(b"one two three four five");
        let source = FileSource {
            extractor: FileExtractor::Txt,
            name: "doc1".into(),
            path: path.clone(),
        };

        let payload = extractor.extract_file(source).await.unwrap();

        assert_eq!(payload.as_array().map(Vec::len), Some(3));
        assert_eq!(
            payload[0],
            json!({ "kind": "chunk", "id": "Chunk0", "content": "one two", "source": "doc1.txt" })
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn binary_upload_fails_and_is_still_removed() {
        let extractor = TextExtractor::new(8).unwrap();
        let path = spool(&[0xff, 0xfe, 0x00, 0x81]);
        let source = FileSource {
            extractor: FileExtractor::Pdf,
            name: "scan".into(),
            path: path.clone(),
        };

        let err = extractor.extract_file(source).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NotText { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn online_extraction_fetches_and_chunks() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page");
                then.status(200).body("alpha beta gamma");
            })
            .await;

        let extractor = TextExtractor::new(2).unwrap();
        let source = OnlineSource {
            extractor: OnlineExtractor::Web,
            url: Url::parse(&server.url("/page")).unwrap(),
            mode: ExtractionMode::Single,
            from_date: None,
        };

        let payload = extractor.extract_online(source).await.unwrap();
        mock.assert_async().await;
        let records: Vec<ChunkRecord> = serde_json::from_value(payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content, "gamma");
        assert!(records[1].source.ends_with("/page"));
    }

    #[tokio::test]
    async fn online_error_status_is_a_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let extractor = TextExtractor::new(2).unwrap();
        let source = OnlineSource {
            extractor: OnlineExtractor::Web,
            url: Url::parse(&server.url("/missing")).unwrap(),
            mode: ExtractionMode::Single,
            from_date: None,
        };

        let err = extractor.extract_online(source).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Fetch(_)));
    }

    #[tokio::test]
    async fn sharepoint_is_unsupported() {
        let extractor = TextExtractor::new(2).unwrap();
        let source = OnlineSource {
            extractor: OnlineExtractor::Sharepoint,
            url: Url::parse("https://example.sharepoint.com/site").unwrap(),
            mode: ExtractionMode::Consolidated,
            from_date: Some(crate::extraction::parse_date("2024-01-01").unwrap()),
        };

        let err = extractor.extract_online(source).await.unwrap_err();
        assert_eq!(err.to_string(), "Extractor 'sharepoint' is not supported");
    }
}
