//! Request descriptors and error definitions for text extraction jobs.

use crate::jobs::Fingerprint;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use time::Date;
use time::macros::format_description;

/// Errors raised while executing an extraction job.
///
/// These never reach an HTTP caller directly; the runner records their message as the job's
/// failure outcome.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Remote source could not be fetched.
    #[error("Failed to fetch source: {0}")]
    Fetch(#[from] reqwest::Error),
    /// Uploaded file could not be read.
    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    /// The extractor kind has no implementation in this build.
    #[error("Extractor '{0}' is not supported")]
    Unsupported(String),
    /// Uploaded bytes were not valid UTF-8 text.
    #[error("Upload '{name}' does not contain UTF-8 text")]
    NotText {
        /// Display name of the upload.
        name: String,
    },
    /// Extracted chunks could not be encoded as a payload.
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    /// Extraction configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Online source kinds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OnlineExtractor {
    /// Public web page.
    #[default]
    Web,
    /// SharePoint site.
    Sharepoint,
}

/// Uploaded file kinds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FileExtractor {
    /// Word document.
    #[default]
    Docx,
    /// PDF document.
    Pdf,
    /// Plain text.
    Txt,
    /// Comma separated values.
    Csv,
    /// Excel workbook.
    Xlsx,
}

/// How multi-page online sources are grouped.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// One document per page.
    #[default]
    Single,
    /// Pages merged into one document.
    Consolidated,
}

impl fmt::Display for OnlineExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Web => "web",
            Self::Sharepoint => "sharepoint",
        })
    }
}

impl fmt::Display for FileExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        })
    }
}

/// Extraction request for an online source.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineSource {
    /// Source kind.
    pub extractor: OnlineExtractor,
    /// Absolute `http(s)` URL to extract from.
    pub url: Url,
    /// Page grouping.
    pub mode: ExtractionMode,
    /// Optional lower bound on content dates, passed through untouched.
    pub from_date: Option<Date>,
}

impl OnlineSource {
    /// Dedup key: one in-flight job per extractor and URL.
    ///
    /// The `online:` tag keeps these keys disjoint from upload keys in the shared index.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(format!("online:{}:{}", self.extractor, self.url))
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Result<Date, time::error::Parse> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
}

/// Extraction request for a file already spooled to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    /// File kind.
    pub extractor: FileExtractor,
    /// Caller-supplied document name.
    pub name: String,
    /// Temporary path of the spooled upload. Extraction deletes it.
    pub path: PathBuf,
}

impl FileSource {
    /// Dedup key: one in-flight job per document name and kind.
    ///
    /// The kind precedes the free-form name so no name can impersonate another kind.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(format!("file:{}:{}", self.extractor, self.name))
    }

    /// Source label recorded on every chunk.
    pub fn source_label(&self) -> String {
        format!("{}.{}", self.name, self.extractor)
    }
}

/// One extracted chunk as returned in a job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Record type marker, always `chunk`.
    pub kind: String,
    /// Position label, `Chunk{index}`.
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// URL or upload label the chunk came from.
    pub source: String,
}

impl ChunkRecord {
    pub(crate) fn new(index: usize, content: String, source: &str) -> Self {
        Self {
            kind: "chunk".to_string(),
            id: format!("Chunk{index}"),
            content,
            source: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_fingerprint_joins_extractor_and_url() {
        let source = OnlineSource {
            extractor: OnlineExtractor::Web,
            url: Url::parse("https://x").unwrap(),
            mode: ExtractionMode::Single,
            from_date: None,
        };
        assert_eq!(source.fingerprint().as_str(), "online:web:https://x/");
    }

    #[test]
    fn file_fingerprint_joins_name_and_kind() {
        let source = FileSource {
            extractor: FileExtractor::Pdf,
            name: "doc1".into(),
            path: PathBuf::from("/tmp/upload"),
        };
        assert_eq!(source.fingerprint().as_str(), "file:pdf:doc1");
        assert_eq!(source.source_label(), "doc1.pdf");
    }

    #[test]
    fn crafted_upload_name_cannot_match_online_key() {
        let online = OnlineSource {
            extractor: OnlineExtractor::Web,
            url: Url::parse("https://x/a-pdf").unwrap(),
            mode: ExtractionMode::Single,
            from_date: None,
        };
        let upload = FileSource {
            extractor: FileExtractor::Pdf,
            name: "web-https://x/a".into(),
            path: PathBuf::from("/tmp/upload"),
        };
        let mimic = FileSource {
            extractor: FileExtractor::Pdf,
            name: online.fingerprint().as_str().to_string(),
            path: PathBuf::from("/tmp/upload"),
        };
        assert_ne!(online.fingerprint(), upload.fingerprint());
        assert_ne!(online.fingerprint(), mimic.fingerprint());
    }

    #[test]
    fn dates_parse_as_calendar_days() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!((date.year(), u8::from(date.month()), date.day()), (2024, 2, 29));
        assert!(parse_date("banana").is_err());
        assert!(parse_date("2023-02-29").is_err());
    }

    #[test]
    fn extractor_kinds_deserialize_lowercase() {
        let kind: FileExtractor = serde_json::from_str("\"xlsx\"").unwrap();
        assert_eq!(kind, FileExtractor::Xlsx);
        assert!(serde_json::from_str::<OnlineExtractor>("\"ftp\"").is_err());
    }
}
