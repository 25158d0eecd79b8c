//! Boundary types and traits for talking to the extraction service.
//!
//! The orchestrator only ever sees these shapes; the HTTP transport lives in
//! a sibling crate and adapts the service's wire format to them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A document handed over for extraction.
#[derive(Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for DocumentUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Server-side state of an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Processing,
    Completed,
    /// Legacy alias for [`JobStatus::Completed`] still emitted by older
    /// service versions.
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Success)
    }
}

/// Response to a document submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAck {
    /// Key for tracking the extraction job.
    pub job_key: String,
    /// Key of the record being produced, when the service already knows it.
    pub record_key: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
}

/// One observation of a job's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub record_key: Option<String>,
    pub error_message: Option<String>,
}

/// Lifecycle state of the extracted record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Processing,
    Extracted,
    ExtractionFailed,
    Pending,
}

/// The invoice produced by a successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(default)]
    pub invoice_key: Option<String>,
    pub invoice_number: String,
    pub invoice_amount: f64,
    pub client_name: String,
    pub client_address: String,
    pub issue_date: String,
    pub due_date: String,
    pub currency: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Errors crossing the service boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The service rejected or failed the request and said why.
    #[error("{message}")]
    Backend { code: Option<String>, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Message suitable for end-user display.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Backend { message, .. } => message,
            Self::NotFound(_) => "The requested record could not be found.",
            Self::Transport(_) => {
                "Could not reach the extraction service. Please check your connection and try again."
            }
            Self::Decode(_) => "The extraction service returned an unexpected response.",
        }
    }
}

/// The extraction service, as seen by the orchestrator.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Submit a document for extraction.
    async fn submit(&self, upload: DocumentUpload) -> Result<SubmissionAck, ApiError>;

    /// Fetch the current status of a job.
    async fn job_status(&self, job_key: &str) -> Result<JobStatusReport, ApiError>;

    /// Fetch the record a completed job produced.
    async fn fetch_record(&self, record_key: &str) -> Result<InvoiceRecord, ApiError>;
}
