//! HTTP backend for the invoice extraction service.
//!
//! Speaks the service's REST API: multipart document submission, job status
//! lookups, and invoice retrieval. Failure bodies carry an `errorCode` that
//! is translated into a user-facing message via [`error_codes`].

pub mod endpoints;
pub mod error_codes;

use std::time::Duration;

use async_trait::async_trait;
use extractor_core::{
    ApiError, DocumentUpload, ExtractionBackend, InvoiceRecord, JobStatus, JobStatusReport,
    SubmissionAck,
};
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Covers the whole request, upload included.
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/invoice-extractor-service".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Client for the extraction service REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Status body returned for a single extraction job.
#[derive(Debug, Deserialize)]
struct WireMetadata {
    extraction_key: String,
    #[serde(default)]
    invoice_key: Option<String>,
    extraction_status: JobStatus,
    #[serde(default)]
    error_message: Option<String>,
}

/// Body returned by a document submission.
#[derive(Debug, Deserialize)]
struct WireSubmission {
    #[serde(default)]
    invoice: Option<InvoiceRecord>,
    extraction_metadata: WireMetadata,
}

/// Failure body shape shared by all endpoints.
#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn submit(&self, upload: DocumentUpload) -> Result<SubmissionAck, ApiError> {
        debug!(
            "submitting {} ({} bytes) for extraction",
            upload.file_name,
            upload.bytes.len()
        );
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .map_err(transport)?;
        let response = self
            .client
            .post(self.url(endpoints::EXTRACTIONS))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(transport)?;

        let body: WireSubmission = read_json(response, "extraction job").await?;
        let meta = body.extraction_metadata;
        let record_key = known_key(meta.invoice_key)
            .or_else(|| body.invoice.and_then(|inv| known_key(inv.invoice_key)));
        debug!(
            "extraction {} accepted with status {:?}",
            meta.extraction_key, meta.extraction_status
        );
        Ok(SubmissionAck {
            job_key: meta.extraction_key,
            record_key,
            status: meta.extraction_status,
            error_message: meta.error_message,
        })
    }

    async fn job_status(&self, job_key: &str) -> Result<JobStatusReport, ApiError> {
        let response = self
            .client
            .get(self.url(&endpoints::extraction_by_key(job_key)))
            .send()
            .await
            .map_err(transport)?;

        let meta: WireMetadata = read_json(response, "extraction job").await?;
        debug!("job {} reported {:?}", job_key, meta.extraction_status);
        Ok(JobStatusReport {
            status: meta.extraction_status,
            record_key: known_key(meta.invoice_key),
            error_message: meta.error_message,
        })
    }

    async fn fetch_record(&self, record_key: &str) -> Result<InvoiceRecord, ApiError> {
        let response = self
            .client
            .get(self.url(&endpoints::invoice_by_key(record_key)))
            .send()
            .await
            .map_err(transport)?;
        read_json(response, "invoice").await
    }
}

/// Reads a JSON body, translating failure responses into [`ApiError`].
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, ApiError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let code = response
            .json::<WireError>()
            .await
            .ok()
            .and_then(|body| body.error_code);
        let message = error_codes::user_message(code.as_deref()).to_string();
        return Err(ApiError::Backend { code, message });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}

/// Treats an absent or empty key as unknown.
fn known_key(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.is_empty())
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}
