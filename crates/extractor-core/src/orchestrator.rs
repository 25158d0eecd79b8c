//! End-to-end orchestration of one extraction job.
//!
//! `run` owns the whole lifecycle: submit the document, pick a tracking
//! strategy from the submission ack (animate, follow push events, or poll),
//! wait for the store to reach a terminal phase, and fetch the extracted
//! record exactly once on success.
//!
//! Every write the orchestrator or its drivers make goes through a
//! [`DriverHandle`] issued for this job, so a `reset` (or a newer job)
//! supersedes the whole pipeline at once and nothing stale can land
//! afterwards.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::{
    ApiError, DocumentUpload, ExtractionBackend, InvoiceRecord, JobStatus,
};
use crate::phase::Phase;
use crate::poll::{PollSettings, run_status_poll};
use crate::push::{EventFeed, run_push_tracking};
use crate::simulate::{SimulationSegment, finish_progress, run_simulation, standard_plan};
use crate::store::{DriverHandle, ProgressSnapshot, ProgressStore};

/// Why a job did not produce a record.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("submission failed: {0}")]
    Submission(#[source] ApiError),
    #[error("extraction failed: {message}")]
    ExtractionFailed { message: String },
    #[error("extraction completed but no record key was provided")]
    MissingRecordKey,
    #[error("record fetch failed: {0}")]
    RecordFetch(#[source] ApiError),
    #[error("job was cancelled")]
    Cancelled,
}

/// Tuning knobs for job tracking.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Animation played when the service reports no real progress.
    pub simulation_plan: Vec<SimulationSegment>,
    /// How long the final climb to 100% takes.
    pub finish_pace: Duration,
    pub poll: PollSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            simulation_plan: standard_plan(),
            finish_pace: Duration::from_millis(250),
            poll: PollSettings::default(),
        }
    }
}

/// Drives extraction jobs against a backend and publishes their progress.
pub struct Orchestrator<B: ExtractionBackend> {
    backend: Arc<B>,
    feed: Option<Arc<dyn EventFeed>>,
    store: Arc<ProgressStore>,
    config: OrchestratorConfig,
}

impl<B: ExtractionBackend> Orchestrator<B> {
    pub fn new(backend: Arc<B>, store: Arc<ProgressStore>) -> Self {
        Self {
            backend,
            feed: None,
            store,
            config: OrchestratorConfig::default(),
        }
    }

    /// Use a push-event feed instead of status polling for live jobs.
    pub fn with_event_feed(mut self, feed: Arc<dyn EventFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// Run one extraction job to its outcome.
    ///
    /// A job that is still live when this is called is superseded: the store
    /// is reset, its drivers go silent, and its `run` returns
    /// [`OrchestrationError::Cancelled`].
    pub async fn run(&self, upload: DocumentUpload) -> Result<InvoiceRecord, OrchestrationError> {
        if self.store.current().phase != Phase::Idle {
            log::info!("superseding the live extraction before starting a new one");
            self.store.reset();
        }
        self.store.start_upload();
        let fence = DriverHandle::issue(&self.store);
        let mut watcher = self.store.subscribe();

        log::info!("submitting {} for extraction", upload.file_name);
        let ack = match self.backend.submit(upload).await {
            Ok(ack) => ack,
            Err(err) => {
                log::warn!("submission failed: {err}");
                fence.mark_error(err.user_message());
                return Err(OrchestrationError::Submission(err));
            }
        };
        log::info!("job {} acknowledged as {:?}", ack.job_key, ack.status);

        let mut record_key = ack.record_key.clone();
        let fence = match ack.status {
            JobStatus::Failed => {
                fence.mark_error(ack.error_message.as_deref().unwrap_or_default());
                fence
            }
            JobStatus::Completed | JobStatus::Success => {
                self.animate(&fence).await;
                fence
            }
            JobStatus::Processing => match &self.feed {
                Some(feed) => {
                    self.track_push(&fence, feed.as_ref(), &ack.job_key).await;
                    fence
                }
                None => {
                    let (fence, learned) = self.poll_job(fence, &ack.job_key).await;
                    record_key = record_key.or(learned);
                    fence
                }
            },
        };

        self.await_outcome(&mut watcher, &fence, record_key).await
    }

    /// The job finished before any tracking could start; play the animation
    /// so the outcome is still legible, then close the bar.
    async fn animate(&self, fence: &DriverHandle) {
        log::info!("job already finished server-side; animating progress");
        if run_simulation(fence.clone(), self.config.simulation_plan.clone()).await {
            finish_progress(fence.clone(), self.config.finish_pace).await;
        }
    }

    /// Follow the push feed until it reports a terminal event.
    async fn track_push(&self, fence: &DriverHandle, feed: &dyn EventFeed, job_key: &str) {
        log::info!("tracking job {job_key} over the push feed");
        let events = feed.subscribe(job_key);
        run_push_tracking(fence.clone(), job_key.to_string(), events).await;
        // A feed that closes early would otherwise leave the job dangling.
        if fence.is_current() && !fence.snapshot().phase.is_terminal() {
            log::warn!("event feed for job {job_key} ended without a terminal event");
            fence.mark_error("Lost connection to the extraction service.");
        }
    }

    /// Animate for liveness while polling the real status, then write the
    /// terminal state. Returns the fence holding the write slot and any
    /// record key the poll discovered.
    async fn poll_job(
        &self,
        fence: DriverHandle,
        job_key: &str,
    ) -> (DriverHandle, Option<String>) {
        log::info!("no event feed configured; polling status of job {job_key}");
        let sim = tokio::spawn(run_simulation(
            fence.clone(),
            self.config.simulation_plan.clone(),
        ));
        let outcome = run_status_poll(
            self.backend.as_ref(),
            job_key,
            self.config.poll,
            fence.cancellation(),
        )
        .await;

        // Take over the write slot before touching the store; if a reset
        // raced the poll, the takeover fails and nothing is written.
        let finisher = fence.supersede();
        let _ = sim.await;
        let Some(finisher) = finisher else {
            return (fence, None);
        };

        match outcome {
            Ok(Some(report)) if report.status.is_success() => {
                log::info!("job {job_key} completed; closing out the bar");
                finish_progress(finisher.clone(), self.config.finish_pace).await;
                (finisher, report.record_key)
            }
            Ok(Some(report)) if report.status == JobStatus::Failed => {
                finisher.mark_error(report.error_message.as_deref().unwrap_or_default());
                (finisher, None)
            }
            Ok(Some(_)) => {
                log::warn!("job {job_key} still processing after the poll budget");
                finisher.mark_error("Processing timed out. Please try with a smaller file.");
                (finisher, None)
            }
            // A cancelled poll implies the fence was superseded, so this arm
            // is not reachable in practice.
            Ok(None) => (finisher, None),
            Err(err) => {
                log::warn!("status poll for job {job_key} failed: {err}");
                finisher.mark_error(err.user_message());
                (finisher, None)
            }
        }
    }

    /// Wait for the terminal phase, then fetch the record exactly once.
    async fn await_outcome(
        &self,
        watcher: &mut UnboundedReceiver<ProgressSnapshot>,
        fence: &DriverHandle,
        record_key: Option<String>,
    ) -> Result<InvoiceRecord, OrchestrationError> {
        loop {
            let Some(snapshot) = watcher.recv().await else {
                return Err(OrchestrationError::Cancelled);
            };
            match snapshot.phase {
                Phase::Complete => break,
                Phase::Error => {
                    return Err(OrchestrationError::ExtractionFailed {
                        message: snapshot.message,
                    });
                }
                // The store only returns to Idle on reset.
                Phase::Idle => return Err(OrchestrationError::Cancelled),
                _ => {}
            }
        }

        let Some(record_key) = record_key else {
            log::warn!("extraction completed without ever naming a record key");
            fence.mark_error("The extracted invoice could not be retrieved.");
            return Err(OrchestrationError::MissingRecordKey);
        };
        log::info!("fetching extracted record {record_key}");
        self.backend.fetch_record(&record_key).await.map_err(|err| {
            log::warn!("record fetch failed: {err}");
            fence.mark_error(err.user_message());
            OrchestrationError::RecordFetch(err)
        })
    }
}
