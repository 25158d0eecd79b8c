//! Poll-based status tracking for jobs without a live event feed.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ExtractionBackend, JobStatusReport};

/// Pacing and budget for status polling.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// Poll the backend until the job leaves `Processing` or the attempt budget
/// runs out.
///
/// One status request per tick. Yields exactly one report: the first
/// non-processing one, or the last one seen when the budget is exhausted.
/// Transport errors propagate immediately, without a per-request retry.
/// `Ok(None)` means the poll was cancelled before anything became final and
/// no further requests will be made.
pub async fn run_status_poll<B: ExtractionBackend + ?Sized>(
    backend: &B,
    job_key: &str,
    settings: PollSettings,
    cancel: CancellationToken,
) -> Result<Option<JobStatusReport>, ApiError> {
    let mut ticker = time::interval(settings.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Consume the immediate first tick; the first request happens one
    // interval after the poll starts.
    ticker.tick().await;

    let mut last = None;
    for attempt in 1..=settings.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            _ = ticker.tick() => {}
        }
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            report = backend.job_status(job_key) => report?,
        };
        log::debug!(
            "status poll {attempt}/{}: job {job_key} is {:?}",
            settings.max_attempts,
            report.status
        );
        if report.status.is_terminal() {
            return Ok(Some(report));
        }
        last = Some(report);
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DocumentUpload, InvoiceRecord, JobStatus, SubmissionAck};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedBackend {
        statuses: Mutex<VecDeque<Result<JobStatusReport, ApiError>>>,
        requests: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(statuses: Vec<Result<JobStatusReport, ApiError>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                requests: AtomicU32::new(0),
            }
        }

        fn requests(&self) -> u32 {
            self.requests.load(Ordering::SeqCst)
        }
    }

    fn processing() -> Result<JobStatusReport, ApiError> {
        Ok(JobStatusReport {
            status: JobStatus::Processing,
            record_key: None,
            error_message: None,
        })
    }

    fn completed() -> Result<JobStatusReport, ApiError> {
        Ok(JobStatusReport {
            status: JobStatus::Completed,
            record_key: Some("rec-1".into()),
            error_message: None,
        })
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        async fn submit(&self, _upload: DocumentUpload) -> Result<SubmissionAck, ApiError> {
            unreachable!("poll tests never submit")
        }

        async fn job_status(&self, _job_key: &str) -> Result<JobStatusReport, ApiError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra status request")
        }

        async fn fetch_record(&self, _record_key: &str) -> Result<InvoiceRecord, ApiError> {
            unreachable!("poll tests never fetch records")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_at_the_first_terminal_report() {
        let backend =
            ScriptedBackend::new(vec![processing(), processing(), processing(), completed()]);
        let settings = PollSettings {
            interval: Duration::from_secs(2),
            max_attempts: 5,
        };

        let report = run_status_poll(&backend, "job-1", settings, CancellationToken::new())
            .await
            .unwrap()
            .expect("poll should yield a report");

        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.record_key.as_deref(), Some("rec-1"));
        assert_eq!(backend.requests(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_yields_the_last_processing_report() {
        let backend = ScriptedBackend::new(vec![
            processing(),
            processing(),
            processing(),
            processing(),
            processing(),
        ]);
        let settings = PollSettings {
            interval: Duration::from_secs(2),
            max_attempts: 5,
        };

        let report = run_status_poll(&backend, "job-1", settings, CancellationToken::new())
            .await
            .unwrap()
            .expect("budget exhaustion still yields the last report");

        assert_eq!(report.status, JobStatus::Processing);
        assert_eq!(backend.requests(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_job_ends_the_poll() {
        let backend = ScriptedBackend::new(vec![
            processing(),
            Ok(JobStatusReport {
                status: JobStatus::Failed,
                record_key: None,
                error_message: Some("OCR gave up".into()),
            }),
        ]);

        let report = run_status_poll(
            &backend,
            "job-1",
            PollSettings::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .expect("failure is terminal");

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error_message.as_deref(), Some("OCR gave up"));
        assert_eq!(backend.requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_propagate_immediately() {
        let backend = ScriptedBackend::new(vec![
            processing(),
            Err(ApiError::Transport("connection reset".into())),
        ]);

        let result = run_status_poll(
            &backend,
            "job-1",
            PollSettings::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ApiError::Transport(_))));
        assert_eq!(backend.requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_poll_without_a_report() {
        let backend = std::sync::Arc::new(ScriptedBackend::new(vec![processing(), processing()]));
        let cancel = CancellationToken::new();
        let settings = PollSettings {
            interval: Duration::from_secs(2),
            max_attempts: 10,
        };

        let poll = {
            let backend = std::sync::Arc::clone(&backend);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_status_poll(backend.as_ref(), "job-1", settings, cancel).await
            })
        };

        // Two requests fit into five seconds, then the poll is cancelled.
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let result = poll.await.unwrap().unwrap();
        assert!(result.is_none());
        assert_eq!(backend.requests(), 2);
    }
}
