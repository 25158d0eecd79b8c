//! Push-event tracking for jobs whose progress arrives over a live feed.
//!
//! Events carry their own percentages, so no animation is involved; the
//! adapter translates event types to phases and forwards them through a
//! driver handle until the first terminal event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::phase::Phase;
use crate::store::DriverHandle;

/// A progress event as published by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub extraction_key: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

/// What an event does to tracked progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEffect {
    /// Progress update within a working phase.
    Update(Phase),
    Complete,
    Fail,
    /// Unrecognized event type; skipped without error.
    Ignore,
}

impl ExtractionEvent {
    /// The effect this event has on tracked progress.
    pub fn effect(&self) -> EventEffect {
        match self.event_type.as_str() {
            "EXTRACTION_STARTED" => EventEffect::Update(Phase::Uploading),
            "OCR_STARTED" | "OCR_PROGRESS" | "OCR_COMPLETED" => {
                EventEffect::Update(Phase::Extracting)
            }
            "LLM_STARTED" | "LLM_PROGRESS" | "LLM_COMPLETED" => {
                EventEffect::Update(Phase::Interpreting)
            }
            "SAVING_STARTED" | "SAVING" => EventEffect::Update(Phase::Saving),
            "EXTRACTION_COMPLETED" => EventEffect::Complete,
            "EXTRACTION_FAILED" => EventEffect::Fail,
            _ => EventEffect::Ignore,
        }
    }
}

/// Source of push events for extraction jobs, typically a WebSocket client.
pub trait EventFeed: Send + Sync {
    /// Subscribe to the event stream of one job.
    fn subscribe(&self, job_key: &str) -> UnboundedReceiver<ExtractionEvent>;
}

/// Track one job from a live event stream.
///
/// Events for other jobs are skipped. Working-phase events forward the
/// event's percentage, with the event message winning over the phase default
/// when it is non-empty. The first terminal event writes the terminal state
/// and ends tracking, so later events can never mutate the store. Also ends
/// when the feed closes or the handle is superseded.
pub async fn run_push_tracking(
    handle: DriverHandle,
    job_key: String,
    mut events: UnboundedReceiver<ExtractionEvent>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = handle.cancelled() => return,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    log::debug!("event feed for job {job_key} closed without a terminal event");
                    return;
                }
            },
        };
        if event.extraction_key != job_key {
            continue;
        }
        match event.effect() {
            EventEffect::Update(phase) => {
                if !handle.publish_with_message(phase, event.progress, Some(&event.message)) {
                    return;
                }
            }
            EventEffect::Complete => {
                handle.mark_complete();
                return;
            }
            EventEffect::Fail => {
                handle.mark_error(&event.message);
                return;
            }
            EventEffect::Ignore => {
                log::debug!("ignoring unrecognized event type {:?}", event.event_type);
            }
        }
    }
}
