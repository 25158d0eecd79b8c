//! Progress tracking and orchestration for document extraction jobs.
//!
//! The crate is built around [`ProgressStore`], an ordered multicast of
//! [`ProgressSnapshot`] values. Drivers write into the store through
//! generation-fenced [`DriverHandle`]s: a simulated animation
//! ([`simulate`]), a push-event adapter ([`push`]) and a status poller
//! ([`poll`]). The [`Orchestrator`] ties them to an [`ExtractionBackend`]
//! and runs whole jobs from submission to the fetched record.

pub mod api;
pub mod orchestrator;
pub mod phase;
pub mod poll;
pub mod push;
pub mod simulate;
pub mod store;

pub use api::{
    ApiError, DocumentUpload, ExtractionBackend, InvoiceRecord, JobStatus, JobStatusReport,
    RecordStatus, SubmissionAck,
};
pub use orchestrator::{OrchestrationError, Orchestrator, OrchestratorConfig};
pub use phase::{Phase, PhaseSlot};
pub use poll::{PollSettings, run_status_poll};
pub use push::{EventEffect, EventFeed, ExtractionEvent, run_push_tracking};
pub use simulate::{SimulationSegment, finish_progress, run_simulation, standard_plan};
pub use store::{DriverHandle, ProgressSnapshot, ProgressStore};
