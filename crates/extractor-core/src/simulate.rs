//! Simulated progress animation for jobs that report no real progress.
//!
//! The animation is a plan of linear segments played by a single cancellable
//! task. It deliberately holds short of 100% and never claims completion;
//! only the orchestrator, once it knows the real outcome, finishes the bar
//! via [`finish_progress`].

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::phase::Phase;
use crate::store::DriverHandle;

/// Updates emitted per segment between the start and end values.
const STEPS_PER_SEGMENT: u32 = 50;

/// Steps used by [`finish_progress`] to close out the bar.
const FINISH_STEPS: u32 = 5;

/// One linear stretch of the simulated animation.
#[derive(Debug, Clone, Copy)]
pub struct SimulationSegment {
    pub phase: Phase,
    pub start_percent: f64,
    pub end_percent: f64,
    pub duration: Duration,
}

/// The default animation plan, paced by the nominal phase durations.
///
/// The last segment holds at 95%; the remaining stretch belongs to
/// [`finish_progress`].
pub fn standard_plan() -> Vec<SimulationSegment> {
    Phase::WORKING
        .iter()
        .scan(0.0, |start, &phase| {
            let end = match phase {
                Phase::Uploading => 20.0,
                Phase::Extracting => 70.0,
                Phase::Interpreting => 90.0,
                _ => 95.0,
            };
            let segment = SimulationSegment {
                phase,
                start_percent: *start,
                end_percent: end,
                duration: Duration::from_secs(phase.nominal_duration_secs()),
            };
            *start = end;
            Some(segment)
        })
        .collect()
}

/// Play an animation plan through the given driver handle.
///
/// Each segment publishes its start value immediately, then
/// [`STEPS_PER_SEGMENT`] evenly spaced interpolated values, then its exact
/// end value. Returns true when the whole plan ran; false when the handle
/// was cancelled or superseded along the way.
pub async fn run_simulation(handle: DriverHandle, segments: Vec<SimulationSegment>) -> bool {
    for segment in &segments {
        if !run_segment(&handle, segment).await {
            log::debug!("simulation stopped in {:?}", segment.phase);
            return false;
        }
    }
    true
}

async fn run_segment(handle: &DriverHandle, segment: &SimulationSegment) -> bool {
    if !handle.publish(segment.phase, segment.start_percent) {
        return false;
    }
    let span = segment.end_percent - segment.start_percent;
    let step = (segment.duration / STEPS_PER_SEGMENT).max(Duration::from_millis(1));
    let mut ticker = time::interval(step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    ticker.tick().await;

    for n in 1..=STEPS_PER_SEGMENT {
        tokio::select! {
            biased;
            _ = handle.cancelled() => return false,
            _ = ticker.tick() => {}
        }
        let fraction = f64::from(n) / f64::from(STEPS_PER_SEGMENT);
        if !handle.publish(segment.phase, segment.start_percent + span * fraction) {
            return false;
        }
    }
    handle.publish(segment.phase, segment.end_percent)
}

/// Animate from the current percentage to 100% and mark the job complete.
///
/// Keeps whatever phase is current and spreads the climb over `total`.
/// Returns false without touching the store when the job is already
/// terminal, or when the handle is superseded mid-animation.
pub async fn finish_progress(handle: DriverHandle, total: Duration) -> bool {
    let snapshot = handle.snapshot();
    if snapshot.phase.is_terminal() {
        return false;
    }
    let start = f64::from(snapshot.percentage);
    let span = 100.0 - start;
    let step = (total / FINISH_STEPS).max(Duration::from_millis(1));
    let mut ticker = time::interval(step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    for n in 1..=FINISH_STEPS {
        tokio::select! {
            biased;
            _ = handle.cancelled() => return false,
            _ = ticker.tick() => {}
        }
        let fraction = f64::from(n) / f64::from(FINISH_STEPS);
        if !handle.publish(snapshot.phase, start + span * fraction) {
            return false;
        }
    }
    handle.mark_complete()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DriverHandle, ProgressSnapshot, ProgressStore};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<ProgressSnapshot>) -> Vec<ProgressSnapshot> {
        let mut out = Vec::new();
        while let Ok(snap) = rx.try_recv() {
            out.push(snap);
        }
        out
    }

    #[test]
    fn standard_plan_covers_the_working_phases_contiguously() {
        let plan = standard_plan();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].start_percent, 0.0);
        assert_eq!(plan[3].end_percent, 95.0);
        for pair in plan.windows(2) {
            assert_eq!(pair[0].end_percent, pair[1].start_percent);
        }
        for (segment, phase) in plan.iter().zip(Phase::WORKING) {
            assert_eq!(segment.phase, phase);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_emits_every_step_and_never_completes() {
        let store = Arc::new(ProgressStore::new());
        let mut rx = store.subscribe();
        let handle = DriverHandle::issue(&store);

        assert!(run_simulation(handle, standard_plan()).await);

        let seen = drain(&mut rx);
        // Idle replay plus (1 start + 50 steps + 1 end) per segment.
        assert_eq!(seen.len(), 1 + 4 * 52);
        assert!(seen.iter().all(|s| !s.phase.is_terminal()));
        for pair in seen[1..].windows(2) {
            assert!(pair[1].percentage >= pair[0].percentage);
        }
        let last = seen.last().expect("at least one snapshot");
        assert_eq!(last.phase, Phase::Saving);
        assert_eq!(last.percentage, 95);
    }

    #[tokio::test(start_paused = true)]
    async fn a_fresh_driver_halts_the_running_simulation() {
        let store = Arc::new(ProgressStore::new());
        let handle = DriverHandle::issue(&store);
        let sim = tokio::spawn(run_simulation(handle, standard_plan()));

        // Let the animation get partway into the second segment.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let replacement = DriverHandle::issue(&store);

        assert!(!sim.await.expect("simulation task panicked"));
        let frozen = store.current().percentage;
        assert!(frozen < 95);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.current().percentage, frozen);
        assert!(replacement.is_current());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_stops_the_simulation_quietly() {
        let store = Arc::new(ProgressStore::new());
        let handle = DriverHandle::issue(&store);
        let sim = tokio::spawn(run_simulation(handle, standard_plan()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        store.reset();
        assert!(!sim.await.expect("simulation task panicked"));

        let mut rx = store.subscribe();
        drain(&mut rx);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(store.current().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_progress_climbs_to_complete() {
        let store = Arc::new(ProgressStore::new());
        let handle = DriverHandle::issue(&store);
        assert!(handle.publish(Phase::Saving, 95.0));
        let mut rx = store.subscribe();
        drain(&mut rx);

        assert!(finish_progress(handle, Duration::from_millis(250)).await);

        let seen = drain(&mut rx);
        let percentages: Vec<u8> = seen.iter().map(|s| s.percentage).collect();
        assert_eq!(percentages, vec![96, 97, 98, 99, 100, 100]);
        let last = seen.last().expect("at least one snapshot");
        assert_eq!(last.phase, Phase::Complete);
        assert_eq!(store.current().percentage, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_progress_is_a_no_op_once_terminal() {
        let store = Arc::new(ProgressStore::new());
        let handle = DriverHandle::issue(&store);
        assert!(handle.mark_complete());
        let mut rx = store.subscribe();
        drain(&mut rx);

        assert!(!finish_progress(handle, Duration::from_millis(250)).await);
        assert!(drain(&mut rx).is_empty());
    }
}
