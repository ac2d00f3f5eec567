// src/dev_utils.rs

use std::time::{Duration, Instant};

/// Measures one provisioning step, cleanup included.
///
/// [`StepClock::stop`] hands the elapsed time to the caller for the run summary. A
/// clock dropped without being stopped belongs to a step that aborted the sequence and
/// only leaves a debug line behind.
#[derive(Debug)]
pub struct StepClock {
    tag: &'static str,
    start: Instant,
    stopped: bool,
}

impl StepClock {
    pub fn start(tag: &'static str) -> Self {
        Self {
            tag,
            start: Instant::now(),
            stopped: false,
        }
    }

    pub fn stop(mut self) -> Duration {
        self.stopped = true;
        let elapsed = self.start.elapsed();
        log::debug!("[{}] finished in {} ms", self.tag, elapsed.as_millis());
        elapsed
    }
}

impl Drop for StepClock {
    fn drop(&mut self) {
        if !self.stopped {
            log::debug!(
                "[{}] aborted after {} ms",
                self.tag,
                self.start.elapsed().as_millis()
            );
        }
    }
}

/// `1.2s` / `340ms`, for the step summary.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}
