// Phase timing for --profile output
// (c) 2024 Ross Younger

use std::{
    fmt,
    time::{Duration, Instant},
};

use human_repr::HumanDuration as _;

/// A named interval. `end` is `None` while the phase is still running.
#[derive(Debug, Clone)]
pub struct Phase {
    /// Phase name
    pub name: String,
    start: Instant,
    end: Option<Instant>,
}

impl Phase {
    /// Elapsed time, if the phase has finished
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }
}

/// Back-to-back phases; each one starts the instant the previous one stops.
#[derive(Debug, Default, Clone)]
pub struct PhaseTimer {
    phases: Vec<Phase>,
    stopped: bool,
}

impl PhaseTimer {
    /// Creates a timer with its first phase already running
    #[must_use]
    pub fn new_running(first: &str) -> Self {
        let mut timer = Self::default();
        timer.next(first);
        timer
    }

    /// Ends the current phase (if any) and starts another.
    ///
    /// # Panics
    /// If the timer has been stopped.
    pub fn next(&mut self, name: &str) {
        assert!(!self.stopped, "PhaseTimer already stopped");
        let now = Instant::now();
        if let Some(current) = self.phases.last_mut() {
            current.end = Some(now);
        }
        self.phases.push(Phase {
            name: name.to_string(),
            start: now,
            end: None,
        });
    }

    /// Ends the current phase. No further phases may be added.
    pub fn stop(&mut self) {
        if let Some(current) = self.phases.last_mut() {
            let _ = current.end.get_or_insert_with(Instant::now);
        }
        self.stopped = true;
    }

    /// Looks up a phase by name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Sum of all finished phases
    #[must_use]
    pub fn total(&self) -> Duration {
        self.phases.iter().filter_map(Phase::elapsed).sum()
    }
}

impl fmt::Display for PhaseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.phases.iter().map(|p| p.name.len()).max().unwrap_or(0);
        for phase in &self.phases {
            match phase.elapsed() {
                Some(t) => writeln!(f, "  {:width$}: {}", phase.name, t.human_duration())?,
                None => writeln!(f, "  {:width$}: running", phase.name)?,
            }
        }
        Ok(())
    }
}
