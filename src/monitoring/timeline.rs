//! Execution Timeline
//!
//! Tracks when each step of a run started and finished, for run reports
//! and Gantt charts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// Outcome of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step returned successfully
    Completed,
    /// Step failed and the run went on
    Failed,
    /// Step requested cancellation of the run
    Canceled,
}

/// A single step invocation in the timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the step
    pub step_id: String,
    /// Outcome of the invocation
    pub event_type: EventType,
    /// When the step was invoked
    pub started: Instant,
    /// When the step returned
    pub finished: Instant,
}

impl TimelineEvent {
    pub fn duration(&self) -> Duration {
        self.finished.duration_since(self.started)
    }
}

/// Tracks the execution timeline of a run.
///
/// Steps can run several times within one run (error handlers, `goto`
/// loops), so events are kept in invocation order rather than keyed by
/// step.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
    started_at: DateTime<Local>,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
            started_at: Local::now(),
        }
    }

    /// Records a step invocation that started at `started` and ends now.
    pub fn add_event(&mut self, step_id: impl Into<String>, event_type: EventType, started: Instant) {
        self.events.push(TimelineEvent {
            step_id: step_id.into(),
            event_type,
            started,
            finished: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Names of the invoked steps, in order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.step_id.as_str()).collect()
    }

    /// Number of recorded failures.
    pub fn failure_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::Failed)
            .count()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Wall-clock time the run started.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Returns the accumulated duration of every step in milliseconds.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        let mut durations: HashMap<String, u128> = HashMap::new();
        for event in &self.events {
            *durations.entry(event.step_id.clone()).or_insert(0) += event.duration().as_millis();
        }
        durations
    }

    /// Generates a short textual summary of the run.
    pub fn summary(&self) -> String {
        let mut output = format!(
            "Run started {} | {} step(s), {} failure(s)\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.events.len(),
            self.failure_count()
        );

        for (index, event) in self.events.iter().enumerate() {
            let status = match event.event_type {
                EventType::Completed => "ok",
                EventType::Failed => "failed",
                EventType::Canceled => "canceled",
            };
            output.push_str(&format!(
                "{:>3}. {:20} {:8} {:>6} ms\n",
                index + 1,
                truncate(&event.step_id, 20),
                status,
                event.duration().as_millis()
            ));
        }

        output
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Each invocation is shown as a bar indicating when it ran
    /// relative to the total execution time.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self
            .events
            .last()
            .map(|e| e.finished.duration_since(self.start_time).as_millis())
            .unwrap_or(0);

        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        for event in &self.events {
            let start = event.started.duration_since(self.start_time).as_millis();
            let duration_ms = event.duration().as_millis();

            let start_pos = (start as f64 * scale) as usize;
            let width = (duration_ms as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(width));

            output.push_str(&format!(
                "{:12} |{}| ({} ms)\n",
                truncate(&event.step_id, 12),
                bar,
                duration_ms
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a string to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
