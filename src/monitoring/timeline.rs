//! Execution Timeline
//!
//! Records what the durable context did with each step attempt during
//! one run, for the end-of-run report and Gantt chart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What happened to a step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Side effect started executing
    Started,
    /// Side effect finished and its output was recorded
    Completed,
    /// Side effect failed
    Failed,
    /// Already completed by an earlier run; recorded output returned
    Skipped,
    /// Abandoned `RUNNING` record marked failed before retrying
    Recovered,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Step key the event belongs to
    pub step_key: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
}

/// Tracks the execution timeline of a workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a step attempt.
    pub fn add_event(&mut self, step_key: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            step_key: step_key.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Number of events of one type.
    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }

    /// Step keys that saw an event of the given type, in order.
    pub fn keys_with(&self, event_type: EventType) -> Vec<&str> {
        self.events
            .iter()
            .filter(|event| event.event_type == event_type)
            .map(|event| event.step_key.as_str())
            .collect()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// One-line tally of the run.
    pub fn summary(&self) -> String {
        format!(
            "executed: {}, failed: {}, skipped: {}, recovered: {}",
            self.count(EventType::Completed),
            self.count(EventType::Failed),
            self.count(EventType::Skipped),
            self.count(EventType::Recovered)
        )
    }

    /// Generates an ASCII Gantt chart of the attempts that actually ran.
    ///
    /// Skipped and recovered attempts have no duration and are listed
    /// below the chart instead.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = Instant::now().duration_since(self.start_time).as_millis();

        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut bars: Vec<(String, u128, u128)> = self
            .spans()
            .into_iter()
            .map(|(key, (start, end))| (key, start, end))
            .collect();
        bars.sort_by_key(|(_, start, _)| *start);

        for (step_key, start, end) in bars {
            let start_pos = (start as f64 * scale) as usize;
            let width = (((end - start) as f64) * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(width));

            output.push_str(&format!(
                "{:20} |{}| ({} ms)\n",
                truncate(&step_key, 20),
                bar,
                end - start
            ));
        }

        for event_type in [EventType::Skipped, EventType::Recovered] {
            let keys = self.keys_with(event_type);
            if !keys.is_empty() {
                output.push_str(&format!("\n{:?}: {}", event_type, keys.join(", ")));
            }
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns durations in milliseconds of attempts that finished.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|(key, (start, end))| (key, end - start))
            .collect()
    }

    /// Start and end offsets of every attempt that started and finished.
    fn spans(&self) -> HashMap<String, (u128, u128)> {
        let mut starts: HashMap<&str, u128> = HashMap::new();
        let mut spans = HashMap::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();

            match event.event_type {
                EventType::Started => {
                    starts.insert(&event.step_key, elapsed);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(event.step_key.as_str()) {
                        spans.insert(event.step_key.clone(), (*start, elapsed));
                    }
                }
                EventType::Skipped | EventType::Recovered => {}
            }
        }

        spans
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.get_events().is_empty());
    }

    #[test]
    fn test_get_durations() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("createEmployee-1", EventType::Started);
        thread::sleep(Duration::from_millis(50));
        timeline.add_event("createEmployee-1", EventType::Completed);

        let durations = timeline.get_durations();
        assert!(*durations.get("createEmployee-1").unwrap() >= 50);
    }

    #[test]
    fn test_skips_have_no_duration() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a-1", EventType::Skipped);
        timeline.add_event("b-2", EventType::Recovered);
        timeline.add_event("b-3", EventType::Started);

        assert!(timeline.get_durations().is_empty());
        assert_eq!(timeline.keys_with(EventType::Recovered), vec!["b-2"]);
    }

    #[test]
    fn test_summary_counts() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a-1", EventType::Skipped);
        timeline.add_event("b-2", EventType::Recovered);
        timeline.add_event("b-3", EventType::Started);
        timeline.add_event("b-3", EventType::Completed);
        timeline.add_event("c-4", EventType::Started);
        timeline.add_event("c-4", EventType::Failed);

        assert_eq!(
            timeline.summary(),
            "executed: 1, failed: 1, skipped: 1, recovered: 1"
        );
    }

    #[test]
    fn test_gantt_chart_generation() {
        let mut timeline = ExecutionTimeline::new();

        timeline.add_event("provisionLaptop-2", EventType::Started);
        timeline.add_event("provisionAccess-3", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("provisionAccess-3", EventType::Completed);
        timeline.add_event("provisionLaptop-2", EventType::Completed);
        timeline.add_event("createEmployee-1", EventType::Skipped);

        let chart = timeline.gantt_chart();
        assert!(chart.contains("provisionLaptop-2"));
        assert!(chart.contains("provisionAccess-3"));
        assert!(chart.contains("Skipped: createEmployee-1"));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_truncate_long_keys() {
        assert_eq!(truncate("short", 8), "short   ");
        assert_eq!(truncate("averyveryverylongstepname-12", 10), "averyve...");
    }
}
