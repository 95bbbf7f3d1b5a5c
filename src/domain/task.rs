use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sighting::Sighting;

/// Deadline picked for a task whose sighting carried no capture time
pub const DEADLINE_RANGE: RangeInclusive<u32> = 5..=14;

/// A time-bounded unit of work derived from one sighting
///
/// Serialized with the sighting fields inlined next to `taskId` and
/// `deadlineSeconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTask {
    pub task_id: u64,
    #[serde(flatten)]
    pub sighting: Sighting,
    pub deadline_seconds: u32,
}

impl CaptureTask {
    pub fn new(task_id: u64, sighting: Sighting, deadline_seconds: u32) -> Self {
        Self {
            task_id,
            sighting,
            deadline_seconds,
        }
    }

    /// Time the task may sit in the work queue before it is dead-lettered
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(u64::from(self.deadline_seconds) * 1000)
    }
}

/// Monotonic source of task ids
///
/// Ids are unique within one counter. Two dispatchers with separate
/// counters would hand out overlapping ids.
#[derive(Debug, Default)]
pub struct TaskIdCounter {
    next: AtomicU64,
}

impl TaskIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id, starting at 0
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> CaptureTask {
        CaptureTask::new(3, Sighting::new("Pikachu", "Park", "electric"), 9)
    }

    #[test]
    fn serializes_flat_camel_case() {
        let json = serde_json::to_value(task()).unwrap();

        assert_eq!(json["taskId"], 3);
        assert_eq!(json["pokemon"], "Pikachu");
        assert_eq!(json["category"], "electric");
        assert_eq!(json["deadlineSeconds"], 9);
    }

    #[test]
    fn round_trip() {
        let bytes = serde_json::to_vec(&task()).unwrap();
        let decoded: CaptureTask = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, task());
    }

    #[test]
    fn expiration_in_milliseconds() {
        assert_eq!(task().expiration(), Duration::from_millis(9000));
    }

    #[test]
    fn counter_is_strictly_increasing() {
        let counter = TaskIdCounter::new();
        let ids: Vec<u64> = (0..5).map(|_| counter.next_id()).collect();

        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(counter.issued(), 5);
    }

    #[test]
    fn malformed_task_is_an_error() {
        let result = serde_json::from_str::<CaptureTask>(r#"{"taskId":"seven"}"#);
        assert!(result.is_err());
    }
}
