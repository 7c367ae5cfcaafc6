//! Deadline-ordered entry map used by the timer thread.

use crate::model::event::ActiveReminder;
use crate::model::task::{TaskId, Timestamp};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Stale heap items tolerated before the heap is rebuilt from live entries.
const COMPACT_SLACK: usize = 64;

/// Identity of one arming; a replaced entry gets a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) struct TimerHandle(u64);

/// One armed reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ScheduledEntry {
    pub task_id: TaskId,
    pub fire_time: Timestamp,
    pub handle: TimerHandle,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    fire_time: Timestamp,
    handle: TimerHandle,
    task_id: TaskId,
}

/// Live entries plus a min-heap of their deadlines.
///
/// Heap items whose handle no longer matches the live entry are stale and
/// are discarded when they surface.
#[derive(Debug, Default)]
pub(super) struct TimerQueue {
    entries: HashMap<TaskId, ScheduledEntry>,
    deadlines: BinaryHeap<Reverse<Deadline>>,
    next_handle: u64,
}

impl TimerQueue {
    /// Arms an entry, returning the one it replaced.
    pub fn insert(
        &mut self,
        task_id: &str,
        fire_time: Timestamp,
        text: &str,
    ) -> Option<ScheduledEntry> {
        let replaced = self.remove(task_id);
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.deadlines.push(Reverse(Deadline {
            fire_time,
            handle,
            task_id: task_id.to_string(),
        }));
        self.entries.insert(
            task_id.to_string(),
            ScheduledEntry {
                task_id: task_id.to_string(),
                fire_time,
                handle,
                text: text.to_string(),
            },
        );
        replaced
    }

    /// Disarms an entry. Its heap item stays behind as a stale marker.
    pub fn remove(&mut self, task_id: &str) -> Option<ScheduledEntry> {
        let removed = self.entries.remove(task_id);
        if removed.is_some() {
            self.compact_if_needed();
        }
        removed
    }

    /// Pops the earliest live entry whose time is not after `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<ScheduledEntry> {
        loop {
            let Reverse(next) = self.deadlines.peek()?;
            if next.fire_time > now {
                return None;
            }
            let Some(Reverse(due)) = self.deadlines.pop() else {
                return None;
            };
            let live = self
                .entries
                .get(&due.task_id)
                .is_some_and(|entry| entry.handle == due.handle);
            if live {
                return self.entries.remove(&due.task_id);
            }
        }
    }

    /// Earliest deadline in the heap, possibly stale.
    pub fn next_fire_time(&self) -> Option<Timestamp> {
        self.deadlines.peek().map(|Reverse(next)| next.fire_time)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops everything, returning how many live entries were removed.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        self.deadlines.clear();
        cleared
    }

    /// Snapshot ordered by fire time; remaining time clamped at zero.
    pub fn snapshot(&self, now: Timestamp) -> Vec<ActiveReminder> {
        let mut active = self
            .entries
            .values()
            .map(|entry| ActiveReminder {
                task_id: entry.task_id.clone(),
                task_text: entry.text.clone(),
                fire_time: entry.fire_time,
                remaining: (entry.fire_time - now).to_std().unwrap_or(Duration::ZERO),
            })
            .collect::<Vec<_>>();
        active.sort_by(|a, b| {
            a.fire_time
                .cmp(&b.fire_time)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        active
    }

    fn compact_if_needed(&mut self) {
        if self.deadlines.len() <= self.entries.len() * 2 + COMPACT_SLACK {
            return;
        }
        self.deadlines = self
            .entries
            .values()
            .map(|entry| {
                Reverse(Deadline {
                    fire_time: entry.fire_time,
                    handle: entry.handle,
                    task_id: entry.task_id.clone(),
                })
            })
            .collect();
    }

    #[cfg(test)]
    fn heap_len(&self) -> usize {
        self.deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::TimerQueue;
    use chrono::{Duration, Utc};

    #[test]
    fn pop_due_returns_entries_in_deadline_order() {
        let now = Utc::now();
        let mut queue = TimerQueue::default();
        queue.insert("late", now - Duration::seconds(1), "late");
        queue.insert("early", now - Duration::seconds(5), "early");
        queue.insert("future", now + Duration::seconds(60), "future");

        assert_eq!(queue.pop_due(now).unwrap().task_id, "early");
        assert_eq!(queue.pop_due(now).unwrap().task_id, "late");
        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn replaced_entry_leaves_only_stale_marker() {
        let now = Utc::now();
        let mut queue = TimerQueue::default();
        queue.insert("a", now - Duration::seconds(1), "old text");
        let replaced = queue.insert("a", now + Duration::seconds(60), "new text");

        assert_eq!(replaced.unwrap().text, "old text");
        assert!(queue.pop_due(now).is_none(), "stale deadline must not fire");
        assert_eq!(queue.len(), 1);

        let later = now + Duration::seconds(61);
        let fired = queue.pop_due(later).unwrap();
        assert_eq!(fired.text, "new text");
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn removed_entry_never_fires() {
        let now = Utc::now();
        let mut queue = TimerQueue::default();
        queue.insert("a", now, "text");
        assert!(queue.remove("a").is_some());
        assert!(queue.remove("a").is_none());
        assert!(queue.pop_due(now + Duration::seconds(1)).is_none());
    }

    #[test]
    fn heap_is_compacted_after_many_cancellations() {
        let now = Utc::now();
        let mut queue = TimerQueue::default();
        for index in 0..200 {
            let id = format!("task-{index}");
            queue.insert(&id, now + Duration::hours(1), "text");
            queue.remove(&id);
        }
        queue.insert("kept", now + Duration::hours(1), "text");

        assert_eq!(queue.len(), 1);
        assert!(queue.heap_len() <= 2 + super::COMPACT_SLACK + 1);
    }

    #[test]
    fn snapshot_clamps_remaining_time() {
        let now = Utc::now();
        let mut queue = TimerQueue::default();
        queue.insert("past", now - Duration::seconds(10), "p");
        queue.insert("soon", now + Duration::seconds(30), "s");

        let active = queue.snapshot(now);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].task_id, "past");
        assert!(active[0].remaining.is_zero());
        assert_eq!(active[1].remaining, std::time::Duration::from_secs(30));
    }
}
