use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Highest priority a workflow can have, and the ceiling for aged priorities.
pub const MAX_PRIORITY: u8 = 10;

/// Optional starvation guard: queued workflows gain priority while they wait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgingPolicy {
    pub boost_per_minute: f64,
}

impl AgingPolicy {
    /// `min(10, priority + minutes_waited * boost_per_minute)`.
    pub fn effective(&self, priority: u8, waited: Duration) -> f64 {
        let minutes = waited.as_secs_f64() / 60.0;
        (f64::from(priority) + minutes * self.boost_per_minute).min(f64::from(MAX_PRIORITY))
    }
}

#[derive(Debug, Clone)]
struct QueuedWorkflow {
    id: Uuid,
    priority: u8,
    enqueued_at: Instant,
    seq: u64,
}

/// Queue contents and running set at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Queued workflows in the order they would be admitted.
    pub queued: Vec<Uuid>,
    pub running: Vec<Uuid>,
    pub max_concurrent: usize,
}

/// Admission queue ordered by priority, then submission order.
#[derive(Debug)]
pub struct PriorityScheduler {
    max_concurrent: usize,
    aging: Option<AgingPolicy>,
    queue: Vec<QueuedWorkflow>,
    running: Vec<Uuid>,
    next_seq: u64,
}

impl PriorityScheduler {
    pub fn new(max_concurrent: usize, aging: Option<AgingPolicy>) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            aging,
            queue: Vec::new(),
            running: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn enqueue(&mut self, id: Uuid, priority: u8) {
        self.enqueue_at(id, priority, Instant::now());
    }

    pub fn enqueue_at(&mut self, id: Uuid, priority: u8, now: Instant) {
        self.queue.push(QueuedWorkflow {
            id,
            priority,
            enqueued_at: now,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    fn effective(&self, entry: &QueuedWorkflow, now: Instant) -> f64 {
        match &self.aging {
            Some(aging) => aging.effective(
                entry.priority,
                now.saturating_duration_since(entry.enqueued_at),
            ),
            None => f64::from(entry.priority),
        }
    }

    /// Higher effective priority first; equal priorities by arrival.
    fn ordering(&self, a: &QueuedWorkflow, b: &QueuedWorkflow, now: Instant) -> std::cmp::Ordering {
        self.effective(b, now)
            .total_cmp(&self.effective(a, now))
            .then(a.seq.cmp(&b.seq))
    }

    pub fn has_capacity(&self) -> bool {
        self.running.len() < self.max_concurrent
    }

    /// Move the best queued workflow into the running set, if a slot is free.
    pub fn admit_next(&mut self, now: Instant) -> Option<Uuid> {
        if !self.has_capacity() {
            return None;
        }
        let best = self
            .queue
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.ordering(a, b, now))
            .map(|(idx, _)| idx)?;
        let entry = self.queue.remove(best);
        self.running.push(entry.id);
        Some(entry.id)
    }

    /// Drop a workflow that is still waiting. Returns whether it was queued.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.queue.len();
        self.queue.retain(|q| q.id != id);
        self.queue.len() != before
    }

    /// Free the running slot held by `id`.
    pub fn release(&mut self, id: Uuid) -> bool {
        let before = self.running.len();
        self.running.retain(|r| *r != id);
        self.running.len() != before
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn snapshot(&self, now: Instant) -> SchedulerSnapshot {
        let mut queued: Vec<&QueuedWorkflow> = self.queue.iter().collect();
        queued.sort_by(|a, b| self.ordering(a, b, now));
        SchedulerSnapshot {
            queued: queued.into_iter().map(|q| q.id).collect(),
            running: self.running.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}
