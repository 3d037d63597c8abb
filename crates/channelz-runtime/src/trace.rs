use channelz_types::{NodeKind, Severity, Timestamp, Uuid};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;

/// Fixed per-event accounting overhead, on top of the description bytes.
pub const TRACE_EVENT_OVERHEAD_BYTES: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub description: String,
    pub severity: Severity,
    pub timestamp: Timestamp,
    /// Related node, when the event points at one.
    pub referenced: Option<(Uuid, NodeKind)>,
}

impl TraceEvent {
    pub fn memory_usage(&self) -> usize {
        event_memory_usage(&self.description)
    }
}

pub fn event_memory_usage(description: &str) -> usize {
    TRACE_EVENT_OVERHEAD_BYTES + description.len()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceSnapshot {
    pub created_at: Timestamp,
    pub total_events_logged: u64,
    pub events: Vec<TraceEvent>,
}

struct TraceRing {
    events: VecDeque<TraceEvent>,
    memory_used: usize,
    total_events_logged: u64,
}

/// Byte-budgeted event log with oldest-first eviction.
pub struct ChannelTrace {
    max_memory: usize,
    created_at: Timestamp,
    ring: Mutex<TraceRing>,
}

impl ChannelTrace {
    /// Returns `None` for a zero budget: tracing is disabled entirely.
    pub fn new(max_memory: usize) -> Option<Self> {
        if max_memory == 0 {
            return None;
        }
        Some(Self {
            max_memory,
            created_at: Timestamp::now(),
            ring: Mutex::new(TraceRing {
                events: VecDeque::new(),
                memory_used: 0,
                total_events_logged: 0,
            }),
        })
    }

    pub fn fits(&self, description: &str) -> bool {
        event_memory_usage(description) <= self.max_memory
    }

    /// Appends and evicts until the budget holds again. An event larger
    /// than the whole budget is kept as the sole occupant.
    pub fn add_event(&self, event: TraceEvent) {
        let size = event.memory_usage();
        let mut ring = self.ring.lock();
        ring.total_events_logged += 1;
        ring.memory_used += size;
        ring.events.push_back(event);
        let mut evicted = 0usize;
        while ring.memory_used > self.max_memory && ring.events.len() > 1 {
            let Some(oldest) = ring.events.pop_front() else {
                break;
            };
            ring.memory_used -= oldest.memory_usage();
            evicted += 1;
        }
        if evicted > 0 {
            trace!(
                evicted,
                memory_used = ring.memory_used,
                max_memory = self.max_memory,
                "channel trace evicted old events"
            );
        }
    }

    pub fn memory_used(&self) -> usize {
        self.ring.lock().memory_used
    }

    pub fn snapshot(&self) -> TraceSnapshot {
        let ring = self.ring.lock();
        TraceSnapshot {
            created_at: self.created_at,
            total_events_logged: ring.total_events_logged,
            events: ring.events.iter().cloned().collect(),
        }
    }
}
