use channelz_types::{PropertyList, Timestamp};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{cycle_now, cycle_to_timestamp};

/// Call outcome counters shared by channels, subchannels and servers.
///
/// Counters only ever grow. A rendered snapshot may observe the three
/// counters out of step by the number of in-flight record calls.
#[derive(Debug, Default)]
pub struct CallCounters {
    calls_started: AtomicU64,
    calls_failed: AtomicU64,
    calls_succeeded: AtomicU64,
    last_call_started_cycle: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub calls_started: u64,
    pub calls_failed: u64,
    pub calls_succeeded: u64,
    pub last_call_started: Option<Timestamp>,
}

impl CallCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call_started(&self) {
        record_stamp(&self.last_call_started_cycle);
        self.calls_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_failed(&self) {
        self.calls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_succeeded(&self) {
        self.calls_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Wall-clock time of the most recent `record_call_started`.
    pub fn last_call_started_time(&self) -> Option<Timestamp> {
        stamp(&self.last_call_started_cycle)
    }

    pub fn snapshot(&self) -> CallCounts {
        CallCounts {
            calls_started: self.calls_started.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            calls_succeeded: self.calls_succeeded.load(Ordering::Relaxed),
            last_call_started: self.last_call_started_time(),
        }
    }
}

impl CallCounts {
    pub(crate) fn to_properties(self) -> PropertyList {
        PropertyList::new()
            .set("calls_started", self.calls_started)
            .set("calls_failed", self.calls_failed)
            .set("calls_succeeded", self.calls_succeeded)
            .set_optional("last_call_started_timestamp", self.last_call_started)
    }
}

/// Stream, message and keepalive counters carried by socket nodes.
#[derive(Debug, Default)]
pub struct SocketCounters {
    streams_started: AtomicU64,
    streams_succeeded: AtomicU64,
    streams_failed: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    keepalives_sent: AtomicU64,
    last_local_stream_created_cycle: AtomicU64,
    last_remote_stream_created_cycle: AtomicU64,
    last_message_sent_cycle: AtomicU64,
    last_message_received_cycle: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SocketCounts {
    pub streams_started: u64,
    pub streams_succeeded: u64,
    pub streams_failed: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub keepalives_sent: u64,
    pub last_local_stream_created: Option<Timestamp>,
    pub last_remote_stream_created: Option<Timestamp>,
    pub last_message_sent: Option<Timestamp>,
    pub last_message_received: Option<Timestamp>,
}

fn stamp(cycle: &AtomicU64) -> Option<Timestamp> {
    match cycle.load(Ordering::Relaxed) {
        0 => None,
        raw => Some(cycle_to_timestamp(raw)),
    }
}

// Zero marks "never stamped"; a genuine zero reading is nudged to one.
fn record_stamp(cycle: &AtomicU64) {
    cycle.store(cycle_now().max(1), Ordering::Relaxed);
}

impl SocketCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stream_started_from_local(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
        record_stamp(&self.last_local_stream_created_cycle);
    }

    pub fn record_stream_started_from_remote(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
        record_stamp(&self.last_remote_stream_created_cycle);
    }

    pub fn record_stream_succeeded(&self) {
        self.streams_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_failed(&self) {
        self.streams_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_messages_sent(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
        record_stamp(&self.last_message_sent_cycle);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        record_stamp(&self.last_message_received_cycle);
    }

    pub fn record_keepalive_sent(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SocketCounts {
        SocketCounts {
            streams_started: self.streams_started.load(Ordering::Relaxed),
            streams_succeeded: self.streams_succeeded.load(Ordering::Relaxed),
            streams_failed: self.streams_failed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            last_local_stream_created: stamp(&self.last_local_stream_created_cycle),
            last_remote_stream_created: stamp(&self.last_remote_stream_created_cycle),
            last_message_sent: stamp(&self.last_message_sent_cycle),
            last_message_received: stamp(&self.last_message_received_cycle),
        }
    }
}

impl SocketCounts {
    pub(crate) fn to_properties(self) -> PropertyList {
        PropertyList::new()
            .set("streams_started", self.streams_started)
            .set("streams_succeeded", self.streams_succeeded)
            .set("streams_failed", self.streams_failed)
            .set("messages_sent", self.messages_sent)
            .set("messages_received", self.messages_received)
            .set("keepalives_sent", self.keepalives_sent)
            .set_optional("last_local_stream_created_timestamp", self.last_local_stream_created)
            .set_optional(
                "last_remote_stream_created_timestamp",
                self.last_remote_stream_created,
            )
            .set_optional("last_message_sent_timestamp", self.last_message_sent)
            .set_optional("last_message_received_timestamp", self.last_message_received)
    }
}
