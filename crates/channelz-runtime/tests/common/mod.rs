#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value as JsonValue;

static REGISTRY_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that touch the global registry and starts each one from
/// an empty registry with uuids counting from 1.
pub fn isolated() -> MutexGuard<'static, ()> {
    let guard = REGISTRY_LOCK.lock();
    channelz_runtime::test_only_reset();
    guard
}

pub fn parse(json: &str) -> JsonValue {
    serde_json::from_str(json).expect("query returned valid json")
}

pub fn trace_event_count(rendered: &JsonValue) -> usize {
    rendered["data"]["trace"]["events"]
        .as_array()
        .map_or(0, Vec::len)
}
