//! Node renderers: the v2 entity record and the legacy per-kind JSON.

mod entity;
mod legacy;

use channelz_types::{NodeKind, PropertyList};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

use crate::node::Node;

/// Bundles every node of a kind contributes before any data source.
pub(crate) fn builtin_bundles(node: &Node) -> Vec<(&'static str, PropertyList)> {
    let mut bundles = Vec::new();
    if let Some(counters) = node.call_counters() {
        bundles.push(("call_counts", counters.snapshot().to_properties()));
    }
    match node.kind() {
        NodeKind::TopLevelChannel | NodeKind::InternalChannel | NodeKind::Subchannel => {
            let name = if node.kind() == NodeKind::Subchannel {
                "subchannel"
            } else {
                "channel"
            };
            let bundle = PropertyList::new().set("target", node.target()).set_optional(
                "connectivity_state",
                node.connectivity_state().map(|state| state.as_str()),
            );
            bundles.push((name, bundle));
        }
        NodeKind::Socket => {
            let counts = node
                .socket_counters()
                .map(|counters| counters.snapshot())
                .unwrap_or_default();
            let bundle = counts
                .to_properties()
                .set("name", node.target())
                .set_optional("local", node.local_address())
                .set_optional("remote", node.remote_address());
            bundles.push(("socket", bundle));
        }
        NodeKind::Server | NodeKind::ListenSocket => {}
    }
    bundles
}

/// Removes every `additionalInfo` member, at any depth, leaving the strict
/// v1 form.
pub fn strip_additional_info(json: &mut JsonValue) {
    match json {
        JsonValue::Object(object) => {
            object.remove("additionalInfo");
            for value in object.values_mut() {
                strip_additional_info(value);
            }
        }
        JsonValue::Array(values) => {
            for value in values {
                strip_additional_info(value);
            }
        }
        _ => {}
    }
}

/// Legacy address object: `unix:` targets become a uds address, anything
/// else is carried by name.
pub fn render_address(address: &str) -> JsonValue {
    match address.strip_prefix("unix:") {
        Some(filename) => json!({"udsAddress": {"filename": filename}}),
        None => json!({"otherAddress": {"name": address}}),
    }
}

pub(crate) fn insert_if_nonzero(object: &mut JsonMap<String, JsonValue>, key: &str, value: u64) {
    if value != 0 {
        object.insert(key.to_owned(), JsonValue::String(value.to_string()));
    }
}
