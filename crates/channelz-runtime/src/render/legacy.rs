use channelz_types::{NodeKind, Timestamp, Uuid};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

use super::{insert_if_nonzero, render_address};
use crate::counters::CallCounts;
use crate::node::Node;
use crate::trace::{ChannelTrace, TraceEvent};

type JsonObject = JsonMap<String, JsonValue>;

fn id_string(uuid: Uuid) -> JsonValue {
    JsonValue::String(uuid.to_string())
}

fn timestamp(ts: Timestamp) -> JsonValue {
    JsonValue::String(ts.to_rfc3339())
}

impl Node {
    /// Legacy flattened form for this node's kind.
    pub fn render_json(&self) -> JsonValue {
        let mut object = match self.kind() {
            NodeKind::TopLevelChannel | NodeKind::InternalChannel => self.render_channel(),
            NodeKind::Subchannel => self.render_subchannel(),
            NodeKind::Server => self.render_server(),
            NodeKind::ListenSocket => self.render_listen_socket(),
            NodeKind::Socket => self.render_socket(),
        };
        let additional = self.collect_data();
        if !additional.is_empty() {
            let mut info = JsonObject::new();
            for (name, bundle) in additional.bundles() {
                info.insert(name.to_owned(), bundle.to_json());
            }
            object.insert("additionalInfo".into(), JsonValue::Object(info));
        }
        JsonValue::Object(object)
    }

    fn render_channel(&self) -> JsonObject {
        let mut object = JsonObject::new();
        object.insert(
            "ref".into(),
            json!({"channelId": id_string(self.uuid()), "target": self.target()}),
        );
        object.insert("data".into(), JsonValue::Object(self.channel_data()));
        self.insert_child_refs(&mut object, NodeKind::is_channel, "channelRef", "channelId");
        self.insert_child_refs(
            &mut object,
            |kind| kind == NodeKind::Subchannel,
            "subchannelRef",
            "subchannelId",
        );
        object
    }

    fn render_subchannel(&self) -> JsonObject {
        let mut object = JsonObject::new();
        object.insert(
            "ref".into(),
            json!({"subchannelId": id_string(self.uuid()), "target": self.target()}),
        );
        object.insert("data".into(), JsonValue::Object(self.channel_data()));
        self.insert_socket_refs(&mut object, NodeKind::Socket, "socketRef");
        object
    }

    fn render_server(&self) -> JsonObject {
        let mut object = JsonObject::new();
        object.insert("ref".into(), json!({"serverId": id_string(self.uuid())}));
        let mut data = JsonObject::new();
        self.insert_call_data(&mut data);
        object.insert("data".into(), JsonValue::Object(data));
        self.insert_socket_refs(&mut object, NodeKind::ListenSocket, "listenSocket");
        object
    }

    fn render_listen_socket(&self) -> JsonObject {
        let mut object = JsonObject::new();
        object.insert("ref".into(), self.socket_ref());
        if let Some(local) = self.local_address() {
            object.insert("local".into(), render_address(local));
        }
        object
    }

    fn render_socket(&self) -> JsonObject {
        let mut object = JsonObject::new();
        object.insert("ref".into(), self.socket_ref());
        let counts = self
            .socket_counters()
            .map(|counters| counters.snapshot())
            .unwrap_or_default();
        let mut data = JsonObject::new();
        insert_if_nonzero(&mut data, "streamsStarted", counts.streams_started);
        insert_if_nonzero(&mut data, "streamsSucceeded", counts.streams_succeeded);
        insert_if_nonzero(&mut data, "streamsFailed", counts.streams_failed);
        insert_if_nonzero(&mut data, "messagesSent", counts.messages_sent);
        insert_if_nonzero(&mut data, "messagesReceived", counts.messages_received);
        insert_if_nonzero(&mut data, "keepAlivesSent", counts.keepalives_sent);
        let stamps = [
            ("lastLocalStreamCreatedTimestamp", counts.last_local_stream_created),
            ("lastRemoteStreamCreatedTimestamp", counts.last_remote_stream_created),
            ("lastMessageSentTimestamp", counts.last_message_sent),
            ("lastMessageReceivedTimestamp", counts.last_message_received),
        ];
        for (key, stamp) in stamps {
            if let Some(stamp) = stamp {
                data.insert(key.into(), timestamp(stamp));
            }
        }
        object.insert("data".into(), JsonValue::Object(data));
        if let Some(local) = self.local_address() {
            object.insert("local".into(), render_address(local));
        }
        if let Some(remote) = self.remote_address() {
            object.insert("remote".into(), render_address(remote));
        }
        object
    }

    fn socket_ref(&self) -> JsonValue {
        json!({"socketId": id_string(self.uuid()), "name": self.target()})
    }

    fn channel_data(&self) -> JsonObject {
        let mut data = JsonObject::new();
        if let Some(state) = self.connectivity_state() {
            data.insert("state".into(), json!({"state": state.as_str()}));
        }
        data.insert("target".into(), JsonValue::String(self.target().to_owned()));
        self.insert_call_data(&mut data);
        data
    }

    fn insert_call_data(&self, data: &mut JsonObject) {
        let counts = self
            .call_counters()
            .map(|counters| counters.snapshot())
            .unwrap_or_default();
        insert_call_counts(data, counts);
        if let Some(trace) = self.trace() {
            data.insert("trace".into(), render_trace(trace));
        }
    }

    fn insert_child_refs(
        &self,
        object: &mut JsonObject,
        matches: impl Fn(NodeKind) -> bool,
        key: &str,
        id_key: &str,
    ) {
        let refs: Vec<JsonValue> = self
            .children()
            .into_iter()
            .filter(|(_, kind)| matches(*kind))
            .map(|(uuid, _)| {
                let mut child = JsonObject::new();
                child.insert(id_key.to_owned(), id_string(uuid));
                JsonValue::Object(child)
            })
            .collect();
        if !refs.is_empty() {
            object.insert(key.into(), JsonValue::Array(refs));
        }
    }

    fn insert_socket_refs(&self, object: &mut JsonObject, kind: NodeKind, key: &str) {
        let refs: Vec<JsonValue> = self
            .children()
            .into_iter()
            .filter(|(_, child_kind)| *child_kind == kind)
            .filter_map(|(uuid, _)| crate::registry::lookup(uuid))
            .map(|socket| socket.socket_ref())
            .collect();
        if !refs.is_empty() {
            object.insert(key.into(), JsonValue::Array(refs));
        }
    }
}

fn insert_call_counts(data: &mut JsonObject, counts: CallCounts) {
    insert_if_nonzero(data, "callsStarted", counts.calls_started);
    insert_if_nonzero(data, "callsFailed", counts.calls_failed);
    insert_if_nonzero(data, "callsSucceeded", counts.calls_succeeded);
    if let Some(last) = counts.last_call_started {
        data.insert("lastCallStartedTimestamp".into(), timestamp(last));
    }
}

fn render_trace(trace: &ChannelTrace) -> JsonValue {
    let snapshot = trace.snapshot();
    let mut object = JsonObject::new();
    insert_if_nonzero(&mut object, "numEventsLogged", snapshot.total_events_logged);
    object.insert("creationTimestamp".into(), timestamp(snapshot.created_at));
    if !snapshot.events.is_empty() {
        let events = snapshot.events.iter().map(render_trace_event).collect();
        object.insert("events".into(), JsonValue::Array(events));
    }
    JsonValue::Object(object)
}

fn render_trace_event(event: &TraceEvent) -> JsonValue {
    let mut object = JsonObject::new();
    object.insert(
        "description".into(),
        JsonValue::String(event.description.clone()),
    );
    object.insert(
        "severity".into(),
        JsonValue::String(event.severity.legacy_name().to_owned()),
    );
    object.insert("timestamp".into(), timestamp(event.timestamp));
    match event.referenced {
        Some((uuid, NodeKind::TopLevelChannel | NodeKind::InternalChannel)) => {
            object.insert("channelRef".into(), json!({"channelId": id_string(uuid)}));
        }
        Some((uuid, NodeKind::Subchannel)) => {
            object.insert(
                "subchannelRef".into(),
                json!({"subchannelId": id_string(uuid)}),
            );
        }
        // the legacy event schema only references channels and subchannels
        Some(_) | None => {}
    }
    JsonValue::Object(object)
}
