mod common;

use channelz_runtime::{
    ChannelNode, DEFAULT_TRACE_MEMORY, ListenSocketNode, ServerNode, SocketNode, SubchannelNode,
    get_channel, get_server, get_server_sockets, get_servers, get_socket, get_subchannel,
    get_top_channels, new_channel_from_args, new_server_from_args,
};
use channelz_types::{
    ChannelArgs, ConnectivityState, ENABLE_CHANNELZ, MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE,
    Severity,
};
use common::{isolated, parse, trace_event_count};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

fn channel_json(channel: &ChannelNode) -> JsonValue {
    let id = i64::try_from(channel.uuid().get()).expect("uuid fits i64");
    let reply = parse(&get_channel(id).expect("channel is registered"));
    reply["channel"].clone()
}

fn last_call_started(channel: &ChannelNode) -> JsonValue {
    channel_json(channel)["data"]["lastCallStartedTimestamp"].clone()
}

#[test]
fn call_counters_accumulate() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///counters", DEFAULT_TRACE_MEMORY, false);

    channel.record_call_started();
    channel.record_call_failed();
    channel.record_call_succeeded();
    let data = channel_json(&channel)["data"].clone();
    assert_eq!(data["callsStarted"], "1");
    assert_eq!(data["callsFailed"], "1");
    assert_eq!(data["callsSucceeded"], "1");

    for _ in 0..2 {
        channel.record_call_started();
        channel.record_call_failed();
        channel.record_call_succeeded();
    }
    let data = channel_json(&channel)["data"].clone();
    assert_eq!(data["callsStarted"], "3");
    assert_eq!(data["callsFailed"], "3");
    assert_eq!(data["callsSucceeded"], "3");
}

#[test]
fn zero_counters_are_omitted() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///fresh", DEFAULT_TRACE_MEMORY, false);
    channel.record_call_failed();
    let data = channel_json(&channel)["data"].clone();
    assert_eq!(data["callsFailed"], "1");
    assert!(data.get("callsStarted").is_none());
    assert!(data.get("callsSucceeded").is_none());
    assert!(data.get("lastCallStartedTimestamp").is_none());
    assert_eq!(data["target"], "dns:///fresh");
}

#[test]
fn last_call_started_timestamp_moves_only_on_start() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///timestamps", DEFAULT_TRACE_MEMORY, false);

    channel.record_call_started();
    let t1 = last_call_started(&channel);
    assert!(t1.is_string());

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(last_call_started(&channel), t1);

    channel.record_call_failed();
    channel.record_call_succeeded();
    assert_eq!(last_call_started(&channel), t1);

    std::thread::sleep(Duration::from_millis(5));
    channel.record_call_started();
    assert_ne!(last_call_started(&channel), t1);
}

#[test]
fn initial_trace_event_depends_on_budget() {
    let _guard = isolated();
    for (budget, expected) in [(0, 0), (8, 0), (64, 0), (1024, 1), (1024 * 1024, 1)] {
        let channel = ChannelNode::new("dns:///budget", budget, false);
        let rendered = channel_json(&channel);
        assert_eq!(trace_event_count(&rendered), expected, "budget {budget}");
        if expected == 1 {
            let event = &rendered["data"]["trace"]["events"][0];
            assert_eq!(event["description"], "Channel created");
            assert_eq!(event["severity"], "CT_INFO");
        }
    }
}

#[test]
fn zero_budget_renders_no_trace() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///silent", 0, false);
    channel.add_trace_event(Severity::Warning, "dropped on the floor");
    assert!(channel_json(&channel)["data"].get("trace").is_none());
}

#[test]
fn trace_events_render_in_order_with_references() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///traced", DEFAULT_TRACE_MEMORY, false);
    let subchannel = SubchannelNode::new("ipv4:10.0.0.1:443", DEFAULT_TRACE_MEMORY);
    channel.add_trace_event(Severity::Warning, "resolver returned no addresses");
    channel.add_trace_event_with_reference(Severity::Info, "subchannel picked", &subchannel);

    let trace = channel_json(&channel)["data"]["trace"].clone();
    assert_eq!(trace["numEventsLogged"], "3");
    assert!(trace["creationTimestamp"].is_string());
    let events = trace["events"].as_array().expect("events present");
    let descriptions: Vec<&str> = events
        .iter()
        .filter_map(|event| event["description"].as_str())
        .collect();
    assert_eq!(
        descriptions,
        ["Channel created", "resolver returned no addresses", "subchannel picked"]
    );
    assert_eq!(events[1]["severity"], "CT_WARNING");
    assert_eq!(
        events[2]["subchannelRef"],
        json!({"subchannelId": subchannel.uuid().to_string()})
    );
}

#[test]
fn uuids_are_allocated_in_order() {
    let _guard = isolated();
    let channels: Vec<ChannelNode> = (0..50)
        .map(|i| ChannelNode::new(format!("dns:///c{i}"), DEFAULT_TRACE_MEMORY, false))
        .collect();
    let reply = parse(&get_top_channels(0).expect("valid start"));
    let ids: Vec<String> = reply["channel"]
        .as_array()
        .expect("channel array")
        .iter()
        .filter_map(|channel| channel["ref"]["channelId"].as_str().map(str::to_owned))
        .collect();
    let expected: Vec<String> = (1..=50).map(|id: u64| id.to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(reply["end"], true);
    assert_eq!(channels[49].uuid().get(), 50);
}

#[test]
fn top_channels_paginate_by_one_hundred() {
    let _guard = isolated();
    let _channels: Vec<ChannelNode> = (0..150)
        .map(|i| ChannelNode::new(format!("dns:///page{i}"), 0, false))
        .collect();

    let first = parse(&get_top_channels(0).expect("valid start"));
    assert_eq!(first["channel"].as_array().map(Vec::len), Some(100));
    assert_eq!(first["end"], false);

    let second = parse(&get_top_channels(101).expect("valid start"));
    assert_eq!(second["channel"].as_array().map(Vec::len), Some(50));
    assert_eq!(second["end"], true);
    assert_eq!(second["channel"][0]["ref"]["channelId"], "101");
}

#[test]
fn exactly_one_full_page_ends_the_walk() {
    let _guard = isolated();
    let _channels: Vec<ChannelNode> = (0..100)
        .map(|i| ChannelNode::new(format!("dns:///full{i}"), 0, false))
        .collect();
    let reply = parse(&get_top_channels(0).expect("valid start"));
    assert_eq!(reply["channel"].as_array().map(Vec::len), Some(100));
    assert_eq!(reply["end"], true);
}

#[test]
fn internal_channels_are_hidden_from_top_channels() {
    let _guard = isolated();
    let _channels: Vec<ChannelNode> = (0..10)
        .map(|i| ChannelNode::new(format!("dns:///visible{i}"), DEFAULT_TRACE_MEMORY, false))
        .collect();
    let internal = ChannelNode::new("dns:///internal", DEFAULT_TRACE_MEMORY, true);

    let reply = parse(&get_top_channels(0).expect("valid start"));
    let listed = reply["channel"].as_array().expect("channel array");
    assert_eq!(listed.len(), 10);
    let internal_id = internal.uuid().to_string();
    assert!(
        listed
            .iter()
            .all(|channel| channel["ref"]["channelId"] != internal_id.as_str())
    );

    let direct = channel_json(&internal);
    assert_eq!(direct["ref"]["channelId"], internal_id.as_str());
}

#[test]
fn disabled_channelz_builds_no_node() {
    let _guard = isolated();
    let args = ChannelArgs::new().set(ENABLE_CHANNELZ, false);
    assert!(new_channel_from_args("dns:///disabled", &args).is_none());
    assert!(new_server_from_args(&args).is_none());
    let reply = parse(&get_top_channels(0).expect("valid start"));
    assert_eq!(reply["channel"], json!([]));
}

#[test]
fn channel_args_choose_the_trace_budget() {
    let _guard = isolated();
    let args = ChannelArgs::new().set(MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE, 1024);
    let channel = new_channel_from_args("dns:///args", &args).expect("channelz enabled");
    assert_eq!(trace_event_count(&channel_json(&channel)), 1);
}

#[test]
fn destroyed_nodes_are_not_found() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///short-lived", DEFAULT_TRACE_MEMORY, false);
    let id = i64::try_from(channel.uuid().get()).expect("uuid fits i64");
    drop(channel);
    let err = get_channel(id).expect_err("node was destroyed");
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn lookups_check_the_kind() {
    let _guard = isolated();
    let server = ServerNode::new(DEFAULT_TRACE_MEMORY);
    let id = i64::try_from(server.uuid().get()).expect("uuid fits i64");
    assert!(get_server(id).is_ok());
    assert_eq!(get_channel(id).map_err(|e| e.kind()), Err("not_found"));
    assert_eq!(get_subchannel(id).map_err(|e| e.kind()), Err("not_found"));
}

#[test]
fn channel_lists_its_children() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///parent", DEFAULT_TRACE_MEMORY, false);
    let subchannel = SubchannelNode::new("ipv4:10.0.0.2:443", DEFAULT_TRACE_MEMORY);
    let internal = ChannelNode::new("dns:///lb", DEFAULT_TRACE_MEMORY, true);
    channel.add_child_subchannel(&subchannel);
    channel.add_child_channel(&internal);
    channel.set_connectivity_state(ConnectivityState::Ready);

    let rendered = channel_json(&channel);
    assert_eq!(rendered["data"]["state"], json!({"state": "READY"}));
    assert_eq!(
        rendered["subchannelRef"],
        json!([{"subchannelId": subchannel.uuid().to_string()}])
    );
    assert_eq!(
        rendered["channelRef"],
        json!([{"channelId": internal.uuid().to_string()}])
    );

    let subchannel_id = subchannel.uuid();
    drop(subchannel);
    assert!(channel_json(&channel).get("subchannelRef").is_none());
    channel.remove_child_subchannel(subchannel_id);
}

#[test]
fn subchannel_renders_owned_sockets() {
    let _guard = isolated();
    let subchannel = SubchannelNode::new("ipv4:10.0.0.3:443", DEFAULT_TRACE_MEMORY);
    let socket = SocketNode::new(
        "10.0.0.9:5000 -> 10.0.0.3:443",
        Some("ipv4:10.0.0.9:5000".into()),
        Some("ipv4:10.0.0.3:443".into()),
    );
    subchannel.add_child_socket(&socket);
    let socket_id = socket.uuid();
    drop(socket);

    let id = i64::try_from(subchannel.uuid().get()).expect("uuid fits i64");
    let reply = parse(&get_subchannel(id).expect("subchannel registered"));
    assert_eq!(
        reply["subchannel"]["socketRef"],
        json!([{"socketId": socket_id.to_string(), "name": "10.0.0.9:5000 -> 10.0.0.3:443"}])
    );
}

#[test]
fn servers_list_and_page_their_sockets() {
    let _guard = isolated();
    let server = ServerNode::new(DEFAULT_TRACE_MEMORY);
    let listener = ListenSocketNode::new("[::]:50051", Some("ipv6:[::]:50051".into()));
    server.add_child_listen_socket(&listener);
    let sockets: Vec<SocketNode> = (0..150)
        .map(|i| {
            let socket = SocketNode::new(format!("peer-{i}"), None, None);
            server.add_child_socket(&socket);
            socket
        })
        .collect();
    server.record_call_started();

    let servers = parse(&get_servers(0).expect("valid start"));
    let listed = servers["server"].as_array().expect("server array");
    assert_eq!(listed.len(), 1);
    assert_eq!(servers["end"], true);
    assert_eq!(listed[0]["data"]["callsStarted"], "1");
    assert_eq!(
        listed[0]["listenSocket"],
        json!([{"socketId": listener.uuid().to_string(), "name": "[::]:50051"}])
    );

    let server_id = i64::try_from(server.uuid().get()).expect("uuid fits i64");
    let first = parse(&get_server_sockets(server_id, 0).expect("server registered"));
    let refs = first["socketRef"].as_array().expect("socketRef array");
    assert_eq!(refs.len(), 100);
    assert_eq!(first["end"], false);
    assert_eq!(refs[0]["name"], "peer-0");

    let resume = i64::try_from(sockets[100].uuid().get()).expect("uuid fits i64");
    let second = parse(&get_server_sockets(server_id, resume).expect("server registered"));
    assert_eq!(second["socketRef"].as_array().map(Vec::len), Some(50));
    assert_eq!(second["end"], true);
}

#[test]
fn sockets_render_counters_and_addresses() {
    let _guard = isolated();
    let socket = SocketNode::new(
        "uds peer",
        Some("unix:/tmp/server.sock".into()),
        Some("unix:/tmp/client.sock".into()),
    );
    socket.record_stream_started_from_local();
    socket.record_stream_succeeded();
    socket.record_messages_sent(4);
    socket.record_keepalive_sent();

    let id = i64::try_from(socket.uuid().get()).expect("uuid fits i64");
    let reply = parse(&get_socket(id).expect("socket registered"));
    let rendered = &reply["socket"];
    assert_eq!(rendered["ref"]["name"], "uds peer");
    assert_eq!(rendered["data"]["streamsStarted"], "1");
    assert_eq!(rendered["data"]["streamsSucceeded"], "1");
    assert_eq!(rendered["data"]["messagesSent"], "4");
    assert_eq!(rendered["data"]["keepAlivesSent"], "1");
    assert!(rendered["data"].get("streamsFailed").is_none());
    assert!(rendered["data"]["lastLocalStreamCreatedTimestamp"].is_string());
    assert!(rendered["data"].get("lastRemoteStreamCreatedTimestamp").is_none());
    assert_eq!(
        rendered["local"],
        json!({"udsAddress": {"filename": "/tmp/server.sock"}})
    );
    assert_eq!(
        rendered["remote"],
        json!({"udsAddress": {"filename": "/tmp/client.sock"}})
    );
}

#[test]
fn orphaned_server_releases_listen_sockets() {
    let _guard = isolated();
    let server = ServerNode::new(DEFAULT_TRACE_MEMORY);
    let listener = ListenSocketNode::new("0.0.0.0:443", None);
    server.add_child_listen_socket(&listener);
    let listener_id = i64::try_from(listener.uuid().get()).expect("uuid fits i64");
    drop(listener);
    assert!(get_socket(listener_id).is_ok());

    drop(server);
    assert_eq!(get_socket(listener_id).map_err(|e| e.kind()), Err("not_found"));
}

#[test]
fn rendering_twice_is_byte_identical() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///stable", DEFAULT_TRACE_MEMORY, false);
    channel.record_call_started();
    channel.add_trace_event(Severity::Error, "connect failed");
    let id = i64::try_from(channel.uuid().get()).expect("uuid fits i64");
    let first = get_channel(id).expect("registered");
    let second = get_channel(id).expect("registered");
    assert_eq!(first, second);
}

#[test]
fn counters_survive_concurrent_recording() {
    let _guard = isolated();
    let channel = ChannelNode::new("dns:///concurrent", DEFAULT_TRACE_MEMORY, false);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..250 {
                    channel.record_call_started();
                    channel.record_call_succeeded();
                }
            });
        }
    });
    let data = channel_json(&channel)["data"].clone();
    assert_eq!(data["callsStarted"], "1000");
    assert_eq!(data["callsSucceeded"], "1000");
}

fn server_json(server: &ServerNode) -> JsonValue {
    let id = i64::try_from(server.uuid().get()).expect("uuid fits i64");
    parse(&get_server(id).expect("server is registered"))["server"].clone()
}

#[test]
fn server_call_counters_accumulate() {
    let _guard = isolated();
    let server = ServerNode::new(DEFAULT_TRACE_MEMORY);

    server.record_call_started();
    server.record_call_failed();
    server.record_call_succeeded();
    let data = server_json(&server)["data"].clone();
    assert_eq!(data["callsStarted"], "1");
    assert_eq!(data["callsFailed"], "1");
    assert_eq!(data["callsSucceeded"], "1");
    assert!(data["lastCallStartedTimestamp"].is_string());

    for _ in 0..2 {
        server.record_call_started();
        server.record_call_failed();
        server.record_call_succeeded();
    }
    let data = server_json(&server)["data"].clone();
    assert_eq!(data["callsStarted"], "3");
    assert_eq!(data["callsFailed"], "3");
    assert_eq!(data["callsSucceeded"], "3");
}

#[test]
fn no_servers_is_an_empty_final_page() {
    let _guard = isolated();
    let _channel = ChannelNode::new("dns:///not-a-server", DEFAULT_TRACE_MEMORY, false);
    let reply = parse(&get_servers(0).expect("valid start"));
    assert_eq!(reply, json!({"server": [], "end": true}));
}

#[test]
fn many_servers_are_listed_in_order() {
    let _guard = isolated();
    let servers: Vec<ServerNode> = (0..10).map(|_| ServerNode::new(0)).collect();
    let reply = parse(&get_servers(0).expect("valid start"));
    let ids: Vec<&str> = reply["server"]
        .as_array()
        .expect("server array")
        .iter()
        .filter_map(|server| server["ref"]["serverId"].as_str())
        .collect();
    let expected: Vec<String> = servers.iter().map(|s| s.uuid().to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(reply["end"], true);
}

#[test]
fn servers_paginate_by_one_hundred() {
    let _guard = isolated();
    let _servers: Vec<ServerNode> = (0..150).map(|_| ServerNode::new(0)).collect();

    let first = parse(&get_servers(0).expect("valid start"));
    assert_eq!(first["server"].as_array().map(Vec::len), Some(100));
    assert_eq!(first["end"], false);

    let second = parse(&get_servers(101).expect("valid start"));
    assert_eq!(second["server"].as_array().map(Vec::len), Some(50));
    assert_eq!(second["end"], true);
    assert_eq!(second["server"][0]["ref"]["serverId"], "101");
}

#[test]
fn entity_trace_follows_the_budget() {
    let _guard = isolated();
    for (budget, expected) in [(0, 0), (8, 0), (64, 0), (1024, 1), (1024 * 1024, 1)] {
        let channel = ChannelNode::new("dns:///entity-budget", budget, false);
        let trace = channel.serialize_entity().trace;
        assert_eq!(trace.len(), expected, "budget {budget}");
        if let Some(event) = trace.first() {
            assert_eq!(event.description, "Channel created");
            assert_eq!(event.severity, Severity::Info);
        }
    }
}
