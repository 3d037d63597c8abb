//! String-in, JSON-out introspection queries.

use channelz_types::{ChannelzError, Entity, EntityKind, NodeKind, Uuid};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

use crate::node::Node;
use crate::registry::{self, PAGINATION_LIMIT};

fn start_id(start: i64) -> Result<u64, ChannelzError> {
    u64::try_from(start).map_err(|_| {
        ChannelzError::InvalidArgument(format!("start id must be non-negative, got {start}"))
    })
}

fn lookup_kind(
    what: &'static str,
    id: i64,
    accepts: impl Fn(NodeKind) -> bool,
) -> Result<Node, ChannelzError> {
    let raw = u64::try_from(id)
        .map_err(|_| ChannelzError::InvalidArgument(format!("{what} id must be non-negative, got {id}")))?;
    let not_found = ChannelzError::NotFound { what, id };
    let uuid = Uuid::new(raw).map_err(|_| not_found.clone())?;
    match registry::lookup(uuid) {
        Some(node) if accepts(node.kind()) => Ok(node),
        _ => Err(not_found),
    }
}

fn render_page(key: &str, (nodes, end): (Vec<Node>, bool)) -> String {
    let rendered: Vec<JsonValue> = nodes.iter().map(Node::render_json).collect();
    let mut reply = JsonMap::new();
    reply.insert(key.to_owned(), JsonValue::Array(rendered));
    reply.insert("end".to_owned(), JsonValue::Bool(end));
    JsonValue::Object(reply).to_string()
}

/// Top-level channels with uuid ≥ `start`; internal channels never appear.
pub fn get_top_channels(start: i64) -> Result<String, ChannelzError> {
    let page = registry::get_page(NodeKind::TopLevelChannel, start_id(start)?);
    Ok(render_page("channel", page))
}

pub fn get_servers(start: i64) -> Result<String, ChannelzError> {
    let page = registry::get_page(NodeKind::Server, start_id(start)?);
    Ok(render_page("server", page))
}

/// Top-level or internal channel by uuid.
pub fn get_channel(id: i64) -> Result<String, ChannelzError> {
    let node = lookup_kind("channel", id, NodeKind::is_channel)?;
    Ok(json!({"channel": node.render_json()}).to_string())
}

pub fn get_subchannel(id: i64) -> Result<String, ChannelzError> {
    let node = lookup_kind("subchannel", id, |kind| kind == NodeKind::Subchannel)?;
    Ok(json!({"subchannel": node.render_json()}).to_string())
}

pub fn get_server(id: i64) -> Result<String, ChannelzError> {
    let node = lookup_kind("server", id, |kind| kind == NodeKind::Server)?;
    Ok(json!({"server": node.render_json()}).to_string())
}

/// Connected or listening socket by uuid.
pub fn get_socket(id: i64) -> Result<String, ChannelzError> {
    let node = lookup_kind("socket", id, |kind| {
        matches!(kind, NodeKind::Socket | NodeKind::ListenSocket)
    })?;
    Ok(json!({"socket": node.render_json()}).to_string())
}

/// References to a server's connected sockets with uuid ≥ `start`.
pub fn get_server_sockets(server_id: i64, start: i64) -> Result<String, ChannelzError> {
    let start = start_id(start)?;
    let server = lookup_kind("server", server_id, |kind| kind == NodeKind::Server)?;
    let mut sockets: Vec<Uuid> = server
        .children_of_kind(NodeKind::Socket)
        .into_iter()
        .filter(|uuid| uuid.get() >= start)
        .collect();
    sockets.sort_unstable();

    let mut refs = Vec::new();
    let mut end = true;
    for uuid in sockets {
        let Some(socket) = registry::lookup(uuid) else {
            continue;
        };
        if refs.len() == PAGINATION_LIMIT {
            end = false;
            break;
        }
        refs.push(json!({"socketId": uuid.to_string(), "name": socket.target()}));
    }
    Ok(json!({"socketRef": refs, "end": end}).to_string())
}

/// Either outcome as a JSON document: the reply itself, or the structured
/// error payload.
pub fn query_result_json(result: Result<String, ChannelzError>) -> String {
    match result {
        Ok(json) => json,
        Err(err) => err.to_json().to_string(),
    }
}

pub fn get_entity(id: i64) -> Result<Entity, ChannelzError> {
    lookup_kind("entity", id, |_| true).map(|node| node.serialize_entity())
}

/// v2 enumeration in uuid order, optionally restricted to one entity kind.
/// Channels include internal channels here.
pub fn query_entities(
    kind: Option<EntityKind>,
    start: i64,
) -> Result<(Vec<Entity>, bool), ChannelzError> {
    let start = start_id(start)?;
    let (nodes, end) = registry::get_page_where(
        |node_kind| kind.is_none_or(|kind| node_kind.entity_kind() == kind),
        start,
    );
    Ok((nodes.iter().map(Node::serialize_entity).collect(), end))
}
