use channelz_types::{
    ChannelArgs, ChannelzConfig, ConnectivityState, NodeKind, Uuid,
    MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE_DEFAULT,
};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::counters::{CallCounts, SocketCounters};
use crate::node::{ChildLink, Node, NodeBody};

/// Trace budget for nodes built without channel args.
pub const DEFAULT_TRACE_MEMORY: usize = MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE_DEFAULT;

/// Slot markers naming what a [`NodeHandle`] was created as.
pub mod slot {
    #[derive(Debug)]
    pub struct Channel;
    #[derive(Debug)]
    pub struct Subchannel;
    #[derive(Debug)]
    pub struct Server;
    #[derive(Debug)]
    pub struct ListenSocket;
    #[derive(Debug)]
    pub struct Socket;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::slot::Channel {}
    impl Sealed for super::slot::Subchannel {}
    impl Sealed for super::slot::Server {}
    impl Sealed for super::slot::ListenSocket {}
    impl Sealed for super::slot::Socket {}
}

pub trait NodeSlot: sealed::Sealed {
    const KIND_NAME: &'static str;
}

/// Slots whose nodes carry call counters.
pub trait CountsCalls: NodeSlot {}

impl NodeSlot for slot::Channel {
    const KIND_NAME: &'static str = "channel";
}
impl NodeSlot for slot::Subchannel {
    const KIND_NAME: &'static str = "subchannel";
}
impl NodeSlot for slot::Server {
    const KIND_NAME: &'static str = "server";
}
impl NodeSlot for slot::ListenSocket {
    const KIND_NAME: &'static str = "listen_socket";
}
impl NodeSlot for slot::Socket {
    const KIND_NAME: &'static str = "socket";
}

impl CountsCalls for slot::Channel {}
impl CountsCalls for slot::Subchannel {}
impl CountsCalls for slot::Server {}

pub type ChannelNode = NodeHandle<slot::Channel>;
pub type SubchannelNode = NodeHandle<slot::Subchannel>;
pub type ServerNode = NodeHandle<slot::Server>;
pub type ListenSocketNode = NodeHandle<slot::ListenSocket>;
pub type SocketNode = NodeHandle<slot::Socket>;

struct OwnerInner {
    node: Node,
}

impl Drop for OwnerInner {
    fn drop(&mut self) {
        self.node.orphan();
    }
}

/// The creator's reference to a node.
///
/// Clones share one ownership; dropping the last clone orphans the node.
/// Other strong references (owning parents, data sources, in-flight
/// queries) keep it registered afterwards.
pub struct NodeHandle<S> {
    owner: Arc<OwnerInner>,
    _slot: PhantomData<S>,
}

impl<S> Clone for NodeHandle<S> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
            _slot: PhantomData,
        }
    }
}

impl<S> Deref for NodeHandle<S> {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.owner.node
    }
}

impl<S: NodeSlot> fmt::Debug for NodeHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("slot", &S::KIND_NAME)
            .field("uuid", &self.uuid())
            .finish()
    }
}

impl<S> NodeHandle<S> {
    fn from_node(node: Node) -> Self {
        Self {
            owner: Arc::new(OwnerInner { node }),
            _slot: PhantomData,
        }
    }

    pub fn node(&self) -> &Node {
        &self.owner.node
    }

    pub fn downgrade(&self) -> WeakNodeHandle<S> {
        WeakNodeHandle {
            owner: Arc::downgrade(&self.owner),
            _slot: PhantomData,
        }
    }
}

impl<S: CountsCalls> NodeHandle<S> {
    pub fn record_call_started(&self) {
        if let Some(counters) = self.call_counters() {
            counters.record_call_started();
        }
    }

    pub fn record_call_failed(&self) {
        if let Some(counters) = self.call_counters() {
            counters.record_call_failed();
        }
    }

    pub fn record_call_succeeded(&self) {
        if let Some(counters) = self.call_counters() {
            counters.record_call_succeeded();
        }
    }

    pub fn call_counts(&self) -> CallCounts {
        self.call_counters()
            .map(|counters| counters.snapshot())
            .unwrap_or_default()
    }
}

/// A creator reference that does not keep the node un-orphaned.
pub struct WeakNodeHandle<S> {
    owner: Weak<OwnerInner>,
    _slot: PhantomData<S>,
}

impl<S> Clone for WeakNodeHandle<S> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            _slot: PhantomData,
        }
    }
}

impl<S> WeakNodeHandle<S> {
    pub fn upgrade(&self) -> Option<NodeHandle<S>> {
        self.owner.upgrade().map(|owner| NodeHandle {
            owner,
            _slot: PhantomData,
        })
    }
}

impl NodeHandle<slot::Channel> {
    pub fn new(target: impl Into<String>, trace_memory: usize, is_internal: bool) -> Self {
        let kind = if is_internal {
            NodeKind::InternalChannel
        } else {
            NodeKind::TopLevelChannel
        };
        Self::from_node(Node::create(
            kind,
            target,
            trace_memory,
            NodeBody::for_kind(kind),
        ))
    }

    pub fn from_args(target: impl Into<String>, args: &ChannelArgs) -> Option<Self> {
        let config = enabled_config(args)?;
        Some(Self::new(target, config.trace_memory, config.is_internal))
    }

    pub fn set_connectivity_state(&self, state: ConnectivityState) {
        self.node().set_connectivity_state(state);
    }

    pub fn add_child_subchannel(&self, subchannel: &Node) {
        self.add_child(subchannel, ChildLink::Observed);
    }

    pub fn remove_child_subchannel(&self, uuid: Uuid) {
        self.remove_child(uuid);
    }

    pub fn add_child_channel(&self, channel: &Node) {
        self.add_child(channel, ChildLink::Observed);
    }

    pub fn remove_child_channel(&self, uuid: Uuid) {
        self.remove_child(uuid);
    }
}

impl NodeHandle<slot::Subchannel> {
    pub fn new(target: impl Into<String>, trace_memory: usize) -> Self {
        Self::from_node(Node::create(
            NodeKind::Subchannel,
            target,
            trace_memory,
            NodeBody::for_kind(NodeKind::Subchannel),
        ))
    }

    pub fn from_args(target: impl Into<String>, args: &ChannelArgs) -> Option<Self> {
        let config = enabled_config(args)?;
        Some(Self::new(target, config.trace_memory))
    }

    pub fn set_connectivity_state(&self, state: ConnectivityState) {
        self.node().set_connectivity_state(state);
    }

    /// The subchannel owns its connected socket until it is removed.
    pub fn add_child_socket(&self, socket: &SocketNode) {
        self.add_child(socket, ChildLink::Owned);
    }

    pub fn remove_child_socket(&self, uuid: Uuid) {
        self.remove_child(uuid);
    }
}

impl NodeHandle<slot::Server> {
    pub fn new(trace_memory: usize) -> Self {
        Self::from_node(Node::create(
            NodeKind::Server,
            "",
            trace_memory,
            NodeBody::for_kind(NodeKind::Server),
        ))
    }

    pub fn from_args(args: &ChannelArgs) -> Option<Self> {
        let config = enabled_config(args)?;
        Some(Self::new(config.trace_memory))
    }

    pub fn add_child_listen_socket(&self, listen_socket: &ListenSocketNode) {
        self.add_child(listen_socket, ChildLink::Owned);
    }

    pub fn remove_child_listen_socket(&self, uuid: Uuid) {
        self.remove_child(uuid);
    }

    pub fn add_child_socket(&self, socket: &SocketNode) {
        self.add_child(socket, ChildLink::Owned);
    }

    pub fn remove_child_socket(&self, uuid: Uuid) {
        self.remove_child(uuid);
    }
}

impl NodeHandle<slot::ListenSocket> {
    pub fn new(name: impl Into<String>, local: Option<String>) -> Self {
        Self::from_node(Node::create(
            NodeKind::ListenSocket,
            name,
            0,
            NodeBody::listen_socket(local),
        ))
    }
}

impl NodeHandle<slot::Socket> {
    pub fn new(name: impl Into<String>, local: Option<String>, remote: Option<String>) -> Self {
        Self::from_node(Node::create(
            NodeKind::Socket,
            name,
            0,
            NodeBody::socket(local, remote),
        ))
    }

    fn with_counters(&self, record: impl FnOnce(&SocketCounters)) {
        if let Some(counters) = self.socket_counters() {
            record(counters);
        }
    }

    pub fn record_stream_started_from_local(&self) {
        self.with_counters(SocketCounters::record_stream_started_from_local);
    }

    pub fn record_stream_started_from_remote(&self) {
        self.with_counters(SocketCounters::record_stream_started_from_remote);
    }

    pub fn record_stream_succeeded(&self) {
        self.with_counters(SocketCounters::record_stream_succeeded);
    }

    pub fn record_stream_failed(&self) {
        self.with_counters(SocketCounters::record_stream_failed);
    }

    pub fn record_messages_sent(&self, count: u64) {
        self.with_counters(|counters| counters.record_messages_sent(count));
    }

    pub fn record_message_received(&self) {
        self.with_counters(SocketCounters::record_message_received);
    }

    pub fn record_keepalive_sent(&self) {
        self.with_counters(SocketCounters::record_keepalive_sent);
    }
}

fn enabled_config(args: &ChannelArgs) -> Option<ChannelzConfig> {
    let config = ChannelzConfig::from_args(args);
    if !config.enabled {
        debug!("channelz disabled by channel args, no node created");
        return None;
    }
    Some(config)
}

/// Builds the channel's node, or `None` when channelz is disabled.
pub fn new_channel_from_args(target: impl Into<String>, args: &ChannelArgs) -> Option<ChannelNode> {
    ChannelNode::from_args(target, args)
}

pub fn new_server_from_args(args: &ChannelArgs) -> Option<ServerNode> {
    ServerNode::from_args(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelz_types::{ENABLE_CHANNELZ, MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE};

    #[test]
    fn dropping_the_last_handle_orphans() {
        let server = ServerNode::new(DEFAULT_TRACE_MEMORY);
        let node = server.node().clone();
        let second = server.clone();
        drop(server);
        assert!(!node.is_orphaned());
        drop(second);
        assert!(node.is_orphaned());
    }

    #[test]
    fn weak_handle_does_not_hold_ownership() {
        let channel = ChannelNode::new("dns:///weak", DEFAULT_TRACE_MEMORY, false);
        let weak = channel.downgrade();
        assert!(weak.upgrade().is_some());
        drop(channel);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn disabled_args_build_no_node() {
        let args = ChannelArgs::new().set(ENABLE_CHANNELZ, false);
        assert!(new_channel_from_args("dns:///off", &args).is_none());
        assert!(new_server_from_args(&args).is_none());
    }

    #[test]
    fn args_select_trace_budget() {
        let args = ChannelArgs::new().set(MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE, 0);
        let channel = new_channel_from_args("dns:///quiet", &args).expect("channelz enabled");
        assert!(channel.trace().is_none());
    }

    #[test]
    fn server_keeps_listen_sockets_until_orphaned() {
        let server = ServerNode::new(DEFAULT_TRACE_MEMORY);
        let listener = ListenSocketNode::new("[::]:50051", Some("[::]:50051".into()));
        server.add_child_listen_socket(&listener);
        let listener_node = listener.node().clone();
        drop(listener);
        assert!(listener_node.is_orphaned());
        assert_eq!(server.children().len(), 1);
        drop(server);
        assert!(listener_node.parents().is_empty());
    }
}
