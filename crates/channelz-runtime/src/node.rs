use channelz_types::{ConnectivityState, EntityKind, NodeKind, Severity, Timestamp, Uuid};
use core::sync::atomic::{AtomicU8, Ordering};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::counters::{CallCounters, SocketCounters};
use crate::registry::{self, registry};
use crate::source::DataSource;
use crate::trace::{ChannelTrace, TraceEvent};

/// Shared reference to a registered node.
///
/// Cloning takes a strong reference; the node leaves the registry when the
/// last one drops.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

pub(crate) struct NodeInner {
    uuid: Uuid,
    kind: NodeKind,
    target: String,
    created_at: Timestamp,
    trace: Option<ChannelTrace>,
    body: NodeBody,
    state: Mutex<NodeState>,
}

pub(crate) enum NodeBody {
    /// Channels and subchannels.
    Channel {
        counters: CallCounters,
        connectivity: AtomicU8,
    },
    Server {
        counters: CallCounters,
    },
    ListenSocket {
        local: Option<String>,
    },
    Socket {
        counters: SocketCounters,
        local: Option<String>,
        remote: Option<String>,
    },
}

impl NodeBody {
    pub(crate) fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::TopLevelChannel | NodeKind::InternalChannel | NodeKind::Subchannel => {
                Self::Channel {
                    counters: CallCounters::new(),
                    connectivity: AtomicU8::new(0),
                }
            }
            NodeKind::Server => Self::Server {
                counters: CallCounters::new(),
            },
            NodeKind::ListenSocket => Self::ListenSocket { local: None },
            NodeKind::Socket => Self::Socket {
                counters: SocketCounters::new(),
                local: None,
                remote: None,
            },
        }
    }

    pub(crate) fn listen_socket(local: Option<String>) -> Self {
        Self::ListenSocket { local }
    }

    pub(crate) fn socket(local: Option<String>, remote: Option<String>) -> Self {
        Self::Socket {
            counters: SocketCounters::new(),
            local,
            remote,
        }
    }
}

#[derive(Default)]
pub(crate) struct NodeState {
    pub(crate) orphaned: bool,
    pub(crate) parents: BTreeSet<Uuid>,
    pub(crate) children: ChildSet,
    pub(crate) data_sources: Vec<(u64, Weak<dyn DataSource>)>,
    pub(crate) next_source_slot: u64,
}

/// How a parent holds a child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildLink {
    /// The parent keeps the child alive.
    Owned,
    /// The parent records the child's uuid only.
    Observed,
}

pub(crate) struct ChildEntry {
    pub(crate) uuid: Uuid,
    pub(crate) kind: NodeKind,
    owned: Option<Node>,
}

/// Children in insertion order, indexed by uuid.
#[derive(Default)]
pub(crate) struct ChildSet {
    by_seq: BTreeMap<u64, ChildEntry>,
    seq_of: HashMap<Uuid, u64>,
    next_seq: u64,
}

impl ChildSet {
    /// Re-adding an existing child keeps its original position. Returns the
    /// strong reference the entry held before, which the caller must drop
    /// outside the node lock.
    fn insert(&mut self, uuid: Uuid, kind: NodeKind, owned: Option<Node>) -> Option<Node> {
        if let Some(seq) = self.seq_of.get(&uuid)
            && let Some(entry) = self.by_seq.get_mut(seq)
        {
            return std::mem::replace(&mut entry.owned, owned);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seq_of.insert(uuid, seq);
        self.by_seq.insert(seq, ChildEntry { uuid, kind, owned });
        None
    }

    fn remove(&mut self, uuid: Uuid) -> Option<ChildEntry> {
        let seq = self.seq_of.remove(&uuid)?;
        self.by_seq.remove(&seq)
    }

    fn take_owned(&mut self) -> Vec<Node> {
        let owned: Vec<Uuid> = self
            .by_seq
            .values()
            .filter(|entry| entry.owned.is_some())
            .map(|entry| entry.uuid)
            .collect();
        owned
            .into_iter()
            .filter_map(|uuid| self.remove(uuid))
            .filter_map(|entry| entry.owned)
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ChildEntry> {
        self.by_seq.values()
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        registry()
            .lock()
            .unregister(self.uuid, self.kind, self as *const NodeInner);
        debug!(uuid = %self.uuid, kind = %self.kind, "channelz node destroyed");
    }
}

impl Node {
    pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Self {
        Self { inner }
    }

    /// Allocates and registers a node. The trace ring exists only for traced
    /// kinds with a non-zero budget, and starts with the creation event when
    /// that event fits the budget.
    pub(crate) fn create(
        kind: NodeKind,
        target: impl Into<String>,
        trace_memory: usize,
        body: NodeBody,
    ) -> Self {
        let target = target.into();
        let trace = if kind.is_traced() {
            ChannelTrace::new(trace_memory)
        } else {
            None
        };
        if let (Some(trace), Some(description)) = (&trace, kind.created_description())
            && trace.fits(description)
        {
            trace.add_event(TraceEvent {
                description: description.to_owned(),
                severity: Severity::Info,
                timestamp: Timestamp::now(),
                referenced: None,
            });
        }
        let inner = registry::register_new(kind, |uuid| NodeInner {
            uuid,
            kind,
            target,
            created_at: Timestamp::now(),
            trace,
            body,
            state: Mutex::new(NodeState::default()),
        });
        debug!(uuid = %inner.uuid, %kind, target = %inner.target, "channelz node registered");
        Self { inner }
    }

    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.inner.kind.entity_kind()
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn created_at(&self) -> Timestamp {
        self.inner.created_at
    }

    pub fn is_orphaned(&self) -> bool {
        self.inner.state.lock().orphaned
    }

    pub fn trace(&self) -> Option<&ChannelTrace> {
        self.inner.trace.as_ref()
    }

    pub fn call_counters(&self) -> Option<&CallCounters> {
        match &self.inner.body {
            NodeBody::Channel { counters, .. } | NodeBody::Server { counters } => Some(counters),
            NodeBody::ListenSocket { .. } | NodeBody::Socket { .. } => None,
        }
    }

    pub fn socket_counters(&self) -> Option<&SocketCounters> {
        match &self.inner.body {
            NodeBody::Socket { counters, .. } => Some(counters),
            _ => None,
        }
    }

    pub fn local_address(&self) -> Option<&str> {
        match &self.inner.body {
            NodeBody::ListenSocket { local } | NodeBody::Socket { local, .. } => local.as_deref(),
            _ => None,
        }
    }

    pub fn remote_address(&self) -> Option<&str> {
        match &self.inner.body {
            NodeBody::Socket { remote, .. } => remote.as_deref(),
            _ => None,
        }
    }

    /// `None` until first reported, and always for non-channel kinds.
    pub fn connectivity_state(&self) -> Option<ConnectivityState> {
        match &self.inner.body {
            NodeBody::Channel { connectivity, .. } => {
                ConnectivityState::from_raw(connectivity.load(Ordering::Relaxed))
            }
            _ => None,
        }
    }

    pub(crate) fn set_connectivity_state(&self, state: ConnectivityState) {
        if let NodeBody::Channel { connectivity, .. } = &self.inner.body {
            connectivity.store(state.to_raw(), Ordering::Relaxed);
        }
    }

    /// Appends to the trace ring; silently dropped when the node has none.
    pub fn add_trace_event(&self, severity: Severity, description: impl Into<String>) {
        self.push_trace_event(severity, description.into(), None);
    }

    pub fn add_trace_event_with_reference(
        &self,
        severity: Severity,
        description: impl Into<String>,
        referenced: &Node,
    ) {
        self.push_trace_event(
            severity,
            description.into(),
            Some((referenced.uuid(), referenced.kind())),
        );
    }

    fn push_trace_event(
        &self,
        severity: Severity,
        description: String,
        referenced: Option<(Uuid, NodeKind)>,
    ) {
        let Some(trace) = &self.inner.trace else {
            return;
        };
        trace.add_event(TraceEvent {
            description,
            severity,
            timestamp: Timestamp::now(),
            referenced,
        });
    }

    /// Marks the node orphaned and releases its owned children. Idempotent.
    pub fn orphan(&self) {
        let released = {
            let mut state = self.inner.state.lock();
            if state.orphaned {
                return;
            }
            state.orphaned = true;
            state.children.take_owned()
        };
        debug!(
            uuid = %self.uuid(),
            released = released.len(),
            "channelz node orphaned"
        );
        for child in &released {
            child.inner.state.lock().parents.remove(&self.uuid());
        }
        drop(released);
    }

    pub fn add_child(&self, child: &Node, link: ChildLink) {
        if child.uuid() == self.uuid() {
            return;
        }
        let owned = match link {
            ChildLink::Owned => Some(child.clone()),
            ChildLink::Observed => None,
        };
        let replaced = self
            .inner
            .state
            .lock()
            .children
            .insert(child.uuid(), child.kind(), owned);
        drop(replaced);
        child.inner.state.lock().parents.insert(self.uuid());
    }

    pub fn remove_child(&self, uuid: Uuid) {
        let removed = self.inner.state.lock().children.remove(uuid);
        let Some(entry) = removed else {
            return;
        };
        let child = entry.owned.or_else(|| registry::lookup(uuid));
        if let Some(child) = child {
            child.inner.state.lock().parents.remove(&self.uuid());
        }
    }

    /// Live parents, ascending by uuid. Parents found dead are forgotten.
    pub fn parents(&self) -> Vec<Uuid> {
        let parents: Vec<Uuid> = self.inner.state.lock().parents.iter().copied().collect();
        let (live, dead): (Vec<Uuid>, Vec<Uuid>) = parents
            .into_iter()
            .partition(|uuid| registry::is_live(*uuid));
        if !dead.is_empty() {
            let mut state = self.inner.state.lock();
            for uuid in &dead {
                state.parents.remove(uuid);
            }
        }
        live
    }

    /// Live children in insertion order. Observed children found dead are
    /// forgotten; owned children are always live.
    pub fn children(&self) -> Vec<(Uuid, NodeKind)> {
        let children: Vec<(Uuid, NodeKind, bool)> = {
            let state = self.inner.state.lock();
            state
                .children
                .iter()
                .map(|entry| (entry.uuid, entry.kind, entry.owned.is_some()))
                .collect()
        };
        let mut live = Vec::with_capacity(children.len());
        let mut dead = Vec::new();
        for (uuid, kind, owned) in children {
            if owned || registry::is_live(uuid) {
                live.push((uuid, kind));
            } else {
                dead.push(uuid);
            }
        }
        if !dead.is_empty() {
            let mut state = self.inner.state.lock();
            for uuid in dead {
                state.children.remove(uuid);
            }
        }
        live
    }

    pub fn children_of_kind(&self, kind: NodeKind) -> Vec<Uuid> {
        self.children()
            .into_iter()
            .filter(|(_, child_kind)| *child_kind == kind)
            .map(|(uuid, _)| uuid)
            .collect()
    }

    pub(crate) fn state(&self) -> &Mutex<NodeState> {
        &self.inner.state
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("uuid", &self.inner.uuid)
            .field("kind", &self.inner.kind)
            .field("target", &self.inner.target)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}
