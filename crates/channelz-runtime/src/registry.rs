use channelz_types::{NodeKind, Uuid};
use core::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use crate::node::{Node, NodeInner};

/// Page size for every paginated enumeration.
pub const PAGINATION_LIMIT: usize = 100;

static NEXT_UUID: AtomicU64 = AtomicU64::new(1);
static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

pub(crate) fn registry() -> &'static Mutex<Registry> {
    &REGISTRY
}

fn allocate_uuid() -> Uuid {
    let raw = NEXT_UUID.fetch_add(1, Ordering::Relaxed);
    Uuid::new(raw).expect("uuid invariant violated: allocator wrapped around to zero")
}

/// Allocates a uuid and registers the node `build` makes for it, all under
/// the registry lock, so registration order is uuid order.
pub(crate) fn register_new(kind: NodeKind, build: impl FnOnce(Uuid) -> NodeInner) -> Arc<NodeInner> {
    let mut registry = registry().lock();
    let uuid = allocate_uuid();
    let inner = Arc::new(build(uuid));
    registry.register(uuid, kind, Arc::downgrade(&inner));
    inner
}

/// Process-wide index of live nodes. Holds weak references only.
///
/// Never let a strong reference obtained here drop while the lock is held:
/// dropping the last one runs `NodeInner::drop`, which takes this lock.
pub(crate) struct Registry {
    by_uuid: BTreeMap<Uuid, (NodeKind, Weak<NodeInner>)>,
    by_kind: BTreeMap<NodeKind, BTreeSet<Uuid>>,
}

impl Registry {
    const fn new() -> Self {
        Self {
            by_uuid: BTreeMap::new(),
            by_kind: BTreeMap::new(),
        }
    }

    fn register(&mut self, uuid: Uuid, kind: NodeKind, node: Weak<NodeInner>) {
        self.by_uuid.insert(uuid, (kind, node));
        self.by_kind.entry(kind).or_default().insert(uuid);
    }

    /// Removes `uuid` only if it still names the allocation at `ptr`; an
    /// entry re-used after `test_only_reset` belongs to a different node.
    pub(crate) fn unregister(&mut self, uuid: Uuid, kind: NodeKind, ptr: *const NodeInner) {
        let same_node = self
            .by_uuid
            .get(&uuid)
            .is_some_and(|(_, weak)| std::ptr::eq(weak.as_ptr(), ptr));
        if !same_node {
            return;
        }
        self.by_uuid.remove(&uuid);
        if let Some(uuids) = self.by_kind.get_mut(&kind) {
            uuids.remove(&uuid);
        }
    }

    pub(crate) fn lookup(&self, uuid: Uuid) -> Option<Node> {
        self.by_uuid
            .get(&uuid)
            .and_then(|(_, weak)| weak.upgrade())
            .map(Node::from_inner)
    }

    /// Liveness check that never materializes a strong reference.
    pub(crate) fn is_live(&self, uuid: Uuid) -> bool {
        self.by_uuid
            .get(&uuid)
            .is_some_and(|(_, weak)| weak.strong_count() > 0)
    }

    /// Up to `limit` live nodes of `kind` with uuid ≥ `start`, ascending.
    /// The flag is true iff the walk ran off the end of the index.
    pub(crate) fn page(&mut self, kind: NodeKind, start: u64, limit: usize) -> (Vec<Node>, bool) {
        let Some(uuids) = self.by_kind.get(&kind) else {
            return (Vec::new(), true);
        };
        let candidates = uuids
            .range(first_uuid(start)..)
            .map(|uuid| (*uuid, self.by_uuid.get(uuid).map(|(_, weak)| weak)));
        let (nodes, end, dangling) = collect_page(candidates, limit);
        self.prune(&dangling);
        (nodes, end)
    }

    /// Like [`Registry::page`], across every kind `matches` accepts.
    pub(crate) fn page_where(
        &mut self,
        matches: impl Fn(NodeKind) -> bool,
        start: u64,
        limit: usize,
    ) -> (Vec<Node>, bool) {
        let candidates = self
            .by_uuid
            .range(first_uuid(start)..)
            .filter(|(_, (kind, _))| matches(*kind))
            .map(|(uuid, (_, weak))| (*uuid, Some(weak)));
        let (nodes, end, dangling) = collect_page(candidates, limit);
        self.prune(&dangling);
        (nodes, end)
    }

    fn prune(&mut self, dangling: &[Uuid]) {
        for uuid in dangling {
            if self.is_live(*uuid) {
                continue;
            }
            self.by_uuid.remove(uuid);
            for uuids in self.by_kind.values_mut() {
                uuids.remove(uuid);
            }
        }
    }

    fn clear(&mut self) {
        self.by_uuid.clear();
        self.by_kind.clear();
    }
}

fn first_uuid(start: u64) -> Uuid {
    Uuid::new(start.max(1)).expect("start clamped to a non-zero uuid")
}

type PageWalk = (Vec<Node>, bool, Vec<Uuid>);

fn collect_page<'a>(
    candidates: impl Iterator<Item = (Uuid, Option<&'a Weak<NodeInner>>)>,
    limit: usize,
) -> PageWalk {
    let mut nodes = Vec::new();
    let mut dangling = Vec::new();
    for (uuid, weak) in candidates {
        let Some(weak) = weak.filter(|weak| weak.strong_count() > 0) else {
            dangling.push(uuid);
            continue;
        };
        // checked before upgrading so no surplus strong reference is dropped here
        if nodes.len() == limit {
            return (nodes, false, dangling);
        }
        match weak.upgrade() {
            Some(inner) => nodes.push(Node::from_inner(inner)),
            None => dangling.push(uuid),
        }
    }
    (nodes, true, dangling)
}

/// Looks up a live node by uuid.
pub fn lookup(uuid: Uuid) -> Option<Node> {
    registry().lock().lookup(uuid)
}

pub(crate) fn is_live(uuid: Uuid) -> bool {
    registry().lock().is_live(uuid)
}

pub fn get_page(kind: NodeKind, start: u64) -> (Vec<Node>, bool) {
    registry().lock().page(kind, start, PAGINATION_LIMIT)
}

/// Pages across several kinds at once, in uuid order.
pub fn get_page_where(matches: impl Fn(NodeKind) -> bool, start: u64) -> (Vec<Node>, bool) {
    registry().lock().page_where(matches, start, PAGINATION_LIMIT)
}

/// Restores the allocator to 1 and forgets every registered node.
///
/// Tests only: nodes alive across a reset stay usable but are no longer
/// reachable through lookups.
#[doc(hidden)]
pub fn test_only_reset() {
    let mut registry = registry().lock();
    registry.clear();
    NEXT_UUID.store(1, Ordering::Relaxed);
}
