use channelz_types::PropertyList;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::warn;

use crate::node::Node;
use crate::ztrace::ZTrace;

/// Third-party contributor of property bundles and ztraces for one node.
///
/// Called without any channelz lock held.
pub trait DataSource: Send + Sync + 'static {
    fn add_data(&self, sink: &mut DataSink) -> anyhow::Result<()>;

    fn get_ztrace(&self, _name: &str) -> Option<Box<dyn ZTrace>> {
        None
    }
}

/// Named property bundles, in the order they were first added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSink {
    bundles: Vec<(String, PropertyList)>,
}

impl DataSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bundle name seen before merges key-wise into the earlier bundle.
    pub fn add_data(&mut self, name: impl Into<String>, properties: PropertyList) {
        let name = name.into();
        match self.bundles.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, bundle)) => bundle.merge(properties),
            None => self.bundles.push((name, properties)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyList> {
        self.bundles
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, bundle)| bundle)
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundles(&self) -> impl Iterator<Item = (&str, &PropertyList)> {
        self.bundles
            .iter()
            .map(|(name, bundle)| (name.as_str(), bundle))
    }

    pub(crate) fn absorb(&mut self, other: DataSink) {
        for (name, bundle) in other.bundles {
            self.add_data(name, bundle);
        }
    }
}

/// Keeps a data source attached to its node. Dropping it detaches the
/// source; the handle also keeps the node alive.
pub struct DataSourceHandle<T: DataSource> {
    node: Node,
    source: Arc<T>,
    slot: u64,
}

impl<T: DataSource> DataSourceHandle<T> {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl<T: DataSource> Deref for DataSourceHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.source
    }
}

impl<T: DataSource> Drop for DataSourceHandle<T> {
    fn drop(&mut self) {
        self.node
            .state()
            .lock()
            .data_sources
            .retain(|(slot, _)| *slot != self.slot);
    }
}

impl<T: DataSource + fmt::Debug> fmt::Debug for DataSourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceHandle")
            .field("node", &self.node.uuid())
            .field("source", &self.source)
            .finish()
    }
}

impl Node {
    pub fn attach_data_source<T: DataSource>(&self, source: T) -> DataSourceHandle<T> {
        let source = Arc::new(source);
        let erased: Arc<dyn DataSource> = source.clone();
        let slot = {
            let mut state = self.state().lock();
            let slot = state.next_source_slot;
            state.next_source_slot += 1;
            state.data_sources.push((slot, Arc::downgrade(&erased)));
            slot
        };
        DataSourceHandle {
            node: self.clone(),
            source,
            slot,
        }
    }

    /// Strong references to the attached sources, in attach order. Taken
    /// under the node lock; user code runs only after it is released.
    pub(crate) fn data_sources(&self) -> Vec<Arc<dyn DataSource>> {
        let state = self.state().lock();
        state
            .data_sources
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Runs every attached source against its own scratch sink. A failing
    /// source loses its whole contribution.
    pub fn collect_data(&self) -> DataSink {
        let mut sink = DataSink::new();
        for source in self.data_sources() {
            let mut scratch = DataSink::new();
            match source.add_data(&mut scratch) {
                Ok(()) => sink.absorb(scratch),
                Err(err) => warn!(
                    uuid = %self.uuid(),
                    error = %err,
                    "channelz data source failed, omitting its data"
                ),
            }
        }
        sink
    }
}
