use channelz_types::{
    ChildGroup, Entity, EntityData, EntityKind, EntityRef, Json,
    TraceEvent as EntityTraceEvent,
};

use super::builtin_bundles;
use crate::node::Node;

impl Node {
    /// The v2 structured record for this node: built-in bundles first, then
    /// data-source bundles in attach order.
    pub fn serialize_entity(&self) -> Entity {
        let children = self.children();
        let children = EntityKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let ids: Vec<_> = children
                    .iter()
                    .filter(|(_, child_kind)| child_kind.entity_kind() == kind)
                    .map(|(uuid, _)| *uuid)
                    .collect();
                (!ids.is_empty()).then_some(ChildGroup { kind, ids })
            })
            .collect();

        let mut data: Vec<EntityData> = builtin_bundles(self)
            .into_iter()
            .map(|(name, bundle)| EntityData {
                name: name.to_owned(),
                value: Json::from_value(&bundle.to_json()),
            })
            .collect();
        for (name, bundle) in self.collect_data().bundles() {
            data.push(EntityData {
                name: name.to_owned(),
                value: Json::from_value(&bundle.to_json()),
            });
        }

        let trace = self
            .trace()
            .map(|trace| trace.snapshot().events)
            .unwrap_or_default()
            .into_iter()
            .map(|event| EntityTraceEvent {
                description: event.description,
                severity: event.severity,
                timestamp: event.timestamp,
                referenced: event.referenced.map(|(id, kind)| EntityRef {
                    id,
                    kind: kind.entity_kind(),
                }),
            })
            .collect();

        Entity {
            id: self.uuid(),
            kind: self.entity_kind(),
            orphaned: self.is_orphaned(),
            parents: self.parents(),
            children,
            data,
            trace,
        }
    }
}
