use facet::Facet;

use crate::{EntityKind, Severity, Timestamp, Uuid};

/// Raw JSON text carried inside a v2 record.
///
/// Property bundles are open-ended, so the record keeps their rendered
/// JSON source rather than a typed tree.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
#[facet(transparent)]
pub struct Json(pub(crate) String);

impl Json {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn from_value(value: &serde_json::Value) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn parse(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}

/// The v2 structured form of one node.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub orphaned: bool,
    /// Live parents, ascending.
    pub parents: Vec<Uuid>,
    /// Live children grouped by kind, groups in kind order.
    pub children: Vec<ChildGroup>,
    /// Built-in bundles first, then data-source bundles in attach order.
    pub data: Vec<EntityData>,
    /// Oldest first.
    pub trace: Vec<TraceEvent>,
}

impl Entity {
    pub fn data_named(&self, name: &str) -> Option<&EntityData> {
        self.data.iter().find(|data| data.name == name)
    }

    pub fn children_of(&self, kind: EntityKind) -> &[Uuid] {
        self.children
            .iter()
            .find(|group| group.kind == kind)
            .map(|group| group.ids.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct ChildGroup {
    pub kind: EntityKind,
    pub ids: Vec<Uuid>,
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct EntityData {
    pub name: String,
    pub value: Json,
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub description: String,
    pub severity: Severity,
    pub timestamp: Timestamp,
    #[facet(skip_unless_truthy)]
    pub referenced: Option<EntityRef>,
}

#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityRef {
    pub id: Uuid,
    pub kind: EntityKind,
}
