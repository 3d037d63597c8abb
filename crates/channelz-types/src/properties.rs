use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::time::{Duration, SystemTime};

use crate::Timestamp;

/// A single value stored in a [`PropertyList`].
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bool(bool),
    Timestamp(Timestamp),
    Duration(Duration),
    List(PropertyList),
}

impl PropertyValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Int(v) => JsonValue::from(*v),
            Self::Uint(v) => JsonValue::from(*v),
            Self::Double(v) => Number::from_f64(*v).map_or(JsonValue::Null, JsonValue::Number),
            Self::String(v) => JsonValue::String(v.clone()),
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Timestamp(v) => JsonValue::String(v.to_rfc3339()),
            Self::Duration(v) => JsonValue::String(format_duration(*v)),
            Self::List(v) => v.to_json(),
        }
    }
}

/// Protobuf-style duration text: seconds with a fractional part of 0, 3, 6
/// or 9 digits, suffixed with `s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        format!("{secs}s")
    } else if nanos % 1_000_000 == 0 {
        format!("{secs}.{:03}s", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{secs}.{:06}s", nanos / 1_000)
    } else {
        format!("{secs}.{nanos:09}s")
    }
}

macro_rules! impl_property_value_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

impl_property_value_from! {
    i64 => Int,
    i32 => Int as i64,
    u64 => Uint,
    u32 => Uint as u64,
    usize => Uint as u64,
    f64 => Double,
    bool => Bool,
    String => String,
    Timestamp => Timestamp,
    Duration => Duration,
    PropertyList => List,
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<SystemTime> for PropertyValue {
    fn from(value: SystemTime) -> Self {
        Self::Timestamp(Timestamp::from(value))
    }
}

/// Ordered string-keyed bundle of values contributed by a data source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyList {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Like [`PropertyList::set`], but leaves the list untouched for `None`.
    pub fn set_optional<V: Into<PropertyValue>>(
        self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Folds `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: PropertyList) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn to_json(&self) -> JsonValue {
        let mut object = JsonMap::new();
        for (key, value) in &self.entries {
            object.insert(key.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }
}
