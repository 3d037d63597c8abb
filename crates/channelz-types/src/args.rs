use std::collections::BTreeMap;
use tracing::warn;

/// Turns channelz on or off for the channel or server being built.
pub const ENABLE_CHANNELZ: &str = "enable_channelz";
/// Per-node trace budget in bytes; zero disables the trace ring.
pub const MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE: &str = "max_channel_trace_event_memory_per_node";
/// Marks a channel as created by the runtime for its own use.
pub const CHANNELZ_IS_INTERNAL_CHANNEL: &str = "channelz_is_internal_channel";

pub const ENABLE_CHANNELZ_DEFAULT: bool = true;
pub const MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE_DEFAULT: usize = 4 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Int(i64),
    Bool(bool),
    String(String),
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Key/value arguments handed to channel and server constructors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelArgs {
    values: BTreeMap<String, ArgValue>,
}

impl ChannelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.values.get(key)
    }

    /// Integers are accepted as booleans (non-zero is true), matching how
    /// C-style channel args carry flags.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            ArgValue::Bool(value) => Some(*value),
            ArgValue::Int(value) => Some(*value != 0),
            ArgValue::String(value) => {
                warn!(key, value = %value, "channel arg expects a boolean, ignoring");
                None
            }
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            ArgValue::Int(value) => Some(*value),
            other => {
                warn!(key, value = ?other, "channel arg expects an integer, ignoring");
                None
            }
        }
    }
}

/// Channelz settings resolved from [`ChannelArgs`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelzConfig {
    pub enabled: bool,
    pub trace_memory: usize,
    pub is_internal: bool,
}

impl Default for ChannelzConfig {
    fn default() -> Self {
        Self {
            enabled: ENABLE_CHANNELZ_DEFAULT,
            trace_memory: MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE_DEFAULT,
            is_internal: false,
        }
    }
}

impl ChannelzConfig {
    pub fn from_args(args: &ChannelArgs) -> Self {
        let defaults = Self::default();
        let trace_memory = args
            .get_int(MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE)
            .map(|bytes| usize::try_from(bytes.max(0)).unwrap_or(usize::MAX))
            .unwrap_or(defaults.trace_memory);
        Self {
            enabled: args.get_bool(ENABLE_CHANNELZ).unwrap_or(defaults.enabled),
            trace_memory,
            is_internal: args
                .get_bool(CHANNELZ_IS_INTERNAL_CHANNEL)
                .unwrap_or(defaults.is_internal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_args() {
        assert_eq!(
            ChannelzConfig::from_args(&ChannelArgs::new()),
            ChannelzConfig::default()
        );
    }

    #[test]
    fn integer_flags_read_as_booleans() {
        let args = ChannelArgs::new()
            .set(ENABLE_CHANNELZ, 0)
            .set(CHANNELZ_IS_INTERNAL_CHANNEL, 1)
            .set(MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE, 64);
        let config = ChannelzConfig::from_args(&args);
        assert!(!config.enabled);
        assert!(config.is_internal);
        assert_eq!(config.trace_memory, 64);
    }

    #[test]
    fn negative_trace_memory_clamps_to_zero() {
        let args = ChannelArgs::new().set(MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE, -5);
        assert_eq!(ChannelzConfig::from_args(&args).trace_memory, 0);
    }

    #[test]
    fn mistyped_values_fall_back_to_defaults() {
        let args = ChannelArgs::new()
            .set(ENABLE_CHANNELZ, "yes please")
            .set(MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE, true);
        assert_eq!(ChannelzConfig::from_args(&args), ChannelzConfig::default());
    }
}
