use channelz_types::ChannelzError;
use std::collections::BTreeMap;
use tracing::debug;

/// Builder for exporting channelz data to an external observability
/// backend. No backend ships in this build.
#[derive(Clone, Debug, Default)]
pub struct CustomObservabilityBuilder {
    labels: BTreeMap<String, String>,
}

impl CustomObservabilityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Always fails with `unimplemented`; registers nothing.
    pub fn build_and_register(self) -> Result<(), ChannelzError> {
        debug!(labels = self.labels.len(), "custom observability requested");
        Err(ChannelzError::Unimplemented("Not Implemented".into()))
    }
}
