use serde_json::json;

/// Failure returned by channelz queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelzError {
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },
    #[error("{0}")]
    Unimplemented(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChannelzError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unimplemented(_) => "unimplemented",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Internal(_) => "internal",
        }
    }

    /// Structured error payload returned through the string query surface.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}
