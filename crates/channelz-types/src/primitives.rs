use chrono::{DateTime, SecondsFormat, Utc};
use facet::Facet;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("{0} must be non-zero")]
    ZeroId(&'static str),
    #[error("unknown {field}: {value:?}")]
    UnknownName { field: &'static str, value: String },
}

/// Process-unique identifier of a channelz node. Zero means "none" and is
/// never allocated.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct Uuid(u64);

impl Uuid {
    pub fn new(value: u64) -> Result<Self, InvariantError> {
        if value == 0 {
            return Err(InvariantError::ZeroId("uuid"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind as seen by v2 consumers. Top-level and internal channels both
/// report `channel`.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    Subchannel,
    Server,
    ListenSocket,
    Socket,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Channel,
        EntityKind::Subchannel,
        EntityKind::Server,
        EntityKind::ListenSocket,
        EntityKind::Socket,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Subchannel => "subchannel",
            Self::Server => "server",
            Self::ListenSocket => "listen_socket",
            Self::Socket => "socket",
        }
    }

    pub fn parse(name: &str) -> Result<Self, InvariantError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| InvariantError::UnknownName {
                field: "entity kind",
                value: name.to_owned(),
            })
    }
}

/// Kind of a registered node. This is the registry's indexing key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    TopLevelChannel,
    InternalChannel,
    Subchannel,
    Server,
    ListenSocket,
    Socket,
}

impl NodeKind {
    pub fn entity_kind(self) -> EntityKind {
        match self {
            Self::TopLevelChannel | Self::InternalChannel => EntityKind::Channel,
            Self::Subchannel => EntityKind::Subchannel,
            Self::Server => EntityKind::Server,
            Self::ListenSocket => EntityKind::ListenSocket,
            Self::Socket => EntityKind::Socket,
        }
    }

    pub fn is_channel(self) -> bool {
        matches!(self, Self::TopLevelChannel | Self::InternalChannel)
    }

    pub fn has_call_counters(self) -> bool {
        matches!(
            self,
            Self::TopLevelChannel | Self::InternalChannel | Self::Subchannel | Self::Server
        )
    }

    /// Whether nodes of this kind carry a trace ring at all.
    pub fn is_traced(self) -> bool {
        self.has_call_counters()
    }

    /// Description of the synthetic event appended when a traced node is
    /// created.
    pub fn created_description(self) -> Option<&'static str> {
        match self {
            Self::TopLevelChannel | Self::InternalChannel => Some("Channel created"),
            Self::Subchannel => Some("Subchannel created"),
            Self::Server => Some("Server created"),
            Self::ListenSocket | Self::Socket => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopLevelChannel => "top_level_channel",
            Self::InternalChannel => "internal_channel",
            Self::Subchannel => "subchannel",
            Self::Server => "server",
            Self::ListenSocket => "listen_socket",
            Self::Socket => "socket",
        };
        f.write_str(name)
    }
}

#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Name used by the legacy introspection protocol.
    pub fn legacy_name(self) -> &'static str {
        match self {
            Self::Info => "CT_INFO",
            Self::Warning => "CT_WARNING",
            Self::Error => "CT_ERROR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl ConnectivityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// Non-zero encoding for atomic storage; zero is "never reported".
    pub fn to_raw(self) -> u8 {
        match self {
            Self::Idle => 1,
            Self::Connecting => 2,
            Self::Ready => 3,
            Self::TransientFailure => 4,
            Self::Shutdown => 5,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Idle),
            2 => Some(Self::Connecting),
            3 => Some(Self::Ready),
            4 => Some(Self::TransientFailure),
            5 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock instant split the way the wire form carries it.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    pub fn to_system_time(self) -> SystemTime {
        if self.seconds >= 0 {
            UNIX_EPOCH + Duration::new(self.seconds as u64, self.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.seconds.unsigned_abs())
                + Duration::from_nanos(u64::from(self.nanos))
        }
    }

    /// RFC 3339, UTC, nanosecond precision.
    pub fn to_rfc3339(self) -> String {
        DateTime::<Utc>::from(self.to_system_time()).to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        match value.duration_since(UNIX_EPOCH) {
            Ok(since) => Self {
                seconds: since.as_secs().min(i64::MAX as u64) as i64,
                nanos: since.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let seconds = before.as_secs().min(i64::MAX as u64) as i64;
                if before.subsec_nanos() == 0 {
                    Self {
                        seconds: -seconds,
                        nanos: 0,
                    }
                } else {
                    Self {
                        seconds: -seconds - 1,
                        nanos: 1_000_000_000 - before.subsec_nanos(),
                    }
                }
            }
        }
    }
}
