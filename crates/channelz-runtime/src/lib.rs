//! Process-wide channelz registry: live channels, subchannels, servers and
//! sockets, their counters and trace rings, and the queries that render
//! them.

pub(crate) mod clock;
pub(crate) mod counters;
pub(crate) mod engine;
pub(crate) mod handles;
pub(crate) mod node;
pub(crate) mod observability;
pub(crate) mod query;
pub(crate) mod registry;
pub(crate) mod render;
pub(crate) mod source;
pub(crate) mod trace;
pub(crate) mod ztrace;

pub use self::counters::*;
pub use self::engine::*;
pub use self::handles::*;
pub use self::node::{ChildLink, Node};
pub use self::observability::*;
pub use self::query::*;
pub use self::registry::{PAGINATION_LIMIT, get_page, get_page_where, lookup, test_only_reset};
pub use self::render::{render_address, strip_additional_info};
pub use self::source::*;
pub use self::trace::*;
pub use self::ztrace::*;
