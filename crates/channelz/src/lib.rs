//! In-process channel observability.
//!
//! Every channel, subchannel, server, listen socket and socket that opts in
//! gets a node in a process-wide registry. Nodes carry call or stream
//! counters, a bounded trace of notable events, and any number of attached
//! data sources. The registry answers two query surfaces:
//!
//! - the legacy JSON queries ([`get_top_channels`], [`get_channel`],
//!   [`get_server_sockets`], ...), one string reply per call;
//! - the structured v2 surface ([`get_entity`], [`query_entities`]), also
//!   reachable over framed JSON through [`serve_frame`].
//!
//! ```rust,no_run
//! use channelz::{ChannelNode, DEFAULT_TRACE_MEMORY, get_top_channels};
//!
//! let channel = ChannelNode::new("dns:///svc.example", DEFAULT_TRACE_MEMORY, false);
//! channel.record_call_started();
//! println!("{}", get_top_channels(0).unwrap_or_default());
//! ```
//!
//! Nodes are created through their handles and disappear from every query
//! once the last handle (or attached data source) is dropped.

pub use channelz_runtime::*;
pub use channelz_types::*;

pub use channelz_runtime::TraceEvent;
pub use channelz_types::TraceEvent as EntityTraceEvent;

pub mod wire {
    pub use channelz_wire::*;
}

use channelz_wire::{EntityPage, ErrorReply, Reply, Request, WireError};
use tracing::debug;

/// Answers one v2 request. Failures become [`Reply::Error`], never a panic.
pub fn handle_request(request: &Request) -> Reply {
    let result = match request {
        Request::GetEntity(req) => get_entity(req.id).map(Reply::Entity),
        Request::QueryEntities(req) => query_entities(req.kind, req.start)
            .map(|(entities, end)| Reply::Page(EntityPage { entities, end })),
    };
    result.unwrap_or_else(|err| {
        debug!(kind = err.kind(), %err, "channelz request failed");
        Reply::Error(ErrorReply {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        })
    })
}

/// Decodes one request frame and encodes the reply frame.
pub fn serve_frame(frame: &[u8]) -> Result<Vec<u8>, WireError> {
    let request = channelz_wire::decode_request(frame)?;
    channelz_wire::encode_reply(&handle_request(&request))
}
