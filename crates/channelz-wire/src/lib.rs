//! Framing for channelz v2 records: a big-endian `u32` payload length, then
//! the JSON payload.

use channelz_types::{Entity, EntityKind};
use facet::Facet;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_BYTES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("channelz payload of {payload_bytes} bytes exceeds the {limit}-byte frame limit")]
    Oversized { payload_bytes: usize, limit: usize },
    #[error("channelz frame needs a 4-byte length prefix, got {available} bytes")]
    MissingLength { available: usize },
    #[error("channelz frame declares {declared} payload bytes, limit is {limit}")]
    DeclaredTooLarge { declared: usize, limit: usize },
    #[error("channelz frame declares {declared} payload bytes but carries {available}")]
    LengthMismatch { declared: usize, available: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("cannot encode channelz {record}: {reason}")]
    Encode { record: &'static str, reason: String },
    #[error("cannot decode channelz {record}: {reason}")]
    Decode { record: &'static str, reason: String },
}

pub fn encode_frame(payload: &[u8], limit: usize) -> Result<Vec<u8>, FrameError> {
    let oversized = || FrameError::Oversized {
        payload_bytes: payload.len(),
        limit,
    };
    if payload.len() > limit {
        return Err(oversized());
    }
    let declared = u32::try_from(payload.len()).map_err(|_| oversized())?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    frame.extend_from_slice(&declared.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Borrows the payload of exactly one whole frame.
pub fn decode_frame(frame: &[u8], limit: usize) -> Result<&[u8], FrameError> {
    let Some((prefix, payload)) = frame.split_first_chunk::<LENGTH_PREFIX_BYTES>() else {
        return Err(FrameError::MissingLength {
            available: frame.len(),
        });
    };
    let declared = u32::from_be_bytes(*prefix) as usize;
    if declared > limit {
        return Err(FrameError::DeclaredTooLarge { declared, limit });
    }
    if payload.len() != declared {
        return Err(FrameError::LengthMismatch {
            declared,
            available: payload.len(),
        });
    }
    Ok(payload)
}

/// One page of a v2 entity enumeration.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    pub end: bool,
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct GetEntityRequest {
    pub id: i64,
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct QueryEntitiesRequest {
    #[facet(skip_unless_truthy)]
    pub kind: Option<EntityKind>,
    pub start: i64,
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Request {
    GetEntity(GetEntityRequest),
    QueryEntities(QueryEntitiesRequest),
}

#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct ErrorReply {
    pub kind: String,
    pub message: String,
}

#[derive(Facet, Clone, Debug, PartialEq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Reply {
    Entity(Entity),
    Page(EntityPage),
    Error(ErrorReply),
}

macro_rules! json_codec {
    ($ty:ty, $record:literal, $encode:ident, $decode:ident) => {
        pub fn $encode(value: &$ty) -> Result<Vec<u8>, WireError> {
            let payload = facet_json::to_vec(value).map_err(|e| WireError::Encode {
                record: $record,
                reason: e.to_string(),
            })?;
            Ok(encode_frame(&payload, DEFAULT_MAX_FRAME_BYTES)?)
        }

        pub fn $decode(frame: &[u8]) -> Result<$ty, WireError> {
            let payload = decode_frame(frame, DEFAULT_MAX_FRAME_BYTES)?;
            facet_json::from_slice(payload).map_err(|e| WireError::Decode {
                record: $record,
                reason: e.to_string(),
            })
        }
    };
}

json_codec!(Entity, "entity", encode_entity, decode_entity);
json_codec!(EntityPage, "entity page", encode_entity_page, decode_entity_page);
json_codec!(Request, "request", encode_request, decode_request);
json_codec!(Reply, "reply", encode_reply, decode_reply);

#[cfg(test)]
mod tests {
    use super::*;
    use channelz_types::{
        ChildGroup, EntityData, EntityRef, Json, Severity, Timestamp, TraceEvent, Uuid,
    };

    fn uuid(raw: u64) -> Uuid {
        Uuid::new(raw).expect("non-zero uuid")
    }

    fn payload_json(frame: &[u8]) -> String {
        let payload = decode_frame(frame, DEFAULT_MAX_FRAME_BYTES).expect("frame should decode");
        std::str::from_utf8(payload)
            .expect("payload should be utf8 json")
            .to_string()
    }

    fn sample_entity() -> Entity {
        Entity {
            id: uuid(3),
            kind: EntityKind::Channel,
            orphaned: false,
            parents: vec![],
            children: vec![ChildGroup {
                kind: EntityKind::Subchannel,
                ids: vec![uuid(4), uuid(5)],
            }],
            data: vec![EntityData {
                name: "channel".into(),
                value: Json::new(r#"{"target":"dns:///svc"}"#),
            }],
            trace: vec![TraceEvent {
                description: "Channel created".into(),
                severity: Severity::Info,
                timestamp: Timestamp {
                    seconds: 1_700_000_000,
                    nanos: 5,
                },
                referenced: None,
            }],
        }
    }

    #[test]
    fn request_wire_shape() {
        let frame = encode_request(&Request::QueryEntities(QueryEntitiesRequest {
            kind: None,
            start: 0,
        }))
        .expect("request encodes");
        assert_eq!(payload_json(&frame), r#"{"query_entities":{"start":0}}"#);

        let frame = encode_request(&Request::GetEntity(GetEntityRequest { id: 12 }))
            .expect("request encodes");
        assert_eq!(payload_json(&frame), r#"{"get_entity":{"id":12}}"#);
    }

    #[test]
    fn entity_wire_shape() {
        let mut entity = sample_entity();
        entity.data.clear();
        entity.trace[0].referenced = Some(EntityRef {
            id: uuid(4),
            kind: EntityKind::Subchannel,
        });
        let frame = encode_entity(&entity).expect("entity encodes");
        assert_eq!(
            payload_json(&frame),
            r#"{"id":3,"kind":"channel","orphaned":false,"parents":[],"children":[{"kind":"subchannel","ids":[4,5]}],"data":[],"trace":[{"description":"Channel created","severity":"info","timestamp":{"seconds":1700000000,"nanos":5},"referenced":{"id":4,"kind":"subchannel"}}]}"#
        );
    }

    #[test]
    fn entity_page_survives_framing() {
        let page = EntityPage {
            entities: vec![sample_entity()],
            end: true,
        };
        let frame = encode_entity_page(&page).expect("page encodes");
        assert_eq!(decode_entity_page(&frame).expect("page decodes"), page);
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let frame = encode_entity(&sample_entity()).expect("entity encodes");
        let err = decode_entity(&frame[..frame.len() - 1]).expect_err("payload cut short");
        assert!(matches!(
            err,
            WireError::Frame(FrameError::LengthMismatch { .. })
        ));
        assert_eq!(
            decode_frame(&[0, 0], DEFAULT_MAX_FRAME_BYTES),
            Err(FrameError::MissingLength { available: 2 })
        );
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let payload = vec![b' '; 32];
        let err = encode_frame(&payload, 16).expect_err("over the limit");
        assert_eq!(
            err,
            FrameError::Oversized {
                payload_bytes: 32,
                limit: 16
            }
        );
        assert_eq!(
            err.to_string(),
            "channelz payload of 32 bytes exceeds the 16-byte frame limit"
        );
        let frame = encode_frame(&payload, 64).expect("within limit");
        assert_eq!(
            decode_frame(&frame, 16),
            Err(FrameError::DeclaredTooLarge {
                declared: 32,
                limit: 16
            })
        );
    }

    #[test]
    fn decode_errors_name_the_record() {
        let frame = encode_frame(br#"{"kind":"channel"}"#, DEFAULT_MAX_FRAME_BYTES)
            .expect("within limit");
        let err = decode_entity(&frame).expect_err("missing fields");
        assert!(matches!(err, WireError::Decode { record: "entity", .. }));
        assert!(err.to_string().starts_with("cannot decode channelz entity: "));
    }
}
