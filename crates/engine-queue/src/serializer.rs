//! Pluggable request serializers (spec.md §4.2): "requests are serialized to
//! bytes on `push` and restored on `pop`. The serializer is pluggable (e.g.
//! JSON for simple payloads, a general-purpose binary serializer when
//! callback references must survive)."
//!
//! Callback/errback references travel as plain strings on [`Request`] and
//! are resolved by name against a per-spider registry at the scraper layer
//! (spec.md §4.2, §9) — both serializers below carry them through
//! unchanged, they just differ in wire compactness.

use engine_protocol::error::QueueError;
use engine_protocol::Request;

pub trait RequestSerializer: Send + Sync {
    fn serialize(&self, request: &Request) -> Result<Vec<u8>, QueueError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Request, QueueError>;
}

/// Human-debuggable JSON serializer, the default for the in-memory and
/// disk-backed queue variants.
#[derive(Default)]
pub struct JsonSerializer;

impl RequestSerializer for JsonSerializer {
    fn serialize(&self, request: &Request) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(request).map_err(|e| QueueError::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Request, QueueError> {
        serde_json::from_slice(bytes).map_err(|e| QueueError::Deserialize(e.to_string()))
    }
}

/// Compact binary serializer for over-the-wire use against shared backends
/// (spec.md §4.2's "general-purpose binary serializer").
#[derive(Default)]
pub struct BincodeSerializer;

impl RequestSerializer for BincodeSerializer {
    fn serialize(&self, request: &Request) -> Result<Vec<u8>, QueueError> {
        bincode::serialize(request).map_err(|e| QueueError::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Request, QueueError> {
        bincode::deserialize(bytes).map_err(|e| QueueError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_protocol::Method;

    fn sample_request() -> Request {
        Request::new(url::Url::parse("http://x/a?b=1").unwrap(), 42)
            .method(Method::Post)
            .body(&b"payload"[..])
            .priority(7)
            .callback("parse_item")
            .build()
    }

    #[test]
    fn json_round_trip_is_byte_identical_on_reserialize() {
        let serializer = JsonSerializer;
        let request = sample_request();

        let once = serializer.serialize(&request).unwrap();
        let restored = serializer.deserialize(&once).unwrap();
        let twice = serializer.serialize(&restored).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn bincode_round_trip_is_byte_identical_on_reserialize() {
        let serializer = BincodeSerializer;
        let request = sample_request();

        let once = serializer.serialize(&request).unwrap();
        let restored = serializer.deserialize(&once).unwrap();
        let twice = serializer.serialize(&restored).unwrap();

        assert_eq!(once, twice);
    }
}
