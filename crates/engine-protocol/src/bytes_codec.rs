//! Shared serde helper for (de)serializing `bytes::Bytes` as a byte vector.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_bytes(bytes)
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
    let v = Vec::<u8>::deserialize(d)?;
    Ok(Bytes::from(v))
}
