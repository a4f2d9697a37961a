//! The `Response` data model (spec.md §3).

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::headers::HeaderMap;
use crate::request::Request;

/// Optional transport-level metadata a `Transport` implementation may
/// attach; the core never interprets these, it only carries them through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransportMeta {
    pub remote_ip: Option<String>,
    pub tls_protocol: Option<String>,
    pub certificate_fingerprint: Option<String>,
}

/// A response is always born from exactly one request (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub url: url::Url,
    pub status: u16,
    pub headers: HeaderMap,
    #[serde(with = "crate::bytes_codec")]
    pub body: Bytes,
    pub request: Arc<Request>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub transport: TransportMeta,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
