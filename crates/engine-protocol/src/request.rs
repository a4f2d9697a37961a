//! The `Request` data model (spec.md §3).

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::headers::HeaderMap;

/// Reserved, typed fields of a request's `meta`, plus an overflow map for
/// user data. Keeping these as named fields (rather than an untyped map,
/// as the source system does) is the redesign called for in spec.md §9.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestMeta {
    /// Proxy URL override for this request only.
    pub proxy: Option<String>,
    /// Per-request timeout; combined with `DOWNLOAD_TIMEOUT` via `min` (spec.md §5).
    pub timeout: Option<Duration>,
    /// Number of retries already attempted for this request.
    #[serde(default)]
    pub retry_count: u32,
    /// Number of parent->child hops from a start URL (spec.md glossary).
    #[serde(default)]
    pub depth: u32,
    /// Bypass the dupe filter for this request.
    #[serde(default)]
    pub dont_filter: bool,
    /// Arbitrary user data that doesn't warrant a dedicated field.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl RequestMeta {
    pub fn child(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            timeout: self.timeout,
            retry_count: 0,
            depth: self.depth + 1,
            dont_filter: false,
            extra: HashMap::new(),
        }
    }
}

/// A name by which a callback (parser) can be looked up in a
/// [`crate::registry::ComponentRegistry`]. Compile-time registry lookup
/// replaces the source system's runtime class-by-string-path wiring
/// (spec.md §9) while still letting callbacks survive serialization.
pub type CallbackRef = String;

/// A unit of crawl work (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub url: url::Url,
    pub method: Method,
    pub headers: HeaderMap,
    #[serde(with = "crate::bytes_codec")]
    pub body: Bytes,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    pub priority: i64,
    pub callback: Option<CallbackRef>,
    pub errback: Option<CallbackRef>,
    pub meta: RequestMeta,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Monotonically increasing sequence number assigned on construction,
    /// used only to break priority ties FIFO within a single process.
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }
}

impl Request {
    /// Start building a request. `sequence` must be supplied by the caller
    /// (typically a per-spider monotonic counter on `CrawlerContext`) so
    /// that FIFO tie-breaking is deterministic without touching the clock.
    pub fn new(url: url::Url, sequence: u64) -> RequestBuilder {
        RequestBuilder {
            url,
            method: Method::Get,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cookies: HashMap::new(),
            priority: 0,
            callback: None,
            errback: None,
            meta: RequestMeta::default(),
            flags: Vec::new(),
            sequence,
        }
    }

    /// A request inheriting this request's depth+1, used when a parser
    /// yields a new `Request` (spec.md §4.5 depth tracking).
    pub fn child(&self, url: url::Url, sequence: u64) -> RequestBuilder {
        let mut builder = Request::new(url, sequence);
        builder.meta = self.meta.child();
        builder
    }
}

pub struct RequestBuilder {
    url: url::Url,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
    cookies: HashMap<String, String>,
    priority: i64,
    callback: Option<CallbackRef>,
    errback: Option<CallbackRef>,
    meta: RequestMeta,
    flags: Vec<String>,
    sequence: u64,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn errback(mut self, errback: impl Into<String>) -> Self {
        self.errback = Some(errback.into());
        self
    }

    pub fn dont_filter(mut self, dont_filter: bool) -> Self {
        self.meta.dont_filter = dont_filter;
        self
    }

    pub fn meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn build(self) -> Request {
        Request {
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            cookies: self.cookies,
            priority: self.priority,
            callback: self.callback,
            errback: self.errback,
            meta: self.meta,
            flags: self.flags,
            sequence: self.sequence,
        }
    }
}
