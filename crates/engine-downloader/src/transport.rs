//! Pluggable transports (spec.md §4.4: "dispatch through the transport
//! registered for the request URL's scheme").

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use engine_protocol::error::DownloadError;
use engine_protocol::request::Request;
use engine_protocol::response::Response;

/// Executes a single request over the wire (or, in tests, in memory).
/// Analogous to the teacher's transport-agnostic `WorkerHandle` dispatch,
/// generalized here to the request/response pair instead of a job payload.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        request: &Request,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, DownloadError>;

    /// Release any held connections. Called once when the engine shuts down.
    async fn close(&self);
}

/// Dispatches by URL scheme to a registered [`Transport`] (spec.md §4.4:
/// "unknown scheme => `DownloadError::UnknownScheme`").
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Box<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    pub fn register(&mut self, scheme: impl Into<String>, transport: Box<dyn Transport>) {
        self.transports.insert(scheme.into(), transport);
    }

    pub fn get(&self, scheme: &str) -> Option<&dyn Transport> {
        self.transports.get(scheme).map(|t| t.as_ref())
    }

    pub async fn close_all(&self) {
        for transport in self.transports.values() {
            transport.close().await;
        }
    }
}

/// Deterministic mock transports for downstream crates' tests (spec.md's
/// ambient test-tooling note, SPEC_FULL.md §6). Only compiled when the
/// `testing` feature is enabled so it never ships in production builds.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use engine_protocol::headers::HeaderMap;

    /// Always returns a fixed status/body, regardless of the request.
    pub struct FixedTransport {
        pub status: u16,
        pub body: bytes::Bytes,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn fetch(
            &self,
            request: &Request,
            _proxy: Option<&str>,
            _timeout: Duration,
        ) -> Result<Response, DownloadError> {
            Ok(Response {
                url: request.url.clone(),
                status: self.status,
                headers: HeaderMap::new(),
                body: self.body.clone(),
                request: std::sync::Arc::new(request.clone()),
                flags: Vec::new(),
                transport: Default::default(),
            })
        }

        async fn close(&self) {}
    }

    /// Returns a scripted sequence of outcomes, one per call, looping on the
    /// last entry once exhausted. Lets tests exercise retry sequences
    /// deterministically.
    pub struct ScriptedTransport {
        script: Vec<Result<(u16, bytes::Bytes), String>>,
        calls: AtomicUsize,
        call_log: Mutex<Vec<url::Url>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<(u16, bytes::Bytes), String>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                call_log: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn urls_seen(&self) -> Vec<url::Url> {
            self.call_log.lock().expect("call log lock poisoned").clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(
            &self,
            request: &Request,
            _proxy: Option<&str>,
            _timeout: Duration,
        ) -> Result<Response, DownloadError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_log
                .lock()
                .expect("call log lock poisoned")
                .push(request.url.clone());
            let step = &self.script[index.min(self.script.len() - 1)];
            match step {
                Ok((status, body)) => Ok(Response {
                    url: request.url.clone(),
                    status: *status,
                    headers: HeaderMap::new(),
                    body: body.clone(),
                    request: std::sync::Arc::new(request.clone()),
                    flags: Vec::new(),
                    transport: Default::default(),
                }),
                Err(message) => Err(DownloadError::Transport(message.clone())),
            }
        }

        async fn close(&self) {}
    }
}
