//! Shared exact fingerprint filter over Redis (spec.md §4.1 "Shared exact":
//! a shared set keyed by a per-spider namespace; membership test is atomic
//! add-if-absent). Key name per spec.md §6: `{spider}:dupefilter`.

use async_trait::async_trait;
use engine_protocol::error::FilterError;
use engine_protocol::fingerprint;
use engine_protocol::Request;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{FingerprintFilter, ReleaseReason};

pub struct RedisFilter {
    conn: ConnectionManager,
    key: String,
    significant_headers: Vec<String>,
}

impl RedisFilter {
    pub async fn connect(redis_url: &str, spider_name: &str) -> Result<Self, FilterError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FilterError::BackendUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| FilterError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            conn,
            key: format!("{spider_name}:dupefilter"),
            significant_headers: Vec::new(),
        })
    }

    fn fingerprint(&self, request: &Request) -> String {
        let headers: Vec<&str> = self.significant_headers.iter().map(String::as_str).collect();
        fingerprint::compute_for_request(request, &headers)
    }
}

#[async_trait]
impl FingerprintFilter for RedisFilter {
    async fn seen(&self, request: &Request) -> Result<bool, FilterError> {
        let fp = self.fingerprint(request);
        let mut conn = self.conn.clone();
        // SADD returns the number of elements actually added; 0 means the
        // member was already present, i.e. an atomic test-and-set.
        let added: i64 = conn
            .sadd(&self.key, &fp)
            .await
            .map_err(|e| FilterError::BackendUnavailable(e.to_string()))?;
        Ok(added == 0)
    }

    async fn release(&self, request: &Request, _reason: ReleaseReason) {
        let fp = self.fingerprint(request);
        let mut conn = self.conn.clone();
        let _: Result<i64, _> = conn.srem(&self.key, &fp).await;
    }
}
