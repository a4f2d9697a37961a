//! Shared approximate (Bloom) fingerprint filter (spec.md §4.1): a bit
//! array of configurable size with `k` hash functions; `seen` is a
//! test-and-set of all `k` bits, returning true iff all were already set.
//!
//! Bit storage is pluggable via [`BloomBackend`] so the same bit-setting
//! logic backs both an in-process bitmap and the Redis bitmap named
//! `{spider}:bloomfilter` in spec.md §6.

use async_trait::async_trait;
use engine_protocol::error::FilterError;
use engine_protocol::fingerprint;
use engine_protocol::settings::BloomFilterConfig;
use engine_protocol::Request;

use crate::{FingerprintFilter, ReleaseReason};

/// Storage for a Bloom filter's bit array. `test_and_set` must be atomic
/// per bit index: it sets the bit and reports whether it was already set.
#[async_trait]
pub trait BloomBackend: Send + Sync {
    async fn test_and_set(&self, index: u64) -> Result<bool, FilterError>;
    async fn clear(&self, index: u64) -> Result<(), FilterError>;
}

pub struct MemoryBloomBackend {
    bits: Vec<std::sync::atomic::AtomicU64>,
}

impl MemoryBloomBackend {
    pub fn new(bit_count: u64) -> Self {
        let words = (bit_count / 64) + 1;
        let mut bits = Vec::with_capacity(words as usize);
        bits.resize_with(words as usize, || std::sync::atomic::AtomicU64::new(0));
        Self { bits }
    }
}

#[async_trait]
impl BloomBackend for MemoryBloomBackend {
    async fn test_and_set(&self, index: u64) -> Result<bool, FilterError> {
        let word = (index / 64) as usize;
        let bit = 1u64 << (index % 64);
        let word = self
            .bits
            .get(word)
            .ok_or_else(|| FilterError::Corrupt(format!("bloom index {index} out of range")))?;
        let previous = word.fetch_or(bit, std::sync::atomic::Ordering::SeqCst);
        Ok(previous & bit != 0)
    }

    async fn clear(&self, index: u64) -> Result<(), FilterError> {
        let word = (index / 64) as usize;
        let bit = 1u64 << (index % 64);
        if let Some(word) = self.bits.get(word) {
            word.fetch_and(!bit, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Standard Bloom filter `k`-hash derivation: two independent 64-bit hashes
/// of the fingerprint string combined via double hashing
/// (`h_i = h1 + i*h2`), avoiding `k` separate hash computations.
fn bit_indices(fingerprint: &str, bits: u64, k: u32) -> Vec<u64> {
    let h1 = blake3::hash(fingerprint.as_bytes());
    let bytes = h1.as_bytes();
    let h1 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let h2 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());

    (0..k as u64)
        .map(|i| (h1.wrapping_add(i.wrapping_mul(h2))) % bits)
        .collect()
}

pub struct BloomFilter<B: BloomBackend> {
    backend: B,
    config: BloomFilterConfig,
    significant_headers: Vec<String>,
}

impl<B: BloomBackend> BloomFilter<B> {
    pub fn new(backend: B, config: BloomFilterConfig) -> Self {
        Self {
            backend,
            config,
            significant_headers: Vec::new(),
        }
    }

    fn fingerprint(&self, request: &Request) -> String {
        let headers: Vec<&str> = self.significant_headers.iter().map(String::as_str).collect();
        fingerprint::compute_for_request(request, &headers)
    }

    /// Theoretical false-positive rate for the current fill level,
    /// documented per spec.md §4.1 ("document it in operator-visible
    /// settings"): `(1 - e^(-k*n/m))^k`.
    pub fn false_positive_rate(&self, inserted: u64) -> f64 {
        let m = self.config.bits as f64;
        let k = self.config.k as f64;
        let n = inserted as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

#[async_trait]
impl<B: BloomBackend> FingerprintFilter for BloomFilter<B> {
    async fn seen(&self, request: &Request) -> Result<bool, FilterError> {
        let fp = self.fingerprint(request);
        let indices = bit_indices(&fp, self.config.bits, self.config.k);

        let mut all_already_set = true;
        for index in indices {
            let was_set = self.backend.test_and_set(index).await?;
            all_already_set &= was_set;
        }
        Ok(all_already_set)
    }

    async fn release(&self, request: &Request, _reason: ReleaseReason) {
        let fp = self.fingerprint(request);
        for index in bit_indices(&fp, self.config.bits, self.config.k) {
            let _ = self.backend.clear(index).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_protocol::Method;

    fn request(url: &str, sequence: u64) -> Request {
        Request::new(url::Url::parse(url).unwrap(), sequence)
            .method(Method::Get)
            .build()
    }

    #[tokio::test]
    async fn admitted_request_is_seen_on_second_pass() {
        let backend = MemoryBloomBackend::new(1 << 16);
        let filter = BloomFilter::new(backend, BloomFilterConfig::new(1 << 16, 7));
        let req = request("http://x/", 0);

        assert!(!filter.seen(&req).await.unwrap());
        assert!(filter.seen(&req).await.unwrap());
    }

    #[tokio::test]
    async fn distinct_requests_are_usually_distinguished() {
        let backend = MemoryBloomBackend::new(1 << 16);
        let filter = BloomFilter::new(backend, BloomFilterConfig::new(1 << 16, 7));

        for i in 0..50 {
            let req = request(&format!("http://x/{i}"), i);
            assert!(!filter.seen(&req).await.unwrap());
        }
        // Spot check one of the already-admitted requests is still "seen".
        let req = request("http://x/7", 7);
        assert!(filter.seen(&req).await.unwrap());
    }
}
