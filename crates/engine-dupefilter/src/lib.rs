//! Fingerprint filter variants (spec.md §4.1).

pub mod bloom;
pub mod disk;
pub mod memory;
pub mod redis_shared;
pub mod retryable;

use async_trait::async_trait;
use engine_protocol::error::FilterError;
use engine_protocol::Request;

/// Why a fingerprint was released back to "unseen" (spec.md §4.1's
/// "retryable variants" note, and §7's failure-retraction path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// The request that claimed this fingerprint ultimately failed and
    /// should be allowed to re-enter the queue.
    RequestFailed,
    /// Operator- or test-driven explicit reset.
    Manual,
}

/// Contract shared by every fingerprint filter implementation (spec.md
/// §4.1). The engine talks only to this trait and never knows which
/// backend is active.
#[async_trait]
pub trait FingerprintFilter: Send + Sync {
    /// Returns `true` if this request (by fingerprint) has already been
    /// admitted. A transient backend failure must surface as `Err`, never
    /// be papered over as `Ok(true)` or `Ok(false)` (spec.md §4.1).
    async fn seen(&self, request: &Request) -> Result<bool, FilterError>;

    /// Remove a fingerprint so a logically-equivalent request can re-enter
    /// (spec.md §4.1, used by the retry path in §7).
    async fn release(&self, request: &Request, reason: ReleaseReason);
}
