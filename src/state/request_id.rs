use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::format_request_seq_hex;

/// Per-process sequence for completion ids and prompt file tokens.
///
/// Tokens mix the sequence with a random seed so files from different proxy
/// processes sharing one scratch directory do not collide.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub(crate) fn prompt_token(&self, request_seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(request_seq))
    }

    #[must_use]
    pub(crate) fn completion_id(request_seq: u64) -> String {
        format_request_seq_hex("chatcmpl-", request_seq)
    }
}
