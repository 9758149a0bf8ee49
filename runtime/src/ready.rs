//! The ready-set query's limit normalization (§4.1, boundary behaviors in
//! §8): `limit == 0` returns nothing, a negative limit is unbounded, and
//! very large limits (the caller may pass `MAX_SAFE_INTEGER`) must not
//! overflow or crash. `TaskRepository::ready` itself takes the
//! already-normalized value and turns it into SQL's own `LIMIT` semantics,
//! where `LIMIT 0` and `LIMIT -1` already mean "nothing" and "unbounded"
//! respectively — normalization here just documents and tests the contract
//! rather than reimplementing SQL's behavior in Rust.

use std::sync::Arc;

use orchestrator_core::{Result, Task, TaskRepository};

/// The largest limit a caller is guaranteed safe to pass without overflow
/// (`Number.MAX_SAFE_INTEGER`, for callers crossing from a JSON-number API).
pub const MAX_SAFE_LIMIT: i64 = 9_007_199_254_740_991;

/// Normalizes a caller-supplied limit into the value handed to the
/// repository: `0` stays `0` (empty), negative collapses to `-1`
/// (unbounded), everything else passes through unchanged.
pub fn effective_limit(raw: i64) -> i64 {
    if raw == 0 {
        0
    } else if raw < 0 {
        -1
    } else {
        raw
    }
}

/// Thin wrapper around `TaskRepository::ready` applying limit normalization.
pub struct ReadySetService<T> {
    tasks: Arc<T>,
}

impl<T: TaskRepository> ReadySetService<T> {
    pub fn new(tasks: Arc<T>) -> Self {
        Self { tasks }
    }

    pub async fn ready(&self, limit: i64) -> Result<Vec<Task>> {
        let normalized = effective_limit(limit);
        if normalized == 0 {
            return Ok(Vec::new());
        }
        self.tasks.ready(normalized).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stays_zero() {
        assert_eq!(effective_limit(0), 0);
    }

    #[test]
    fn negative_collapses_to_unbounded_sentinel() {
        assert_eq!(effective_limit(-1), -1);
        assert_eq!(effective_limit(-1000), -1);
    }

    #[test]
    fn positive_passes_through_including_max_safe_limit() {
        assert_eq!(effective_limit(5), 5);
        assert_eq!(effective_limit(MAX_SAFE_LIMIT), MAX_SAFE_LIMIT);
    }
}
