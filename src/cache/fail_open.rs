//! Uniform failure suppression for host-facing operations

use super::stats::CacheStats;
use crate::error::CacheResult;
use crate::logging::log_cache_failure;
use std::future::Future;

/// Run a cache operation; on failure, log it, count it and return `fallback`
///
/// Every host-facing operation goes through here, so the host never sees a
/// cache error: a failed read is a miss, a failed write is a no-op.
pub async fn fail_open<T, F>(
    stats: &CacheStats,
    operation: &str,
    subject: &str,
    fallback: T,
    operation_future: F,
) -> T
where
    F: Future<Output = CacheResult<T>>,
{
    match operation_future.await {
        Ok(value) => value,
        Err(e) => {
            stats.record_failure();
            log_cache_failure(operation, subject, &e);
            fallback
        }
    }
}
