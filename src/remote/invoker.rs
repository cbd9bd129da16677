// =============================================================================
// Remote Invoker — bounded, cancellable calls to the inference collaborator
// =============================================================================
//
// Every call:
//   1. waits for a permit from the global concurrency cap
//   2. runs under a hard per-attempt timeout
//   3. retries transient failures (timeout, transport, 429/5xx) with
//      exponential backoff: base, 2*base, 4*base, ...
//   4. gives up immediately on malformed replies
// Supersession of the owning cycle abandons the call at any await point.
//
// Worst-case latency = (retries + 1) * timeout + backoff sum; it never blocks
// past that.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::client::RemoteInference;
use super::reply::RemoteReply;
use super::request::InferenceRequest;
use crate::error::RemoteServiceError;
use crate::scheduler::CycleToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }

    /// Upper bound on one invocation's wall time, excluding permit waits.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_retries + 1;
        let backoff: Duration = (0..self.max_retries).map(|a| self.backoff(a)).sum();
        self.timeout.saturating_mul(attempts) + backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Lock-free call counters.
#[derive(Debug, Default)]
struct InvokerCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokerSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub abandoned: u64,
}

pub struct RemoteInvoker {
    inner: Arc<dyn RemoteInference>,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
    counters: InvokerCounters,
}

impl RemoteInvoker {
    pub fn new(inner: Arc<dyn RemoteInference>, policy: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            inner,
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            counters: InvokerCounters::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke(
        &self,
        request: &InferenceRequest,
        token: &CycleToken,
    ) -> Result<RemoteReply, RemoteServiceError> {
        let mut attempt = 0u32;
        loop {
            let result = tokio::select! {
                biased;
                _ = token.superseded() => Err(RemoteServiceError::Superseded),
                r = self.attempt(request) => r,
            };

            match result {
                Ok(reply) => {
                    self.counters.successes.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        asset = %request.asset,
                        attempt,
                        action = %reply.action,
                        confidence = format!("{:.2}", reply.confidence),
                        "remote inference succeeded"
                    );
                    return Ok(reply);
                }
                Err(RemoteServiceError::Superseded) => {
                    self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                    return Err(RemoteServiceError::Superseded);
                }
                Err(err) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    if let RemoteServiceError::Timeout(_) = err {
                        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    if !err.is_transient() || attempt >= self.policy.max_retries {
                        return Err(err);
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        asset = %request.asset,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote inference attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = token.superseded() => {
                            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                            return Err(RemoteServiceError::Superseded);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, request: &InferenceRequest) -> Result<RemoteReply, RemoteServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RemoteServiceError::Disabled)?;
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.policy.timeout, self.inner.infer(request)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteServiceError::Timeout(self.policy.timeout)),
        }
    }

    pub fn snapshot(&self) -> InvokerSnapshot {
        InvokerSnapshot {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RemoteInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInvoker")
            .field("remote", &self.inner.name())
            .field("policy", &self.policy)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}
