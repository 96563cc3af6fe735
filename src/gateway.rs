use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::concurrency::ConcurrencyGate;
use crate::error::{GatewayError, Result};
use crate::openai::ModelResponse;
use crate::rate_limiter::{AdmissionMode, RpmLimiter};

/// The outbound boundary to the model API. The gateway depends on this trait
/// rather than a concrete client so tests can inject fakes.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn call(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        max_output_tokens: Option<u32>,
        deterministic: bool,
    ) -> Result<ModelResponse>;
}

/// Round a fractional reset estimate up to whole seconds for Retry-After.
fn retry_after_from(reset_in: f64) -> u64 {
    reset_in.max(0.0).ceil() as u64
}

/// The single sanctioned path to the model API.
///
/// Composes the per-credential concurrency gate and RPM limiter around the
/// low-level caller. Ordering: the gate is entered first and released last,
/// wrapping both the admission step and the call itself; the permit is a
/// drop guard, so the slot is returned on every path including limiter
/// rejection and caller errors. The gateway never retries; backoff policy
/// belongs to callers, informed by `retry_after`.
pub struct AiGateway {
    limiter: RpmLimiter,
    gate: ConcurrencyGate,
    mode: AdmissionMode,
    caller: Arc<dyn ModelCaller>,
}

impl AiGateway {
    pub fn new(
        limiter: RpmLimiter,
        gate: ConcurrencyGate,
        mode: AdmissionMode,
        caller: Arc<dyn ModelCaller>,
    ) -> Self {
        Self {
            limiter,
            gate,
            mode,
            caller,
        }
    }

    pub fn admission_mode(&self) -> AdmissionMode {
        self.mode
    }

    pub fn limiter(&self) -> &RpmLimiter {
        &self.limiter
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Send one prompt through the rate-governance layer.
    ///
    /// In `FailFast` mode an exhausted window fails with
    /// `RateLimitExceeded` carrying `ceil(reset_in)` as the retry hint and
    /// the low-level caller is never invoked. In `Block` mode the call
    /// waits for a window slot instead. All caller failures propagate
    /// verbatim.
    pub async fn invoke(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        max_output_tokens: Option<u32>,
        deterministic: bool,
    ) -> Result<ModelResponse> {
        // Gate first, released last via drop.
        let _permit = self.gate.enter(credential).await?;

        match self.mode {
            AdmissionMode::Block => self.limiter.acquire(credential).await,
            AdmissionMode::FailFast => {
                if let Err(rejection) = self.limiter.try_acquire(credential).await {
                    let retry_after = retry_after_from(rejection.reset_in);
                    warn!(
                        limit = rejection.limit,
                        retry_after, "model RPM window exhausted, rejecting call"
                    );
                    return Err(GatewayError::RateLimitExceeded {
                        detail: format!(
                            "model RPM limit exceeded for credential; configured limit: {}/minute",
                            rejection.limit
                        ),
                        retry_after: Some(retry_after),
                    });
                }
            }
        }

        debug!(model, "admitted, delegating to model caller");
        self.caller
            .call(credential, model, prompt, max_output_tokens, deterministic)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    struct FakeCaller {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl FakeCaller {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelCaller for FakeCaller {
        async fn call(
            &self,
            _credential: &str,
            model: &str,
            _prompt: &str,
            _max_output_tokens: Option<u32>,
            _deterministic: bool,
        ) -> Result<ModelResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail {
                return Err(GatewayError::Upstream("model API error 500".to_string()));
            }
            Ok(ModelResponse::new(json!({
                "status": "completed",
                "output_text": format!("echo from {model}"),
            })))
        }
    }

    fn gateway(
        capacity: u32,
        window_ms: u64,
        concurrency: u32,
        mode: AdmissionMode,
        caller: Arc<FakeCaller>,
    ) -> AiGateway {
        AiGateway::new(
            RpmLimiter::new(
                capacity,
                Duration::from_millis(window_ms),
                Duration::from_secs(3600),
            ),
            ConcurrencyGate::new(concurrency),
            mode,
            caller,
        )
    }

    #[test]
    fn retry_after_is_the_ceiling_of_the_estimate() {
        assert_eq!(retry_after_from(1.2), 2);
        assert_eq!(retry_after_from(0.5), 1);
        assert_eq!(retry_after_from(2.0), 2);
        assert_eq!(retry_after_from(0.0), 0);
        assert_eq!(retry_after_from(-1.0), 0);
    }

    #[tokio::test]
    async fn invokes_the_caller_under_limits() {
        let caller = Arc::new(FakeCaller::new());
        let gw = gateway(10, 60_000, 0, AdmissionMode::FailFast, Arc::clone(&caller));
        let resp = gw.invoke("k", "gpt-4o", "hello", Some(42), true).await.unwrap();
        assert!(resp.is_complete());
        assert_eq!(caller.call_count(), 1);
    }

    #[tokio::test]
    async fn fail_fast_rejects_n_plus_one_without_reaching_the_caller() {
        let caller = Arc::new(FakeCaller::new());
        let gw = gateway(3, 60_000, 0, AdmissionMode::FailFast, Arc::clone(&caller));

        for _ in 0..3 {
            gw.invoke("k", "m", "p", None, false).await.unwrap();
        }
        let err = gw.invoke("k", "m", "p", None, false).await.unwrap_err();
        match err {
            GatewayError::RateLimitExceeded { retry_after, detail } => {
                let secs = retry_after.expect("reset estimate expected");
                assert!(secs >= 1 && secs <= 60);
                assert!(detail.contains("3/minute"));
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
        // The rejected call never reached the model caller
        assert_eq!(caller.call_count(), 3);
    }

    #[tokio::test]
    async fn rejection_is_per_credential() {
        let caller = Arc::new(FakeCaller::new());
        let gw = gateway(1, 60_000, 0, AdmissionMode::FailFast, Arc::clone(&caller));

        gw.invoke("key-a", "m", "p", None, false).await.unwrap();
        assert!(gw.invoke("key-a", "m", "p", None, false).await.is_err());
        // key-b has its own window
        gw.invoke("key-b", "m", "p", None, false).await.unwrap();
    }

    #[tokio::test]
    async fn block_mode_delays_but_never_raises() {
        let caller = Arc::new(FakeCaller::new());
        let gw = gateway(2, 200, 0, AdmissionMode::Block, Arc::clone(&caller));

        let started = std::time::Instant::now();
        for _ in 0..3 {
            gw.invoke("k", "m", "p", None, false).await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(caller.call_count(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_slots_are_restored_after_caller_errors() {
        let caller = Arc::new(FakeCaller::failing());
        let gw = Arc::new(gateway(
            100,
            60_000,
            4,
            AdmissionMode::FailFast,
            Arc::clone(&caller),
        ));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let gw = Arc::clone(&gw);
            handles.push(tokio::spawn(async move {
                gw.invoke("k", "m", "p", None, false).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        // Every permit came back despite every call erroring
        assert_eq!(gw.gate().available_slots("k").await, Some(4));
    }

    #[tokio::test]
    async fn fail_fast_rejection_releases_the_gate_slot() {
        let caller = Arc::new(FakeCaller::new());
        let gw = gateway(1, 60_000, 2, AdmissionMode::FailFast, Arc::clone(&caller));

        gw.invoke("k", "m", "p", None, false).await.unwrap();
        assert!(gw.invoke("k", "m", "p", None, false).await.is_err());
        assert_eq!(gw.gate().available_slots("k").await, Some(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrency_cap_batches_simultaneous_callers() {
        let caller = Arc::new(FakeCaller::slow(Duration::from_millis(150)));
        let gw = Arc::new(gateway(
            1000,
            60_000,
            5,
            AdmissionMode::Block,
            Arc::clone(&caller),
        ));

        let started = std::time::Instant::now();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let gw = Arc::clone(&gw);
            handles.push(tokio::spawn(async move {
                gw.invoke("same-key", "m", "p", None, true).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // ceil(20/5) batches of 150ms
        assert!(started.elapsed() >= Duration::from_millis(570));
        assert_eq!(caller.call_count(), 20);
    }
}
