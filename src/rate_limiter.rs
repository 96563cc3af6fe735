use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Admission policy applied by the gateway, process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    /// Wait until a window slot frees up; never rejects.
    Block,
    /// Reject immediately with a reset estimate when the window is full.
    FailFast,
}

impl AdmissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionMode::Block => "block",
            AdmissionMode::FailFast => "fail_fast",
        }
    }
}

/// Returned by `try_acquire` when the credential's window is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRejection {
    /// Configured window capacity (requests per window).
    pub limit: u32,
    /// Fractional seconds until the oldest counted request ages out.
    pub reset_in: f64,
}

/// Sliding-log window: admission timestamps within the trailing interval.
#[derive(Debug, Default)]
struct Window {
    stamps: VecDeque<Instant>,
}

impl Window {
    /// Drop stamps that have aged out of the window.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.stamps.front() {
            if now.duration_since(*oldest) >= window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Seconds until the oldest stamp leaves the window. Zero when empty.
    fn reset_in(&self, now: Instant, window: Duration) -> f64 {
        match self.stamps.front() {
            Some(oldest) => {
                let age = now.duration_since(*oldest);
                window.saturating_sub(age).as_secs_f64()
            }
            None => 0.0,
        }
    }
}

/// Per-credential requests-per-window limiter over a sliding log.
///
/// Each admitted request counts against the credential's window until it ages
/// out, independent of whether the downstream call later succeeds. The
/// prune/check/push step runs under a per-credential mutex, so concurrent
/// callers for the same credential serialize the admit decision and the
/// ceiling is exact. Different credentials never share a window.
///
/// Buckets are created lazily on first use and retained for the process
/// lifetime; credential cardinality is small relative to traffic.
#[derive(Debug)]
pub struct RpmLimiter {
    capacity: u32,
    window: Duration,
    /// Advisory budget for blocking waits. Exceeding it logs a warning
    /// once per wait; it never aborts the wait.
    max_delay: Duration,
    buckets: RwLock<HashMap<String, Arc<Mutex<Window>>>>,
}

impl RpmLimiter {
    /// Capacity is floored at one: a zero ceiling could never admit, and a
    /// blocking `acquire` against it would spin on an empty window.
    pub fn new(capacity: u32, window: Duration, max_delay: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            max_delay,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Limiter with the standard 60-second window.
    pub fn per_minute(capacity: u32, max_delay: Duration) -> Self {
        Self::new(capacity, Duration::from_secs(60), max_delay)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of credentials with a materialized bucket.
    pub async fn tracked_credentials(&self) -> usize {
        self.buckets.read().await.len()
    }

    async fn bucket_for(&self, credential: &str) -> Arc<Mutex<Window>> {
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(credential) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().await;
        // Double-check after acquiring the write lock
        if let Some(bucket) = buckets.get(credential) {
            return Arc::clone(bucket);
        }
        let bucket = Arc::new(Mutex::new(Window::default()));
        buckets.insert(credential.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Admit immediately or reject with a reset estimate. A rejection never
    /// consumes a window slot.
    pub async fn try_acquire(&self, credential: &str) -> Result<(), RateLimitRejection> {
        let bucket = self.bucket_for(credential).await;
        let mut window = bucket.lock().await;
        let now = Instant::now();
        window.prune(now, self.window);

        if (window.stamps.len() as u32) < self.capacity {
            window.stamps.push_back(now);
            Ok(())
        } else {
            let reset_in = window.reset_in(now, self.window);
            debug!(
                credential_buckets = window.stamps.len(),
                reset_in, "window exhausted, rejecting"
            );
            Err(RateLimitRejection {
                limit: self.capacity,
                reset_in,
            })
        }
    }

    /// Admit, waiting as long as it takes for a window slot to free up.
    /// Never rejects; the max-delay budget is advisory only.
    pub async fn acquire(&self, credential: &str) {
        let bucket = self.bucket_for(credential).await;
        let started = Instant::now();
        let mut budget_warned = false;

        loop {
            let wait = {
                let mut window = bucket.lock().await;
                let now = Instant::now();
                window.prune(now, self.window);

                if (window.stamps.len() as u32) < self.capacity {
                    window.stamps.push_back(now);
                    let waited = started.elapsed();
                    if waited > Duration::from_millis(5) {
                        debug!(waited_ms = waited.as_millis() as u64, "admitted after wait");
                    }
                    return;
                }
                Duration::from_secs_f64(window.reset_in(now, self.window))
            };

            if !budget_warned && started.elapsed() > self.max_delay {
                warn!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    budget_ms = self.max_delay.as_millis() as u64,
                    "blocking wait exceeded the advisory delay budget"
                );
                budget_warned = true;
            }

            // Sleep until the oldest stamp should age out, with a floor so a
            // sub-millisecond estimate cannot spin.
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
