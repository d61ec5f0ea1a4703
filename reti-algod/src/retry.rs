// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{future::Future, time::Duration};

use rand::Rng as _;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::AlgodError;

/// Delay schedule between retry attempts.
#[derive(Clone, Copy, Debug)]
pub enum Backoff {
    /// The same delay after every failure.
    Fixed(Duration),
    /// A fresh uniform sample from `[min, max]` after every failure.
    Jittered { min: Duration, max: Duration },
    /// Doubling delays starting at `base`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Jittered { min, max } => {
                let spread = max.saturating_sub(*min);
                *min + spread.mul_f64(rand::thread_rng().gen::<f64>())
            }
            Backoff::Exponential { base, max } => {
                let exp = base.saturating_mul(1u32 << attempt.min(16));
                exp.min(*max)
            }
        }
    }
}

/// A bounded retry policy: how often to try, how long to wait between
/// attempts, and which errors are worth another attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Runs `operation` until it succeeds, the error is classified
    /// permanent, the attempt budget is exhausted, or `token` fires.
    /// `max_attempts == 0` means unbounded.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        token: &CancellationToken,
        classify: C,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: std::fmt::Display + From<AlgodError>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    let out_of_attempts =
                        self.max_attempts != 0 && attempt >= self.max_attempts;
                    if out_of_attempts || !classify(&error) {
                        return Err(error);
                    }
                    let delay = self.backoff.delay(attempt - 1);
                    warn!(%error, attempt, ?delay, "operation failed, retrying");
                    tokio::select! {
                        _ = token.cancelled() => return Err(AlgodError::Cancelled.into()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    #[test_log::test(tokio::test(start_paused = true))]
    async fn stops_after_attempt_budget() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<(), AlgodError> = policy
            .run(&token, |_| true, || {
                calls.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(AlgodError::Api {
                        status: 503,
                        message: "busy".into(),
                    })
                }
            })
            .await;
        assert_matches!(result, Err(AlgodError::Api { status: 503, .. }));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn permanent_errors_short_circuit() {
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(10)));
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<(), AlgodError> = policy
            .run(
                &token,
                |error: &AlgodError| error.is_transient(),
                || {
                    calls.fetch_add(1, Ordering::Relaxed);
                    async {
                        Err(AlgodError::Api {
                            status: 400,
                            message: "bad request".into(),
                        })
                    }
                },
            )
            .await;
        assert_matches!(result, Err(AlgodError::Api { status: 400, .. }));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn succeeds_mid_schedule() {
        let policy = RetryPolicy::new(10, Backoff::Fixed(Duration::from_millis(5)));
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<u32, AlgodError> = policy
            .run(&token, |_| true, || {
                let n = calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n < 2 {
                        Err(AlgodError::Api {
                            status: 500,
                            message: "hiccup".into(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn cancellation_interrupts_the_delay() {
        let policy = RetryPolicy::new(0, Backoff::Fixed(Duration::from_secs(3600)));
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), AlgodError> = policy
            .run(&token, |_| true, || async {
                Err(AlgodError::Api {
                    status: 500,
                    message: "down".into(),
                })
            })
            .await;
        assert_matches!(result, Err(AlgodError::Cancelled));
    }
}
