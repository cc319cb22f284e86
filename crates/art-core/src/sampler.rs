//! Deadline-bounded polling
//!
//! [`TimeoutingSampler`] calls a function, yields its result, sleeps, and
//! calls again until the caller stops iterating or the deadline passes. The
//! deadline is only checked between calls, so the last call may overrun it.

use crate::error::ApiError;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Restartable poll loop over a function
pub struct TimeoutingSampler<F> {
    timeout: Duration,
    sleep: Duration,
    func: F,
    message: Option<String>,
}

impl<T, F> TimeoutingSampler<F>
where
    F: FnMut() -> T,
{
    pub fn new(timeout: Duration, sleep: Duration, func: F) -> Self {
        Self {
            timeout,
            sleep,
            func,
            message: None,
        }
    }

    /// Message carried by the timeout error
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Start a fresh sequence. The clock starts on the first `next()`.
    pub fn iter(&mut self) -> Samples<'_, F> {
        Samples {
            sampler: self,
            started: None,
            done: false,
        }
    }
}

impl<'a, T, F> IntoIterator for &'a mut TimeoutingSampler<F>
where
    F: FnMut() -> T,
{
    type Item = Result<T, ApiError>;
    type IntoIter = Samples<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`TimeoutingSampler`]
pub struct Samples<'a, F> {
    sampler: &'a mut TimeoutingSampler<F>,
    started: Option<Instant>,
    done: bool,
}

impl<T, F> Iterator for Samples<'_, F>
where
    F: FnMut() -> T,
{
    type Item = Result<T, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let started = match self.started {
            None => {
                self.started = Some(Instant::now());
                return Some(Ok((self.sampler.func)()));
            }
            Some(started) => started,
        };

        let elapsed = started.elapsed();
        if elapsed > self.sampler.timeout {
            self.done = true;
            let message = self.sampler.message.clone().unwrap_or_else(|| {
                format!("sampler gave up after {:?}", self.sampler.timeout)
            });
            debug!(?elapsed, %message, "Sampler deadline exceeded");
            return Some(Err(ApiError::timeout(message, elapsed)));
        }

        trace!(sleep = ?self.sampler.sleep, "Sampler sleeping");
        thread::sleep(self.sampler.sleep);
        Some(Ok((self.sampler.func)()))
    }
}

/// Poll `func` until it returns `expected`; `false` on timeout
pub fn wait_for_func_status<F>(timeout: Duration, sleep: Duration, expected: bool, func: F) -> bool
where
    F: FnMut() -> bool,
{
    let mut sampler = TimeoutingSampler::new(timeout, sleep, func);
    for sample in &mut sampler {
        match sample {
            Ok(status) if status == expected => return true,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, expected, "Function never reached the expected status");
                return false;
            }
        }
    }
    false
}
