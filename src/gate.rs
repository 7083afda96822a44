//! Concurrency and pacing gate shared by every outbound registry call.
//!
//! A [`RateGate`] admits at most `max_concurrent` operations at once and spaces successive
//! operation starts by at least `min_interval`. Waiting callers are admitted in submission order.
//! The process builds exactly one gate and hands an `Arc<RateGate>` to every client, so the
//! total outbound budget is shared no matter which bulk operation is running.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::{
	sync::{Mutex as FifoMutex, Semaphore},
	time::{self, Instant},
};
// self
use crate::{_prelude::*, config::RateLimits};

/// Admission gate enforcing a concurrency ceiling and a minimum spacing between starts.
pub struct RateGate {
	limits: RateLimits,
	permits: Semaphore,
	min_interval: StdDuration,
	// Dispatch queue: holds the earliest instant the next operation may start.
	next_start: FifoMutex<Option<Instant>>,
}
impl RateGate {
	/// Creates a gate enforcing the provided limits.
	pub fn new(limits: RateLimits) -> Self {
		Self {
			permits: Semaphore::new(limits.max_concurrent()),
			min_interval: limits.min_interval(),
			next_start: FifoMutex::new(None),
			limits,
		}
	}

	/// Returns the limits this gate was built with.
	pub fn limits(&self) -> RateLimits {
		self.limits
	}

	/// Runs `operation` once the gate admits it, returning its output unchanged.
	///
	/// The permit is held until the operation's future settles, so a failing operation
	/// releases its slot exactly like a successful one. The gate never retries.
	pub async fn schedule<F, Fut, T>(&self, operation: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let _permit = {
			let mut next_start = self.next_start.lock().await;
			// The semaphore is owned by the gate and never closed, so acquisition only waits.
			let permit = self.permits.acquire().await.ok();

			if let Some(at) = *next_start {
				if at > Instant::now() {
					tracing::trace!(wait_ms = (at - Instant::now()).as_millis() as u64, "pacing");

					time::sleep_until(at).await;
				}
			}

			*next_start = Some(Instant::now() + self.min_interval);

			permit
		};

		operation().await
	}
}
impl Debug for RateGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateGate")
			.field("limits", &self.limits)
			.field("available_permits", &self.permits.available_permits())
			.finish()
	}
}
