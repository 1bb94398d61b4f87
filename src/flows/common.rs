//! Shared knobs and helpers for flow implementations (options, retries, guards).

// self
use crate::{
	_prelude::*,
	error::TokenEndpointError,
	flows::Dance,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
	store::StoreKey,
};

/// Backoff applied to retryable token endpoint failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts including the first; `1` disables retries.
	pub max_attempts: u32,
	/// Delay before the first retry; doubles on each later one.
	pub base_delay: Duration,
	/// Upper bound for any single delay, `Retry-After` hints included.
	pub max_delay: Duration,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub const NONE: Self =
		Self { max_attempts: 1, base_delay: Duration::ZERO, max_delay: Duration::ZERO };

	/// Delay before retry number `retry` (starting at 1), preferring the provider's hint.
	pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
		let delay = hint.unwrap_or_else(|| {
			let factor = 2_i32.saturating_pow(retry.saturating_sub(1).min(30));

			self.base_delay.saturating_mul(factor)
		});

		delay.clamp(Duration::ZERO, self.max_delay.max(Duration::ZERO))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::milliseconds(200),
			max_delay: Duration::seconds(5),
		}
	}
}

/// Timing knobs for a [`Dance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanceOptions {
	/// How long an issued `state` stays redeemable.
	pub state_ttl: Duration,
	/// Records expiring within this window are refreshed before use.
	pub refresh_margin: Duration,
	/// Whole-request timeout for transports the dance builds itself.
	pub request_timeout: Duration,
	/// Retry policy for token and refresh requests.
	pub retry: RetryPolicy,
}
impl DanceOptions {
	/// Overrides the state TTL.
	pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
		self.state_ttl = ttl;

		self
	}

	/// Overrides the refresh margin; negative values are treated as zero.
	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin.max(Duration::ZERO);

		self
	}

	/// Overrides the transport timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}
}
impl Default for DanceOptions {
	fn default() -> Self {
		Self {
			state_ttl: Duration::minutes(10),
			refresh_margin: Duration::seconds(30),
			request_timeout: Duration::seconds(10),
			retry: RetryPolicy::default(),
		}
	}
}

/// Runs `call` until it succeeds, fails permanently, or the policy runs out of attempts.
pub(crate) async fn with_retry<T, F, Fut>(
	policy: &RetryPolicy,
	kind: FlowKind,
	mut call: F,
) -> Result<T, TokenEndpointError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, TokenEndpointError>>,
{
	let max_attempts = policy.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match call().await {
			Ok(value) => return Ok(value),
			Err(err) if err.is_retryable() && attempt < max_attempts => {
				let delay = policy.delay_for(attempt, err.retry_after());

				obs::flow_warning(kind, "retrying", &err);
				tokio::time::sleep(delay.unsigned_abs()).await;

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}

/// Returns (and creates on demand) the singleflight guard for a store key.
pub(crate) fn flow_guard<C, M>(dance: &Dance<C, M>, key: &StoreKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = dance.flow_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Drops the guard of `key` from the map once no other caller holds or awaits it.
pub(crate) fn release_flow_guard<C, M>(
	dance: &Dance<C, M>,
	key: &StoreKey,
	guard: Arc<AsyncMutex<()>>,
) where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = dance.flow_guards.lock();
	// One reference lives in the map, the other is `guard`.
	let idle = Arc::strong_count(&guard) == 2
		&& guards.get(key).is_some_and(|held| Arc::ptr_eq(held, &guard));

	if idle {
		guards.remove(key);
	}
}

/// Returns `true` while a refresh holds the guard of `key`.
pub(crate) fn guard_held<C, M>(dance: &Dance<C, M>, key: &StoreKey) -> bool
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let guard = dance.flow_guards.lock().get(key).cloned();

	guard.is_some_and(|guard| guard.try_lock().is_none())
}
