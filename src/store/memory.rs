//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	store::{CompareAndSwapOutcome, StoreError, StoreFuture, StoreKey, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<StoreKey, TokenRecord>>>;

/// Storage backend that keeps records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of records currently held, revoked ones included.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no records are held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn cas_now(
		map: &StoreMap,
		key: &StoreKey,
		expected_refresh: Option<&str>,
		replacement: TokenRecord,
	) -> CompareAndSwapOutcome {
		let mut guard = map.write();
		let outcome = match guard.get(key) {
			Some(existing)
				if Self::refresh_matches(existing.refresh_token.as_ref(), expected_refresh) =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::RefreshMismatch,
			None => CompareAndSwapOutcome::Missing,
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			guard.insert(key.to_owned(), replacement);
		}

		outcome
	}

	fn refresh_matches(current: Option<&TokenSecret>, expected: Option<&str>) -> bool {
		match (current.map(TokenSecret::expose), expected) {
			(None, None) => true,
			(Some(cur), Some(exp)) => cur == exp,
			_ => false,
		}
	}

	fn revoke_now(
		map: &StoreMap,
		key: &StoreKey,
		expected_refresh: Option<&str>,
		instant: OffsetDateTime,
	) -> Option<TokenRecord> {
		let mut guard = map.write();
		let record = guard
			.get_mut(key)
			.filter(|record| Self::refresh_matches(record.refresh_token.as_ref(), expected_refresh))?;

		record.revoke(instant);

		Some(record.clone())
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.0.read().get(key).cloned()) })
	}

	fn put(&self, key: StoreKey, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.0.write().insert(key, record);

			Ok::<_, StoreError>(())
		})
	}

	fn delete<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.0.write().remove(key)) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a StoreKey,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(Self::cas_now(&self.0, key, expected_refresh, replacement)) })
	}

	fn revoke<'a>(
		&'a self,
		key: &'a StoreKey,
		expected_refresh: Option<&'a str>,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(Self::revoke_now(&self.0, key, expected_refresh, instant)) })
	}
}
