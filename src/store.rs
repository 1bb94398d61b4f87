//! Storage contracts for token records and the built-in in-memory backend.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{IdentityId, ProviderId, TokenRecord},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for token records keyed by provider and identity.
///
/// Backends must make [`compare_and_swap_refresh`](Self::compare_and_swap_refresh) atomic with
/// respect to every other write on the same key; the refresh flow relies on it to avoid losing
/// rotated refresh tokens.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the record stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Persists or replaces the record stored under `key`.
	fn put(&self, key: StoreKey, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Removes the record stored under `key`, returning it when one existed.
	fn delete<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Replaces the record only if its refresh secret still equals `expected_refresh`.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a StoreKey,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Marks the record as revoked at `instant` if its refresh secret still equals
	/// `expected_refresh`, returning the revoked record.
	///
	/// A record replaced since the failing refresh was read (a newer login, say) is left alone
	/// and `None` is returned.
	fn revoke<'a>(
		&'a self,
		key: &'a StoreKey,
		expected_refresh: Option<&'a str>,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the record was updated.
	Updated,
	/// The record exists but the expected refresh secret did not match.
	RefreshMismatch,
	/// No record exists for the key.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Key identifying the token record of one identity at one provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
	/// Provider that issued the tokens.
	pub provider: ProviderId,
	/// Host-defined user or session the tokens belong to.
	pub identity: IdentityId,
}
impl StoreKey {
	/// Builds a key for the provided provider and identity.
	pub fn new(provider: &ProviderId, identity: &IdentityId) -> Self {
		Self { provider: provider.clone(), identity: identity.clone() }
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.provider, self.identity)
	}
}
