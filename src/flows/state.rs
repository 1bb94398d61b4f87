//! Where an identity stands in the dance.

// self
use crate::{
	_prelude::*,
	auth::IdentityId,
	flows::{Dance, common},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
};

/// Lifecycle of one identity at one provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanceState {
	/// No record and no login in flight.
	Unauthenticated,
	/// A `state` was issued and the callback has not arrived yet.
	AwaitingCallback,
	/// A usable (or refreshable) record is stored.
	Authenticated,
	/// A refresh is running for the identity.
	Refreshing,
	/// The record was revoked after a failed refresh; a new login is required.
	Revoked,
}

impl<C, M> Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Reports the current state of `identity`.
	///
	/// A running refresh wins, then a stored record, then an unexpired pending login.
	pub async fn state(&self, identity: &IdentityId) -> Result<DanceState> {
		let key = self.store_key(identity);

		if common::guard_held(self, &key) {
			return Ok(DanceState::Refreshing);
		}

		let record = self.store.get(&key).await?;

		if record.as_ref().is_some_and(|record| !record.is_revoked()) {
			return Ok(DanceState::Authenticated);
		}

		let now = OffsetDateTime::now_utc();
		let awaiting = self
			.pending
			.lock()
			.get(identity)
			.is_some_and(|pending| !pending.is_expired_at(now, self.options.state_ttl));

		Ok(match (awaiting, record) {
			(true, _) => DanceState::AwaitingCallback,
			(false, Some(_)) => DanceState::Revoked,
			(false, None) => DanceState::Unauthenticated,
		})
	}
}
