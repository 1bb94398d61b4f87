//! Refresh-before-use with singleflight guards, CAS rotation, and metrics.
//!
//! [`Dance::refresh_access_token`] returns fresh records straight from the store. Records that
//! expire within the refresh margin (or forced refreshes) take the per-identity guard, are
//! re-read, and only then hit the refresh endpoint. Rotated refresh tokens are written with
//! [`TokenStore::compare_and_swap_refresh`] so a concurrent writer never loses its token.
//! Permanent failures revoke the record unless a newer login replaced it meanwhile; exhausted
//! transient failures leave it in place.

mod metrics;

pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};

// self
use crate::{
	_prelude::*,
	auth::{IdentityId, TokenRecord},
	error::{ConfigError, TokenEndpointError},
	flows::{Dance, common},
	http::TokenHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
	session::AuthenticatedSession,
	store::{CompareAndSwapOutcome, StoreKey},
};

/// Parameters for [`Dance::refresh_access_token`].
#[derive(Clone, Debug)]
pub struct RefreshRequest {
	/// Identity whose record is refreshed.
	pub identity: IdentityId,
	/// Refresh even when the record is still fresh.
	pub force: bool,
}
impl RefreshRequest {
	/// Creates a request that refreshes only when needed.
	pub fn new(identity: IdentityId) -> Self {
		Self { identity, force: false }
	}

	/// Forces a refresh regardless of expiry.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Overrides the force flag.
	pub fn with_force(mut self, force: bool) -> Self {
		self.force = force;

		self
	}

	/// Determines whether `record` must be refreshed before use.
	///
	/// Records without an expiry are used as-is unless the refresh is forced.
	pub fn should_refresh(
		&self,
		record: &TokenRecord,
		now: OffsetDateTime,
		margin: Duration,
	) -> bool {
		self.force || record.expires_within(now, margin)
	}
}

impl<C, M> Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a record that is safe to use, refreshing it first when required.
	///
	/// Fails with [`Error::NotAuthenticated`] when the identity has no record or its record
	/// was revoked, and with [`Error::RefreshFailed`] when the refresh grant fails. Only
	/// refreshes that are actually due count towards [`RefreshMetrics`].
	pub async fn refresh_access_token(&self, request: RefreshRequest) -> Result<TokenRecord> {
		let span = FlowSpan::new(FlowKind::Refresh, "refresh_access_token");

		span.instrument(self.refresh_if_due(request)).await
	}

	/// Resolves an authenticated session for `identity`, refreshing expired tokens first.
	pub async fn get_session(&self, identity: &IdentityId) -> Result<AuthenticatedSession> {
		const KIND: FlowKind = FlowKind::Session;

		let span = FlowSpan::new(KIND, "get_session");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = RefreshRequest::new(identity.clone());
				let record = self.refresh_access_token(request).await?;

				Ok(AuthenticatedSession::new(
					self.config.id().clone(),
					identity.clone(),
					self.config.descriptor.endpoints.api_base.clone(),
					&record,
				))
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Returns `true` when `identity` holds a record that is usable or refreshable.
	pub async fn is_authorized(&self, identity: &IdentityId) -> Result<bool> {
		let now = OffsetDateTime::now_utc();
		let record = self.store.get(&self.store_key(identity)).await?;

		Ok(record.is_some_and(|record| {
			!record.is_revoked() && (!record.is_expired_at(now) || record.refresh_token.is_some())
		}))
	}

	/// Forgets `identity`: deletes its record and any in-flight authorization state.
	pub async fn logout(&self, identity: &IdentityId) -> Result<Option<TokenRecord>> {
		self.pending.lock().remove(identity);

		let removed = self.store.delete(&self.store_key(identity)).await?;

		obs::flow_event(FlowKind::Session, "logged_out");

		Ok(removed)
	}

	async fn refresh_if_due(&self, request: RefreshRequest) -> Result<TokenRecord> {
		let key = self.store_key(&request.identity);
		let current = self.usable_record(&key).await?;

		if !request.should_refresh(&current, OffsetDateTime::now_utc(), self.options.refresh_margin)
		{
			return Ok(current);
		}

		let guard = common::flow_guard(self, &key);
		let result = {
			let _singleflight = guard.lock().await;

			self.refresh_locked(&request, &key).await
		};

		common::release_flow_guard(self, &key, guard);

		result
	}

	async fn refresh_locked(
		&self,
		request: &RefreshRequest,
		key: &StoreKey,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		let now = OffsetDateTime::now_utc();
		let current = self.usable_record(key).await?;

		// A caller that held the guard before this one may already have refreshed.
		if !request.should_refresh(&current, now, self.options.refresh_margin) {
			return Ok(current);
		}

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = self.rotate(key, current, now).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		obs::record_result(KIND, &result);

		result
	}

	async fn rotate(
		&self,
		key: &StoreKey,
		current: TokenRecord,
		now: OffsetDateTime,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		self.ensure_refresh_supported()?;

		let Some(expected_refresh) =
			current.refresh_token.as_ref().map(|secret| secret.expose().to_owned())
		else {
			let cause = TokenEndpointError::MissingRefreshToken;

			return Err(self.revoke_after(key, None, now, cause).await);
		};
		let credentials = self.config.credentials(self.credential_source.as_ref())?;
		let facade = <BasicFacade<C, M>>::from_config(
			&self.config.descriptor,
			GrantType::RefreshToken,
			&credentials,
			None,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?;
		let refreshed = common::with_retry(&self.options.retry, KIND, || {
			facade.refresh_token(self.strategy.as_ref(), &expected_refresh, current.scope.as_ref())
		})
		.await;
		let mut updated = match refreshed {
			Ok(record) => record,
			Err(err) if err.is_retryable() => {
				obs::flow_warning(KIND, "refresh_unavailable", &err);

				return Err(Error::RefreshFailed(err));
			},
			Err(err) => {
				let failed = Some(expected_refresh.as_str());

				return Err(self.revoke_after(key, failed, now, err).await);
			},
		};

		if updated.refresh_token.is_none() {
			updated.refresh_token = current.refresh_token.clone();
		}

		let outcome = self
			.store
			.compare_and_swap_refresh(key, Some(expected_refresh.as_str()), updated.clone())
			.await?;

		match outcome {
			CompareAndSwapOutcome::Updated => {
				obs::flow_event(KIND, "token_rotated");

				Ok(updated)
			},
			CompareAndSwapOutcome::Missing => Err(Error::NotAuthenticated),
			CompareAndSwapOutcome::RefreshMismatch => self.usable_record(key).await,
		}
	}

	async fn usable_record(&self, key: &StoreKey) -> Result<TokenRecord> {
		self.store
			.get(key)
			.await?
			.filter(|record| !record.is_revoked())
			.ok_or(Error::NotAuthenticated)
	}

	// Revokes only the record whose refresh secret failed; a record written by a login that
	// finished meanwhile stays usable.
	async fn revoke_after(
		&self,
		key: &StoreKey,
		failed_refresh: Option<&str>,
		instant: OffsetDateTime,
		cause: TokenEndpointError,
	) -> Error {
		match self.store.revoke(key, failed_refresh, instant).await {
			Ok(Some(_)) => obs::flow_warning(FlowKind::Refresh, "token_revoked", &cause),
			Ok(None) => obs::flow_warning(FlowKind::Refresh, "token_replaced", &cause),
			Err(err) => return err.into(),
		}

		Error::RefreshFailed(cause)
	}

	fn ensure_refresh_supported(&self) -> Result<()> {
		if self.config.descriptor.supports(GrantType::RefreshToken) {
			Ok(())
		} else {
			Err(ConfigError::UnsupportedGrant {
				descriptor: self.config.id().to_string(),
				grant: "refresh_token",
			}
			.into())
		}
	}
}
