//! First leg of the dance: issuing `state` and the provider redirect.

mod session;

pub use session::AuthorizationSession;
pub(crate) use session::PendingAuthorization;

// self
use crate::{
	_prelude::*,
	auth::IdentityId,
	flows::Dance,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a login for `identity` on a host served at `origin`.
	///
	/// Client credentials are resolved first, so a misconfigured provider fails with
	/// [`Error::MissingCredentials`] before any state is issued. A new call replaces the
	/// identity's previous in-flight state.
	pub fn begin_authorization(
		&self,
		identity: &IdentityId,
		origin: &Url,
	) -> Result<AuthorizationSession> {
		const KIND: FlowKind = FlowKind::Authorize;

		let _span = FlowSpan::new(KIND, "begin_authorization").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self.issue_authorization(identity, origin);

		obs::record_result(KIND, &result);

		result
	}

	fn issue_authorization(
		&self,
		identity: &IdentityId,
		origin: &Url,
	) -> Result<AuthorizationSession> {
		let credentials = self.config.credentials(self.credential_source.as_ref())?;
		let redirect_uri = self.config.redirect_uri(origin)?;
		let scope = self.config.scope.clone();
		let created_at = OffsetDateTime::now_utc();
		let ttl = self.options.state_ttl;
		let mut pending = self.pending.lock();

		pending.retain(|_, other| !other.is_expired_at(created_at, ttl));

		let state = loop {
			let candidate = session::generate_state();
			let digest = session::state_digest(&candidate);

			if pending.values().all(|other| other.state_digest != digest) {
				break candidate;
			}
		};

		pending.insert(
			identity.clone(),
			PendingAuthorization {
				state_digest: session::state_digest(&state),
				created_at,
				scope: scope.clone(),
				redirect_uri: redirect_uri.clone(),
			},
		);

		drop(pending);

		let authorize_url = session::build_authorize_url(
			&self.config.descriptor,
			&credentials.client_id,
			&redirect_uri,
			&scope,
			&state,
		);

		obs::flow_event(FlowKind::Authorize, "state_issued");

		Ok(AuthorizationSession {
			identity: identity.clone(),
			scope,
			state,
			redirect_uri,
			authorize_url,
			created_at,
			expires_at: created_at + self.options.state_ttl,
		})
	}
}
