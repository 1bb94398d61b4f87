//! Second leg of the dance: validating the provider callback and exchanging the code.

// self
use crate::{
	_prelude::*,
	auth::{IdentityId, ProviderId, TokenRecord},
	config::PostLoginRedirect,
	error::TokenEndpointError,
	flows::{Dance, common},
	http::TokenHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

/// Query parameters the provider appends to the callback route.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// State issued by [`Dance::begin_authorization`].
	pub state: Option<String>,
	/// OAuth error code when the user or provider denied the request.
	pub error: Option<String>,
	/// Human-readable companion of `error`.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Extracts the parameters from a full callback URL; unknown keys are ignored.
	pub fn from_url(url: &Url) -> Self {
		let mut params = Self::default();

		for (key, value) in url.query_pairs() {
			let slot = match key.as_ref() {
				"code" => &mut params.code,
				"state" => &mut params.state,
				"error" => &mut params.error,
				"error_description" => &mut params.error_description,
				_ => continue,
			};

			if slot.is_none() {
				*slot = Some(value.into_owned());
			}
		}

		params
	}
}

/// Result of a successful callback.
#[derive(Clone, Debug)]
pub struct CallbackOutcome {
	/// Tokens returned by the provider.
	pub record: TokenRecord,
	/// Where the host should send the user next.
	pub redirect: PostLoginRedirect,
	/// `false` when a listener vetoed persisting the record.
	pub stored: bool,
}

/// Decision returned by [`DanceListener::on_authorized`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthorizedAction {
	/// Persist the record in the token store.
	#[default]
	Store,
	/// The listener took care of the record; leave the store untouched.
	Skip,
}

/// Hooks notified about the outcome of callbacks.
pub trait DanceListener
where
	Self: Send + Sync,
{
	/// Called after a successful code exchange, before the record is stored.
	fn on_authorized(
		&self,
		_provider: &ProviderId,
		_identity: &IdentityId,
		_record: &TokenRecord,
	) -> AuthorizedAction {
		AuthorizedAction::Store
	}

	/// Called when the provider redirected back with an `error`.
	fn on_error(
		&self,
		_provider: &ProviderId,
		_identity: &IdentityId,
		_error: &str,
		_description: Option<&str>,
	) {
	}
}

impl<C, M> Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Completes the login of `identity` from the callback parameters.
	///
	/// The pending state is consumed before anything else, so a state is accepted at most
	/// once and a failed callback requires a new [`begin_authorization`](Self::begin_authorization).
	/// Nothing is written to the store unless the exchange succeeds.
	pub async fn handle_callback(
		&self,
		identity: &IdentityId,
		params: CallbackParams,
	) -> Result<CallbackOutcome> {
		const KIND: FlowKind = FlowKind::Callback;

		let span = FlowSpan::new(KIND, "handle_callback");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_authorization(identity, params)).await;

		obs::record_result(KIND, &result);

		result
	}

	async fn complete_authorization(
		&self,
		identity: &IdentityId,
		params: CallbackParams,
	) -> Result<CallbackOutcome> {
		const KIND: FlowKind = FlowKind::Callback;

		let pending = self.pending.lock().remove(identity).ok_or_else(|| {
			obs::flow_warning(KIND, "state_rejected", &"no pending authorization");

			Error::StateMismatch
		})?;

		if pending.is_expired_at(OffsetDateTime::now_utc(), self.options.state_ttl) {
			obs::flow_warning(KIND, "state_rejected", &"state expired");

			return Err(Error::StateMismatch);
		}
		if !params.state.as_deref().is_some_and(|state| pending.matches(state)) {
			obs::flow_warning(KIND, "state_rejected", &"state mismatch");

			return Err(Error::StateMismatch);
		}
		if let Some(error) = params.error {
			if let Some(listener) = &self.listener {
				listener.on_error(
					self.config.id(),
					identity,
					&error,
					params.error_description.as_deref(),
				);
			}

			return Err(Error::AuthorizationDenied { error, description: params.error_description });
		}

		let code = params
			.code
			.filter(|code| !code.is_empty())
			.ok_or(Error::TokenExchange(TokenEndpointError::MissingCode))?;
		let credentials = self.config.credentials(self.credential_source.as_ref())?;
		let facade = <BasicFacade<C, M>>::from_config(
			&self.config.descriptor,
			GrantType::AuthorizationCode,
			&credentials,
			Some(&pending.redirect_uri),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?;
		let record = common::with_retry(&self.options.retry, KIND, || {
			facade.exchange_authorization_code(self.strategy.as_ref(), &code, &pending.scope)
		})
		.await
		.map_err(|err| {
			obs::flow_warning(KIND, "exchange_failed", &err);

			Error::TokenExchange(err)
		})?;
		let action = match &self.listener {
			Some(listener) => listener.on_authorized(self.config.id(), identity, &record),
			None => AuthorizedAction::Store,
		};
		let stored = matches!(action, AuthorizedAction::Store);

		if stored {
			self.store.put(self.store_key(identity), record.clone()).await?;
		}

		obs::flow_event(KIND, if stored { "token_stored" } else { "token_skipped" });

		Ok(CallbackOutcome { record, redirect: self.config.post_login.clone(), stored })
	}
}
