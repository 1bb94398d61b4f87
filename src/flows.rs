//! The authorization-code dance and refresh-before-use, driven by [`Dance`].

pub mod authorize;
pub mod callback;
pub mod common;
pub mod refresh;
pub mod state;

pub use authorize::*;
pub use callback::*;
pub use common::*;
pub use refresh::*;
pub use state::*;

// self
use crate::{
	_prelude::*,
	auth::IdentityId,
	config::{CredentialSource, EnvCredentialSource, ProviderConfig},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	provider::ProviderStrategy,
	store::{StoreKey, TokenStore},
};
#[cfg(feature = "reqwest")]
use crate::{
	http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper, provider::DefaultProviderStrategy,
};

#[cfg(feature = "reqwest")]
/// Dance specialized for the crate's default reqwest transport stack.
pub type ReqwestDance = Dance<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Runs the OAuth 2.0 authorization-code dance for one provider.
///
/// A dance owns the transport, the token store, the provider config, and the in-flight
/// authorization states of every identity. Identities are opaque to the dance; hosts map
/// their own users or browser sessions onto [`IdentityId`]s and pass them explicitly.
#[derive(Clone)]
pub struct Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Token store holding one record per identity.
	pub store: Arc<dyn TokenStore>,
	/// Provider endpoints, credentials, scopes, and routes.
	pub config: ProviderConfig,
	/// Strategy responsible for provider-specific token request adjustments.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Where credentials named by configuration key are resolved.
	pub credential_source: Arc<dyn CredentialSource>,
	/// Timing and retry knobs.
	pub options: DanceOptions,
	/// Optional hook notified about authorizations and provider errors.
	pub listener: Option<Arc<dyn DanceListener>>,
	/// Shared metrics recorder for refresh flow outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	flow_guards: Arc<Mutex<HashMap<StoreKey, Arc<AsyncMutex<()>>>>>,
	pending: Arc<Mutex<HashMap<IdentityId, PendingAuthorization>>>,
}
impl<C, M> Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a dance that reuses the caller-provided transport + mapper pair.
	///
	/// Credentials named by key are read from the process environment until
	/// [`with_credential_source`](Self::with_credential_source) says otherwise.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		config: ProviderConfig,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			config,
			strategy,
			credential_source: Arc::new(EnvCredentialSource),
			options: DanceOptions::default(),
			listener: None,
			refresh_metrics: Default::default(),
			flow_guards: Default::default(),
			pending: Default::default(),
		}
	}

	/// Replaces the credential source.
	pub fn with_credential_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
		self.credential_source = source;

		self
	}

	/// Replaces the timing and retry knobs.
	pub fn with_options(mut self, options: DanceOptions) -> Self {
		self.options = options;

		self
	}

	/// Installs an authorization listener.
	pub fn with_listener(mut self, listener: Arc<dyn DanceListener>) -> Self {
		self.listener = Some(listener);

		self
	}

	/// Store key of `identity` at this provider.
	pub fn store_key(&self, identity: &IdentityId) -> StoreKey {
		StoreKey::new(self.config.id(), identity)
	}
}
#[cfg(feature = "reqwest")]
impl Dance<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a dance with its own reqwest transport and the default strategy.
	pub fn new(store: Arc<dyn TokenStore>, config: ProviderConfig) -> Result<Self> {
		Self::with_reqwest(store, config, DanceOptions::default())
	}

	/// Like [`new`](Self::new), with the transport timeout taken from `options`.
	pub fn with_reqwest(
		store: Arc<dyn TokenStore>,
		config: ProviderConfig,
		options: DanceOptions,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(options.request_timeout.unsigned_abs())?;
		let dance = Self::with_http_client(
			store,
			config,
			Arc::new(DefaultProviderStrategy),
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		);

		Ok(dance.with_options(options))
	}
}
impl<C, M> Debug for Dance<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dance")
			.field("config", &self.config)
			.field("options", &self.options)
			.field("listener_set", &self.listener.is_some())
			.field("pending", &self.pending.lock().len())
			.finish()
	}
}
