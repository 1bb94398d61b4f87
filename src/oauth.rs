//! Token endpoint facade over the `oauth2` crate.
//!
//! [`BasicFacade`] posts `authorization_code` and `refresh_token` grants through a
//! [`TokenHttpClient`] and turns responses into [`TokenRecord`]s. Failures are folded into
//! [`TokenEndpointError`] using the provider strategy and whatever response metadata the
//! transport captured.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord},
	config::ClientCredentials,
	error::{ConfigError, TokenEndpointError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderDescriptorError,
		ProviderErrorContext, ProviderErrorKind, ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
pub(crate) type FacadeFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TokenEndpointError>> + 'a + Send>>;

/// Form fields owned by the grants themselves; strategies cannot override them.
const RESERVED_PARAMS: [&str; 6] =
	["grant_type", "code", "redirect_uri", "refresh_token", "client_id", "client_secret"];

/// Maps HTTP transport failures into [`TokenEndpointError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> TokenEndpointError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> TokenEndpointError {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				TokenEndpointError::invalid_request(*inner),
			HttpClientError::Reqwest(inner) => TokenEndpointError::from(*inner),
			HttpClientError::Http(inner) => TokenEndpointError::invalid_request(inner),
			HttpClientError::Io(inner) => TokenEndpointError::Io(inner),
			HttpClientError::Other(message) => TokenEndpointError::Transient {
				message: format!("HTTP client error occurred: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			},
			_ => TokenEndpointError::Transient {
				message: "HTTP client error occurred.".into(),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			},
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenRecord>;

	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		refresh_token: &'a str,
		previous_scope: Option<&'a ScopeSet>,
	) -> FacadeFuture<'a, TokenRecord>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a client posting to the endpoint `grant` uses.
	pub(crate) fn from_config(
		descriptor: &ProviderDescriptor,
		grant: GrantType,
		credentials: &ClientCredentials,
		redirect_uri: Option<&Url>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(descriptor.endpoint_for(grant).to_string()).map_err(
			|source| ProviderDescriptorError::MalformedEndpoint { endpoint: "token", source },
		)?;
		let mut oauth_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
			.set_token_uri(token_url);

		if let Some(redirect) = redirect_uri {
			let redirect_url = RedirectUrl::new(redirect.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;

			oauth_client = oauth_client.set_redirect_uri(redirect_url);
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request =
				self.oauth_client.exchange_code(AuthorizationCode::new(code.to_owned()));

			for (key, value) in extra_params(strategy, GrantType::AuthorizationCode) {
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::AuthorizationCode,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;
			let fallback = (!requested_scope.is_empty()).then_some(requested_scope);

			map_token_response(response, fallback)
		})
	}

	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		refresh_token: &'a str,
		previous_scope: Option<&'a ScopeSet>,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for (key, value) in extra_params(strategy, GrantType::RefreshToken) {
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::RefreshToken,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(response, previous_scope)
		})
	}
}

fn extra_params(strategy: &dyn ProviderStrategy, grant: GrantType) -> Vec<(String, String)> {
	let mut params = BTreeMap::new();

	strategy.augment_token_request(grant, &mut params);

	params.into_iter().filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str())).collect()
}

fn map_token_response(
	response: BasicTokenResponse,
	fallback_scope: Option<&ScopeSet>,
) -> Result<TokenRecord, TokenEndpointError> {
	let mut builder = TokenRecord::builder()
		.token_type(response.token_type().as_ref())
		.access_token(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc());

	if let Some(expires_in) = response.expires_in() {
		let secs = i64::try_from(expires_in.as_secs()).map_err(|_| {
			TokenEndpointError::InvalidResponse { reason: "expires_in is out of range".into() }
		})?;

		if secs <= 0 {
			return Err(TokenEndpointError::InvalidResponse {
				reason: "expires_in must be positive".into(),
			});
		}

		builder = builder.expires_in(Duration::seconds(secs));
	}
	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	let granted = match response.scopes() {
		Some(scopes) => Some(
			ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).map_err(|e| {
				TokenEndpointError::InvalidResponse { reason: format!("scope is invalid: {e}") }
			})?,
		),
		None => fallback_scope.cloned(),
	};

	builder
		.maybe_scope(granted)
		.build()
		.map_err(|e| TokenEndpointError::InvalidResponse { reason: e.to_string() })
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> TokenEndpointError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, grant, response, meta_ref),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(strategy, grant, meta_ref, error),
		RequestTokenError::Parse(source, body) => match meta_status(meta_ref) {
			Some(status) if !(200..300).contains(&status) => classify_unstructured(
				strategy,
				grant,
				meta_ref,
				String::from_utf8_lossy(&body).into_owned(),
			),
			status => TokenEndpointError::Parse { source, status },
		},
		RequestTokenError::Other(message) => match meta_status(meta_ref) {
			Some(status) if !(200..300).contains(&status) =>
				classify_unstructured(strategy, grant, meta_ref, message),
			_ => TokenEndpointError::InvalidResponse { reason: message },
		},
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> TokenEndpointError {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_owned());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	classified(strategy.classify_token_error(&ctx), message, meta)
}

fn classify_unstructured(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<&ResponseMetadata>,
	body: String,
) -> TokenEndpointError {
	let mut ctx = ProviderErrorContext::new(grant).with_body_preview(body);

	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match meta_status(meta) {
		Some(status) => format!("HTTP {status}"),
		None => "unexpected response".into(),
	};

	classified(strategy.classify_token_error(&ctx), message, meta)
}

fn classified(
	kind: ProviderErrorKind,
	message: String,
	meta: Option<&ResponseMetadata>,
) -> TokenEndpointError {
	match kind {
		ProviderErrorKind::Transient => TokenEndpointError::Transient {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		},
		kind => TokenEndpointError::Rejected { kind, message, status: meta_status(meta) },
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
