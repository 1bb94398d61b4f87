//! Authenticated sessions handed to callers once the dance has completed.
//!
//! A session is resolved per call through [`Dance::get_session`](crate::flows::Dance::get_session),
//! which refreshes an expiring token first. It is rooted at the provider's API base URL and
//! never lets a request leave that origin with the bearer token attached.

// crates.io
use oauth2::http::{HeaderValue, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::{IdentityId, ProviderId, TokenRecord, TokenSecret},
	error::ConfigError,
};

/// Bearer-authenticated handle bound to one identity's current access token.
#[derive(Clone)]
pub struct AuthenticatedSession {
	/// Provider the token was issued by.
	pub provider: ProviderId,
	/// Identity the token belongs to.
	pub identity: IdentityId,
	/// Root every request path is resolved against.
	pub base_url: Url,
	/// Token type reported by the provider.
	pub token_type: String,
	/// Expiry of the attached token, if the provider reported one.
	pub expires_at: Option<OffsetDateTime>,
	access_token: TokenSecret,
}
impl AuthenticatedSession {
	pub(crate) fn new(
		provider: ProviderId,
		identity: IdentityId,
		base_url: Url,
		record: &TokenRecord,
	) -> Self {
		Self {
			provider,
			identity,
			base_url,
			token_type: record.token_type.clone(),
			expires_at: record.expires_at,
			access_token: record.access_token.clone(),
		}
	}

	/// Access token attached to requests. Callers must avoid logging it.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// `Authorization` header value.
	///
	/// Always uses the `Bearer` scheme; providers report `token_type` in varying case.
	pub fn authorization_header(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}

	/// Resolves `path` against the base URL.
	///
	/// Relative paths keep the base URL's path prefix. Absolute URLs are accepted only when
	/// they share the base URL's origin.
	pub fn url(&self, path: &str) -> Result<Url, ConfigError> {
		let mut base = self.base_url.clone();

		if !base.path().ends_with('/') {
			let with_slash = format!("{}/", base.path());

			base.set_path(&with_slash);
		}

		let resolved = base
			.join(path.trim_start_matches('/'))
			.map_err(|_| ConfigError::InvalidApiPath { path: path.to_owned() })?;

		if resolved.origin() != self.base_url.origin() {
			return Err(ConfigError::InvalidApiPath { path: path.to_owned() });
		}

		Ok(resolved)
	}

	/// Starts a request to `path` with the bearer token attached.
	#[cfg(feature = "reqwest")]
	pub fn request(
		&self,
		client: &ReqwestClient,
		method: reqwest::Method,
		path: &str,
	) -> Result<reqwest::RequestBuilder, ConfigError> {
		Ok(client.request(method, self.url(path)?).bearer_auth(self.access_token.expose()))
	}

	/// Shorthand for a `GET` [`request`](Self::request).
	#[cfg(feature = "reqwest")]
	pub fn get(
		&self,
		client: &ReqwestClient,
		path: &str,
	) -> Result<reqwest::RequestBuilder, ConfigError> {
		self.request(client, reqwest::Method::GET, path)
	}

	/// Shorthand for a `POST` [`request`](Self::request).
	#[cfg(feature = "reqwest")]
	pub fn post(
		&self,
		client: &ReqwestClient,
		path: &str,
	) -> Result<reqwest::RequestBuilder, ConfigError> {
		self.request(client, reqwest::Method::POST, path)
	}

	/// Attaches the session to a request of another HTTP stack.
	pub fn sign<R, S>(&self, signer: &S, request: R) -> Result<R, S::Error>
	where
		S: RequestSigner<R>,
	{
		signer.sign(self, request)
	}
}
impl Debug for AuthenticatedSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedSession")
			.field("provider", &self.provider)
			.field("identity", &self.identity)
			.field("base_url", &self.base_url)
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.field("access_token", &"<redacted>")
			.finish()
	}
}

/// Attaches an [`AuthenticatedSession`] to request values of an arbitrary HTTP client.
pub trait RequestSigner<R> {
	/// Error raised when the request cannot carry the session.
	type Error;

	/// Returns `request` with the session's credentials attached.
	fn sign(&self, session: &AuthenticatedSession, request: R) -> Result<R, Self::Error>;
}

/// Sets the `Authorization: Bearer` header on `http` crate requests.
///
/// Requests whose URI leaves the session's origin are rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
impl<B> RequestSigner<oauth2::http::Request<B>> for BearerSigner {
	type Error = ConfigError;

	fn sign(
		&self,
		session: &AuthenticatedSession,
		mut request: oauth2::http::Request<B>,
	) -> Result<oauth2::http::Request<B>, Self::Error> {
		let uri = request.uri().to_string();
		let url = Url::parse(&uri).map_err(|_| ConfigError::InvalidApiPath { path: uri.clone() })?;

		if url.origin() != session.base_url.origin() {
			return Err(ConfigError::InvalidApiPath { path: uri });
		}

		let mut value = HeaderValue::from_str(&session.authorization_header())
			.map_err(|_| ConfigError::InvalidHeader)?;

		value.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, value);

		Ok(request)
	}
}
