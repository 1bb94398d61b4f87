//! Provider configuration: endpoints, credentials, scopes, and the routes a host serves.
//!
//! [`ProviderConfig`] is immutable once built. Client credentials may be given directly or
//! named by configuration key and resolved through a [`CredentialSource`] right before each
//! authorization attempt.

pub mod credentials;
pub mod registry;
pub mod settings;

pub use credentials::*;
pub use registry::*;
pub use settings::*;

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, TokenSecret},
	error::ConfigError,
	provider::ProviderDescriptor,
};

/// Credential named in [`Error::MissingCredentials`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialField {
	/// OAuth `client_id`.
	ClientId,
	/// OAuth `client_secret`.
	ClientSecret,
}
impl CredentialField {
	/// Returns the OAuth parameter name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ClientId => "client_id",
			Self::ClientSecret => "client_secret",
		}
	}
}
impl Display for CredentialField {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Explicit credential value and/or the configuration key it falls back to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSetting<T> {
	/// Value passed directly to the builder.
	pub value: Option<T>,
	/// Configuration key consulted when no explicit value is set.
	pub key: Option<String>,
}
impl<T> Default for CredentialSetting<T> {
	fn default() -> Self {
		Self { value: None, key: None }
	}
}
impl<T> CredentialSetting<T>
where
	T: AsRef<str>,
{
	fn resolve(&self, source: &dyn CredentialSource) -> Option<String> {
		if let Some(value) = self.value.as_ref().map(AsRef::as_ref).filter(|v| !v.is_empty()) {
			return Some(value.to_owned());
		}

		self.key.as_deref().and_then(|key| source.resolve(key)).filter(|v| !v.is_empty())
	}
}

/// Resolved, non-empty client credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
}

/// Where the host should send the user once the dance completes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostLoginRedirect {
	/// Absolute URL configured through `redirect_url`.
	Url(Url),
	/// Named host route configured through `redirect_to`; the host resolves it.
	Route(String),
	/// Application root.
	#[default]
	Root,
}
impl PostLoginRedirect {
	/// URL, route name, or `/`.
	pub fn as_str(&self) -> &str {
		match self {
			Self::Url(url) => url.as_str(),
			Self::Route(route) => route,
			Self::Root => "/",
		}
	}
}

/// Which route of a provider a path belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKind {
	/// Route that starts the dance.
	Login,
	/// Route the provider redirects back to.
	Callback,
}

/// Static description of one provider as wired into a host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
	/// Validated endpoints and protocol knobs.
	pub descriptor: ProviderDescriptor,
	/// OAuth client identifier.
	pub client_id: CredentialSetting<String>,
	/// OAuth client secret.
	pub client_secret: CredentialSetting<TokenSecret>,
	/// Scopes requested at authorization; empty omits the parameter.
	pub scope: ScopeSet,
	/// Route that starts the dance.
	pub login_path: String,
	/// Route the provider redirects back to.
	pub callback_path: String,
	/// Post-login destination.
	pub post_login: PostLoginRedirect,
}
impl ProviderConfig {
	/// Starts a builder around a validated descriptor.
	pub fn builder(descriptor: ProviderDescriptor) -> ProviderConfigBuilder {
		ProviderConfigBuilder::new(descriptor)
	}

	/// Provider identifier.
	pub fn id(&self) -> &ProviderId {
		&self.descriptor.id
	}

	/// Resolves the client credentials, explicit values first, then configuration keys.
	pub fn credentials(&self, source: &dyn CredentialSource) -> Result<ClientCredentials> {
		let client_id = self
			.client_id
			.resolve(source)
			.ok_or_else(|| self.missing(CredentialField::ClientId))?;
		let client_secret = self
			.client_secret
			.resolve(source)
			.ok_or_else(|| self.missing(CredentialField::ClientSecret))?;

		Ok(ClientCredentials { client_id, client_secret: TokenSecret::new(client_secret) })
	}

	/// Absolute callback URL for a host served at `origin`.
	///
	/// `origin` is the host's mount point: a path prefix such as `https://h/app` is kept, and
	/// any query or fragment is dropped.
	pub fn redirect_uri(&self, origin: &Url) -> Result<Url, ConfigError> {
		let mut base = origin.clone();

		base.set_query(None);
		base.set_fragment(None);

		if !base.path().ends_with('/') {
			let mount = format!("{}/", base.path());

			base.set_path(&mount);
		}

		base.join(self.callback_path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidRedirect { source })
	}

	/// Classifies `path` as this provider's login or callback route.
	pub fn route_kind(&self, path: &str) -> Option<RouteKind> {
		let path = normalize_route(path);

		if path == self.login_path {
			Some(RouteKind::Login)
		} else if path == self.callback_path {
			Some(RouteKind::Callback)
		} else {
			None
		}
	}

	fn missing(&self, field: CredentialField) -> Error {
		Error::MissingCredentials { provider: self.id().clone(), field }
	}
}

/// Builder for [`ProviderConfig`].
#[derive(Debug)]
pub struct ProviderConfigBuilder {
	descriptor: ProviderDescriptor,
	client_id: CredentialSetting<String>,
	client_secret: CredentialSetting<TokenSecret>,
	scope: ScopeSet,
	login_path: Option<String>,
	callback_path: Option<String>,
	redirect_url: Option<String>,
	redirect_to: Option<String>,
}
impl ProviderConfigBuilder {
	/// Creates a builder with no credentials, no scopes, and `/{id}` routes.
	pub fn new(descriptor: ProviderDescriptor) -> Self {
		Self {
			descriptor,
			client_id: CredentialSetting::default(),
			client_secret: CredentialSetting::default(),
			scope: ScopeSet::default(),
			login_path: None,
			callback_path: None,
			redirect_url: None,
			redirect_to: None,
		}
	}

	/// Sets the client id explicitly.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id.value = Some(client_id.into());

		self
	}

	/// Sets the client secret explicitly.
	pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
		self.client_secret.value = Some(TokenSecret::new(client_secret));

		self
	}

	/// Names the configuration key the client id is read from.
	pub fn client_id_key(mut self, key: impl Into<String>) -> Self {
		self.client_id.key = Some(key.into());

		self
	}

	/// Names the configuration key the client secret is read from.
	pub fn client_secret_key(mut self, key: impl Into<String>) -> Self {
		self.client_secret.key = Some(key.into());

		self
	}

	/// Sets the requested scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Overrides the login route.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = Some(path.into());

		self
	}

	/// Overrides the callback route.
	pub fn callback_path(mut self, path: impl Into<String>) -> Self {
		self.callback_path = Some(path.into());

		self
	}

	/// Absolute URL to send the user to after login; wins over [`redirect_to`](Self::redirect_to).
	pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
		self.redirect_url = Some(url.into());

		self
	}

	/// Named host route to send the user to after login.
	pub fn redirect_to(mut self, route: impl Into<String>) -> Self {
		self.redirect_to = Some(route.into());

		self
	}

	/// Validates routes and the post-login target.
	pub fn build(self) -> Result<ProviderConfig, ConfigError> {
		let id = self.descriptor.id.clone();
		let login_path = match self.login_path {
			Some(path) => validate_route(&path)?,
			None => format!("/{id}"),
		};
		let callback_path = match self.callback_path {
			Some(path) => validate_route(&path)?,
			None => format!("{}/authorized", login_path.trim_end_matches('/')),
		};

		if login_path == callback_path {
			return Err(ConfigError::RouteCollision {
				route: login_path,
				provider: id.clone(),
				existing: id,
			});
		}

		let post_login = match (self.redirect_url, self.redirect_to) {
			(Some(url), _) => PostLoginRedirect::Url(
				Url::parse(&url).map_err(|source| ConfigError::InvalidRedirect { source })?,
			),
			(None, Some(route)) if !route.is_empty() => PostLoginRedirect::Route(route),
			_ => PostLoginRedirect::Root,
		};

		Ok(ProviderConfig {
			descriptor: self.descriptor,
			client_id: self.client_id,
			client_secret: self.client_secret,
			scope: self.scope,
			login_path,
			callback_path,
			post_login,
		})
	}
}

fn validate_route(route: &str) -> Result<String, ConfigError> {
	let reason = if !route.starts_with('/') {
		Some("must start with `/`")
	} else if route.contains(['?', '#']) {
		Some("must not carry a query or fragment")
	} else if route.chars().any(char::is_whitespace) {
		Some("must not contain whitespace")
	} else {
		None
	};

	match reason {
		Some(reason) => Err(ConfigError::InvalidRoute { route: route.to_owned(), reason }),
		None => Ok(normalize_route(route).to_owned()),
	}
}

fn normalize_route(route: &str) -> &str {
	match route.trim_end_matches('/') {
		"" => "/",
		trimmed => trimmed,
	}
}
