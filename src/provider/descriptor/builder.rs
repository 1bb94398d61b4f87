// std
use std::iter::IntoIterator;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderEndpoints, ProviderQuirks,
		SupportedGrants,
	},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required to start the dance.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required to exchange codes.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// API base URL is required to resolve authenticated sessions.
	#[error("Missing API base URL.")]
	MissingApiBase,
	/// Endpoint string could not be parsed as a URL.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	MalformedEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The dance cannot run without the authorization code grant.
	#[error("Descriptor must enable the authorization_code grant.")]
	MissingAuthorizationCodeGrant,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
}

/// Builder for [`ProviderDescriptor`] values.
///
/// Endpoints are accepted as strings (or [`Url`]s) and parsed in [`build`](Self::build) so a
/// malformed value surfaces as [`ProviderDescriptorError::MalformedEndpoint`].
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Authorization endpoint.
	pub authorization_endpoint: Option<String>,
	/// Token endpoint used for code exchanges.
	pub token_endpoint: Option<String>,
	/// Refresh endpoint; falls back to the token endpoint.
	pub refresh_endpoint: Option<String>,
	/// API base URL.
	pub api_base: Option<String>,
	/// Grants enabled for the provider.
	pub supported_grants: SupportedGrants,
	/// Preferred client authentication method for the token endpoint.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			authorization_endpoint: None,
			token_endpoint: None,
			refresh_endpoint: None,
			api_base: None,
			supported_grants: SupportedGrants::default(),
			preferred_client_auth_method: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: impl AsRef<str>) -> Self {
		self.authorization_endpoint = Some(url.as_ref().to_owned());

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: impl AsRef<str>) -> Self {
		self.token_endpoint = Some(url.as_ref().to_owned());

		self
	}

	/// Sets a refresh endpoint distinct from the token endpoint.
	pub fn refresh_endpoint(mut self, url: impl AsRef<str>) -> Self {
		self.refresh_endpoint = Some(url.as_ref().to_owned());

		self
	}

	/// Sets the API base URL.
	pub fn api_base(mut self, url: impl AsRef<str>) -> Self {
		self.api_base = Some(url.as_ref().to_owned());

		self
	}

	/// Marks a single grant type as supported.
	pub fn support_grant(mut self, grant: GrantType) -> Self {
		self.supported_grants = self.supported_grants.enable(grant);

		self
	}

	/// Marks multiple grants as supported.
	pub fn support_grants<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		for grant in grants.into_iter() {
			self.supported_grants = self.supported_grants.enable(grant);
		}

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = parse_endpoint(
			"authorization",
			self.authorization_endpoint
				.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?,
		)?;
		let token = parse_endpoint(
			"token",
			self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?,
		)?;
		let refresh = match self.refresh_endpoint {
			Some(raw) => parse_endpoint("refresh", raw)?,
			None => token.clone(),
		};
		let api_base =
			parse_endpoint("api_base", self.api_base.ok_or(ProviderDescriptorError::MissingApiBase)?)?;
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints: ProviderEndpoints { authorization, token, refresh, api_base },
			supported_grants: self.supported_grants,
			preferred_client_auth_method: self.preferred_client_auth_method,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		if !self.supports(GrantType::AuthorizationCode) {
			return Err(ProviderDescriptorError::MissingAuthorizationCodeGrant);
		}

		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("refresh", &self.endpoints.refresh)?;
		validate_endpoint("api_base", &self.endpoints.api_base)?;
		validate_scope_delimiter(self.quirks.scope_delimiter)?;

		Ok(())
	}
}

fn parse_endpoint(name: &'static str, raw: String) -> Result<Url, ProviderDescriptorError> {
	Url::parse(&raw).map_err(|source| ProviderDescriptorError::MalformedEndpoint { endpoint: name, source })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

fn validate_scope_delimiter(delimiter: char) -> Result<(), ProviderDescriptorError> {
	if delimiter.is_control() {
		Err(ProviderDescriptorError::InvalidScopeDelimiter { delimiter })
	} else {
		Ok(())
	}
}
