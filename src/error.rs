//! Dance-level error types shared across flows, providers, sessions, and stores.

// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, ProviderId, ScopeValidationError, TokenRecordBuilderError},
	config::CredentialField,
	provider::{ProviderDescriptorError, ProviderErrorKind},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Every variant except [`Error::Config`] and [`Error::Storage`] aborts the dance for the
/// current identity; none of them leave a partially written token record behind.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Neither an explicit value nor the named configuration key yielded a credential.
	#[error("Provider `{provider}` has no {field} configured.")]
	MissingCredentials {
		/// Provider whose credentials are incomplete.
		provider: ProviderId,
		/// Which credential is missing.
		field: CredentialField,
	},
	/// Callback `state` was missing, expired, already consumed, or different from the one issued.
	#[error("Authorization state does not match a pending login.")]
	StateMismatch,
	/// Provider redirected back with an `error` instead of a code.
	#[error("Provider denied the authorization request: {error}.")]
	AuthorizationDenied {
		/// OAuth `error` code reported on the callback.
		error: String,
		/// Optional `error_description` reported on the callback.
		description: Option<String>,
	},
	/// Authorization code could not be exchanged for tokens.
	#[error("Authorization code exchange failed: {0}")]
	TokenExchange(#[source] TokenEndpointError),
	/// Refresh grant failed; the caller must restart the dance unless the cause is transient.
	#[error("Token refresh failed: {0}")]
	RefreshFailed(#[source] TokenEndpointError),
	/// No usable token exists for the identity.
	#[error("No authenticated session is available.")]
	NotAuthenticated,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	InvalidProvider(#[from] ProviderDescriptorError),
	/// Identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
	/// Redirect URI (callback or post-login target) cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Login or callback route is not a usable path.
	#[error("Route `{route}` is invalid: {reason}.")]
	InvalidRoute {
		/// Offending route.
		route: String,
		/// Why the route was rejected.
		reason: &'static str,
	},
	/// Route is already served by another registered provider.
	#[error("Route `{route}` of provider `{provider}` collides with provider `{existing}`.")]
	RouteCollision {
		/// Colliding route.
		route: String,
		/// Provider being registered.
		provider: ProviderId,
		/// Provider that already owns the route.
		existing: ProviderId,
	},
	/// Provider identifier registered twice.
	#[error("Provider `{provider}` is already registered.")]
	DuplicateProvider {
		/// Duplicate identifier.
		provider: ProviderId,
	},
	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] TokenRecordBuilderError),
	/// API path would leave the provider's base URL.
	#[error("API path `{path}` does not resolve under the provider base URL.")]
	InvalidApiPath {
		/// Offending path.
		path: String,
	},
	/// Access token cannot be encoded as an HTTP header value.
	#[error("Access token cannot be used as an Authorization header value.")]
	InvalidHeader,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Why a call to the token (or refresh) endpoint failed.
#[derive(Debug, ThisError)]
pub enum TokenEndpointError {
	/// Provider answered with an OAuth error that retrying will not fix.
	#[error("Token endpoint rejected the request ({kind:?}): {message}.")]
	Rejected {
		/// Strategy classification of the provider error.
		kind: ProviderErrorKind,
		/// Provider- or dance-supplied message.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Temporary upstream failure.
	#[error("Token endpoint returned a temporary failure: {message}.")]
	Transient {
		/// Provider- or dance-supplied message.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with a body that is not a valid token payload.
	#[error("Token endpoint returned a malformed payload.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token payload parsed but violates a protocol rule.
	#[error("Token endpoint returned an unusable payload: {reason}.")]
	InvalidResponse {
		/// What was wrong with the payload.
		reason: String,
	},
	/// Request did not complete within the transport timeout.
	#[error("Token endpoint did not respond in time.")]
	Timeout,
	/// Underlying HTTP client reported a network failure (DNS, TCP, TLS).
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// Outbound request could not be assembled.
	#[error("Token request could not be built.")]
	InvalidRequest {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
	/// Callback carried neither a code nor an error.
	#[error("Callback did not include an authorization code.")]
	MissingCode,
	/// Stored record has no refresh token to redeem.
	#[error("Stored token record has no refresh token.")]
	MissingRefreshToken,
}
impl TokenEndpointError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a request construction failure.
	pub fn invalid_request(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidRequest { source: Box::new(src) }
	}

	/// Returns `true` when the failure is transient and the call may be retried.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transient { .. } | Self::Timeout | Self::Network { .. } | Self::Io(_) => true,
			Self::Parse { status, .. } => matches!(status, Some(429) | Some(500..)),
			_ => false,
		}
	}

	/// HTTP status code observed for the failing call, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::Transient { status, .. }
			| Self::Parse { status, .. } => *status,
			_ => None,
		}
	}

	/// Retry-After hint supplied by the provider, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TokenEndpointError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}
