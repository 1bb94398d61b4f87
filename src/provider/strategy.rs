//! Token endpoint error classification plus the form hook strategies use to decorate grants.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Per-provider hooks consulted by the code exchange and the refresh flow.
pub trait ProviderStrategy: Send + Sync {
	/// Decides how the dance treats a failed token request.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form fields to a token request.
	///
	/// Fields owned by the grant itself (`grant_type`, `code`, `redirect_uri`,
	/// `refresh_token`, `client_id`, `client_secret`) are dropped if inserted here.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Outcome categories for failed token requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// The code or refresh token is no longer usable.
	InvalidGrant,
	/// The client id or secret was refused.
	InvalidClient,
	/// The grant does not cover the requested scopes.
	InsufficientScope,
	/// Worth retrying after a pause.
	Transient,
}

/// What the transport learned about a failed token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant that failed.
	pub grant_type: GrantType,
	/// Response status, if a response arrived.
	pub http_status: Option<u16>,
	/// OAuth `error` code from a JSON error body.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` from a JSON error body.
	pub error_description: Option<String>,
	/// Leading characters of a body that did not parse as an OAuth error.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Starts an empty context for `grant_type`.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Records the response status.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Records the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Records the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Records a raw body, cut to the preview limit.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		let mut body = body.into();

		if let Some((cut, _)) = body.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			body.truncate(cut);
			body.push('…');
		}

		self.body_preview = Some(body);

		self
	}
}

/// RFC 6749 classification used by the Sonos preset.
///
/// Lookup order: the OAuth `error` code, the description, the raw body, then the status.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		let description = ctx.error_description.as_deref();

		ctx.oauth_error
			.as_deref()
			.into_iter()
			.chain(description)
			.find_map(kind_for_code)
			.or_else(|| description.and_then(kind_in_text))
			.or_else(|| ctx.body_preview.as_deref().and_then(kind_in_text))
			.unwrap_or_else(|| kind_for_status(ctx.http_status))
	}
}

const ERROR_CODES: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("access_denied", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("unauthorized_client", ProviderErrorKind::InvalidClient),
	("invalid_scope", ProviderErrorKind::InsufficientScope),
	("insufficient_scope", ProviderErrorKind::InsufficientScope),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("server_error", ProviderErrorKind::Transient),
];

fn kind_for_code(code: &str) -> Option<ProviderErrorKind> {
	ERROR_CODES
		.iter()
		.find(|(known, _)| known.eq_ignore_ascii_case(code.trim()))
		.map(|(_, kind)| *kind)
}

const TEXT_HINTS: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("insufficient_scope", ProviderErrorKind::InsufficientScope),
	("invalid_scope", ProviderErrorKind::InsufficientScope),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("retry", ProviderErrorKind::Transient),
];

fn kind_in_text(text: &str) -> Option<ProviderErrorKind> {
	let text = text.to_ascii_lowercase();

	TEXT_HINTS.iter().find(|(hint, _)| text.contains(hint)).map(|(_, kind)| *kind)
}

fn kind_for_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		Some(429) => ProviderErrorKind::Transient,
		Some(400..500) => ProviderErrorKind::InvalidGrant,
		_ => ProviderErrorKind::Transient,
	}
}
