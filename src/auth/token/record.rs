//! Token record structs, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, token::secret::TokenSecret},
};

/// Where a stored record stands at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// The access token can be presented.
	Active,
	/// The access token is past `expires_at`; a refresh may still recover it.
	Expired,
	/// Logged out or refused by Sonos; only a new login helps.
	Revoked,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the access token is an empty string.
	#[error("Access token cannot be empty.")]
	EmptyAccessToken,
}

/// Tokens issued to one identity by one provider.
#[derive(Serialize, Deserialize, Clone)]
pub struct TokenRecord {
	/// Token type reported by the provider (usually `Bearer`).
	pub token_type: String,
	/// Scopes granted to this record, when the provider reported them.
	pub scope: Option<ScopeSet>,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the dance received the token.
	pub issued_at: OffsetDateTime,
	/// Expiry instant; `None` when the provider did not report `expires_in`.
	pub expires_at: Option<OffsetDateTime>,
	/// Revocation instant if the record has been revoked.
	pub revoked_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Default `token_type` when the provider omits one.
	pub const DEFAULT_TOKEN_TYPE: &'static str = "Bearer";

	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Status of the record at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		match (self.revoked_at, self.expires_at) {
			(Some(_), _) => TokenStatus::Revoked,
			(None, Some(expires_at)) if instant >= expires_at => TokenStatus::Expired,
			_ => TokenStatus::Active,
		}
	}

	/// Whether the access token is past its expiry at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.status_at(instant) == TokenStatus::Expired
	}

	/// Returns `true` when the record expires within `margin` of `instant`.
	///
	/// Records without an expiry never need a refresh.
	pub fn expires_within(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at - instant <= margin)
	}

	/// Returns `true` if the record has been revoked.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Marks the record as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.revoked_at = Some(instant);
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("revoked_at", &self.revoked_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	token_type: Option<String>,
	scope: Option<ScopeSet>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	/// Sets the token type.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Sets the granted scopes when present.
	pub fn maybe_scope(mut self, scope: Option<ScopeSet>) -> Self {
		self.scope = scope;

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;

		if access_token.expose().is_empty() {
			return Err(TokenRecordBuilderError::EmptyAccessToken);
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = self.expires_at.or_else(|| self.expires_in.map(|delta| issued_at + delta));

		Ok(TokenRecord {
			token_type: self.token_type.unwrap_or_else(|| TokenRecord::DEFAULT_TOKEN_TYPE.into()),
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			revoked_at: None,
		})
	}
}
