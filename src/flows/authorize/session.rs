// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{IdentityId, ScopeSet},
	provider::ProviderDescriptor,
};

const STATE_BYTES: usize = 32;

/// Authorization redirect returned by
/// [`Dance::begin_authorization`](crate::flows::Dance::begin_authorization).
#[derive(Clone, Debug)]
pub struct AuthorizationSession {
	/// Identity the login belongs to.
	pub identity: IdentityId,
	/// Requested scopes.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip through the provider redirect.
	pub state: String,
	/// Callback URL registered with the provider.
	pub redirect_uri: Url,
	/// Provider URL the user agent should be redirected to.
	pub authorize_url: Url,
	/// Instant the state was issued.
	pub created_at: OffsetDateTime,
	/// Instant after which the state is no longer accepted.
	pub expires_at: OffsetDateTime,
}

/// What the dance remembers about an in-flight login; the raw state is never kept.
#[derive(Clone, Debug)]
pub(crate) struct PendingAuthorization {
	pub(crate) state_digest: [u8; 32],
	pub(crate) created_at: OffsetDateTime,
	pub(crate) scope: ScopeSet,
	pub(crate) redirect_uri: Url,
}
impl PendingAuthorization {
	pub(crate) fn is_expired_at(&self, instant: OffsetDateTime, ttl: Duration) -> bool {
		instant - self.created_at > ttl
	}

	/// Constant-time comparison against a returned `state`.
	pub(crate) fn matches(&self, returned_state: &str) -> bool {
		let candidate = state_digest(returned_state);

		candidate.iter().zip(self.state_digest.iter()).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) == 0
	}
}

pub(super) fn generate_state() -> String {
	let bytes: [u8; STATE_BYTES] = rand::rng().random();

	URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn state_digest(state: &str) -> [u8; 32] {
	let mut hasher = Sha256::new();

	hasher.update(state.as_bytes());

	hasher.finalize().into()
}

pub(super) fn build_authorize_url(
	descriptor: &ProviderDescriptor,
	client_id: &str,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !scope.is_empty() {
		pairs.append_pair("scope", &scope.join(descriptor.quirks.scope_delimiter));
	}

	pairs.append_pair("state", state);

	drop(pairs);

	url
}
