//! Sonos control API preset.
//!
//! Pins the Sonos login endpoints, the API base URL, and the configuration keys client
//! credentials are read from when they are not passed explicitly.

// self
use crate::{
	auth::ProviderId,
	config::{DanceSettings, ProviderConfig, ProviderConfigBuilder},
	error::ConfigError,
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor, ProviderQuirks},
};

/// Provider identifier, also the prefix of the default routes.
pub const PROVIDER_ID: &str = "sonos";
/// Authorization endpoint the user is redirected to.
pub const AUTHORIZATION_URL: &str = "https://api.sonos.com/login/v3/oauth";
/// Token endpoint for code exchanges.
pub const TOKEN_URL: &str = "https://api.sonos.com/login/v3/oauth/access";
/// Refresh endpoint; Sonos serves refreshes from the token endpoint.
pub const REFRESH_URL: &str = TOKEN_URL;
/// Root of the Sonos control API.
pub const API_BASE_URL: &str = "https://api.ws.sonos.com";
/// Configuration key holding the client id.
pub const CLIENT_ID_KEY: &str = "SONOS_OAUTH_CLIENT_ID";
/// Configuration key holding the client secret.
pub const CLIENT_SECRET_KEY: &str = "SONOS_OAUTH_CLIENT_SECRET";
/// Default login route.
pub const LOGIN_PATH: &str = "/sonos";
/// Default callback route.
pub const CALLBACK_PATH: &str = "/sonos/authorized";

/// Validated Sonos descriptor.
pub fn descriptor() -> Result<ProviderDescriptor, ConfigError> {
	let descriptor = ProviderDescriptor::builder(ProviderId::new(PROVIDER_ID)?)
		.authorization_endpoint(AUTHORIZATION_URL)
		.token_endpoint(TOKEN_URL)
		.refresh_endpoint(REFRESH_URL)
		.api_base(API_BASE_URL)
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.quirks(ProviderQuirks { scope_delimiter: ' ' })
		.build()?;

	Ok(descriptor)
}

/// Config builder seeded with the Sonos descriptor and credential keys.
///
/// Routes default to [`LOGIN_PATH`] and [`CALLBACK_PATH`].
pub fn config_builder() -> Result<ProviderConfigBuilder, ConfigError> {
	Ok(ProviderConfig::builder(descriptor()?)
		.client_id_key(CLIENT_ID_KEY)
		.client_secret_key(CLIENT_SECRET_KEY))
}

/// Builds the Sonos config with host settings applied on top of the preset.
pub fn config(settings: DanceSettings) -> Result<ProviderConfig, ConfigError> {
	settings.apply(config_builder()?).build()
}
