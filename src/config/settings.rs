//! Host-facing settings applied on top of a provider preset.

// self
use crate::{_prelude::*, auth::{ScopeSet, TokenSecret}, config::ProviderConfigBuilder};

/// Deserializable provider settings, typically a section of the host's configuration.
///
/// Every field is optional; unset fields keep the preset's value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DanceSettings {
	/// Explicit client id; wins over the configuration key.
	pub client_id: Option<String>,
	/// Explicit client secret; wins over the configuration key.
	pub client_secret: Option<TokenSecret>,
	/// Requested scopes, as a list or a comma/space separated string.
	pub scope: Option<ScopeSet>,
	/// Absolute post-login URL.
	pub redirect_url: Option<String>,
	/// Named post-login host route.
	pub redirect_to: Option<String>,
	/// Login route.
	pub login_url: Option<String>,
	/// Callback route.
	pub authorized_url: Option<String>,
}
impl DanceSettings {
	/// Copies every set field onto `builder`.
	pub fn apply(self, mut builder: ProviderConfigBuilder) -> ProviderConfigBuilder {
		if let Some(client_id) = self.client_id {
			builder = builder.client_id(client_id);
		}
		if let Some(client_secret) = self.client_secret {
			builder = builder.client_secret(client_secret.expose());
		}
		if let Some(scope) = self.scope {
			builder = builder.scope(scope);
		}
		if let Some(url) = self.redirect_url {
			builder = builder.redirect_url(url);
		}
		if let Some(route) = self.redirect_to {
			builder = builder.redirect_to(route);
		}
		if let Some(path) = self.login_url {
			builder = builder.login_path(path);
		}
		if let Some(path) = self.authorized_url {
			builder = builder.callback_path(path);
		}

		builder
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn settings_deserialize_and_reject_unknown_fields() {
		let settings: DanceSettings = serde_json::from_str(
			r#"{"client_id":"abc","scope":"playback-control-all","login_url":"/login/sonos"}"#,
		)
		.expect("Settings should deserialize.");

		assert_eq!(settings.client_id.as_deref(), Some("abc"));
		assert_eq!(settings.scope.map(|scope| scope.len()), Some(1));
		assert_eq!(settings.login_url.as_deref(), Some("/login/sonos"));
		assert!(serde_json::from_str::<DanceSettings>(r#"{"clientid":"typo"}"#).is_err());
	}
}
