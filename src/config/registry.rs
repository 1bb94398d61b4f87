//! Registry of provider configs keyed by id and route.

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	config::{ProviderConfig, RouteKind},
	error::ConfigError,
};

/// Set of providers a host serves, with their routes checked for collisions.
#[derive(Clone, Debug, Default)]
pub struct DanceRegistry {
	providers: BTreeMap<ProviderId, ProviderConfig>,
	routes: HashMap<String, ProviderId>,
}
impl DanceRegistry {
	/// Adds a provider; its id and both routes must be unused.
	pub fn register(&mut self, config: ProviderConfig) -> Result<(), ConfigError> {
		let id = config.id().clone();

		if self.providers.contains_key(&id) {
			return Err(ConfigError::DuplicateProvider { provider: id });
		}

		for route in [&config.login_path, &config.callback_path] {
			if let Some(existing) = self.routes.get(route) {
				return Err(ConfigError::RouteCollision {
					route: route.to_owned(),
					provider: id,
					existing: existing.to_owned(),
				});
			}
		}

		self.routes.insert(config.login_path.clone(), id.clone());
		self.routes.insert(config.callback_path.clone(), id.clone());
		self.providers.insert(id, config);

		Ok(())
	}

	/// Looks up a provider by id.
	pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
		self.providers.get(id)
	}

	/// Finds the provider and route kind serving `path`.
	pub fn route(&self, path: &str) -> Option<(&ProviderConfig, RouteKind)> {
		self.providers.values().find_map(|config| config.route_kind(path).map(|kind| (config, kind)))
	}

	/// Iterates registered providers in id order.
	pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
		self.providers.values()
	}

	/// Number of registered providers.
	pub fn len(&self) -> usize {
		self.providers.len()
	}

	/// Returns `true` when nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.providers.is_empty()
	}
}
