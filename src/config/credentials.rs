//! Lookups for credentials named by configuration key.

// self
use crate::_prelude::*;

/// Resolves named configuration keys to credential strings.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Returns the value stored under `key`, if any.
	fn resolve(&self, key: &str) -> Option<String>;
}

/// Reads keys from the process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCredentialSource;
impl CredentialSource for EnvCredentialSource {
	fn resolve(&self, key: &str) -> Option<String> {
		std::env::var(key).ok()
	}
}

/// Reads keys from an application-owned map.
#[derive(Clone, Default)]
pub struct MapCredentialSource(HashMap<String, String>);
impl MapCredentialSource {
	/// Inserts or replaces a value.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
		self.0.insert(key.into(), value.into());

		self
	}
}
impl CredentialSource for MapCredentialSource {
	fn resolve(&self, key: &str) -> Option<String> {
		self.0.get(key).cloned()
	}
}
impl<K, V> FromIterator<(K, V)> for MapCredentialSource
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}
impl Debug for MapCredentialSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.0.keys()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn map_source_resolves_and_hides_values() {
		let mut source = MapCredentialSource::default();

		source.insert("ID", "client").insert("SECRET", "hunter2");

		assert_eq!(source.resolve("ID").as_deref(), Some("client"));
		assert_eq!(source.resolve("UNKNOWN"), None);
		assert!(!format!("{source:?}").contains("hunter2"));
	}

	#[test]
	fn env_source_misses_unset_keys() {
		assert_eq!(EnvCredentialSource.resolve("SONOS_DANCE_SURELY_UNSET_KEY"), None);
	}
}
